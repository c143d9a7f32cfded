use std::collections::HashMap;

use anyhow::Result;
use greatideas_db::models::cafe::Cafe;
use greatideas_db::models::menu::{Addon, AddonGroup, AddonWithLinks, Category, MenuItem, MenuItemVariant};
use greatideas_db::repositories::{CafeRepository, MenuRepository};
use greatideas_shared::money::to_rubles;
use serde_json::{json, Map, Value};

/// A non-empty category with its active items.
#[derive(Debug, Clone)]
pub struct MenuSection {
    pub category: Category,
    pub items: Vec<MenuItem>,
}

/// Everything the cafe page renders.
#[derive(Debug, Clone)]
pub struct CafeMenu {
    pub cafe: Cafe,
    pub categories: Vec<Category>,
    pub sections: Vec<MenuSection>,
    pub popular_item: Option<MenuItem>,
    pub addon_groups: Vec<AddonGroup>,
    pub addons: Vec<Addon>,
    pub cafes_count: i64,
    pub menu_json: Value,
}

impl CafeMenu {
    pub fn item_count(&self, category_id: i64) -> usize {
        self.sections
            .iter()
            .find(|s| s.category.id == category_id)
            .map_or(0, |s| s.items.len())
    }
}

#[derive(Debug, Clone)]
pub struct MenuService {
    cafes: CafeRepository,
    menu: MenuRepository,
}

impl MenuService {
    pub fn new(cafes: CafeRepository, menu: MenuRepository) -> Self {
        Self { cafes, menu }
    }

    /// `None` when the cafe is missing or inactive.
    pub async fn cafe_menu(&self, cafe_id: i64) -> Result<Option<CafeMenu>> {
        let Some(cafe) = self.cafes.get_active(cafe_id).await? else {
            return Ok(None);
        };

        let categories = self.menu.active_categories(cafe.id).await?;
        let items = self.menu.active_items(cafe.id).await?;
        let variants = self.menu.active_variants_by_item(cafe.id).await?;
        let addons = self.menu.active_addons_with_links(cafe.id).await?;

        let sections = group_by_category(&categories, &items);
        let menu_json = menu_json(&items, &variants, &addons);

        Ok(Some(CafeMenu {
            popular_item: self.menu.first_popular(cafe.id).await?,
            addon_groups: self.menu.active_addon_groups(cafe.id).await?,
            addons: addons.into_iter().map(|a| a.addon).collect(),
            cafes_count: self.cafes.count_active().await?,
            cafe,
            categories,
            sections,
            menu_json,
        }))
    }
}

/// Keeps category order; categories without items are dropped.
pub fn group_by_category(categories: &[Category], items: &[MenuItem]) -> Vec<MenuSection> {
    categories
        .iter()
        .filter_map(|category| {
            let items: Vec<MenuItem> = items.iter().filter(|i| i.category_id == category.id).cloned().collect();
            (!items.is_empty()).then(|| MenuSection {
                category: category.clone(),
                items,
            })
        })
        .collect()
}

/// Item id → `{id, name, basePrice, variants, addons}` for the ordering widget.
pub fn menu_json(
    items: &[MenuItem],
    variants: &HashMap<i64, Vec<MenuItemVariant>>,
    addons: &[AddonWithLinks],
) -> Value {
    let mut out = Map::new();
    for item in items {
        let item_variants: Vec<Value> = variants
            .get(&item.id)
            .map(|vs| {
                vs.iter()
                    .map(|v| {
                        json!({
                            "id": v.id,
                            "name": v.name,
                            "size": v.size,
                            "priceModifier": to_rubles(v.price_modifier),
                            "isDefault": v.is_default,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let item_addons: Vec<Value> = addons
            .iter()
            .filter(|a| a.is_applicable_to_item(item))
            .map(|a| {
                json!({
                    "id": a.addon.id,
                    "name": a.addon.name,
                    "price": to_rubles(a.addon.price),
                    "type": a.addon.addon_type,
                    "group": a.group_label(),
                })
            })
            .collect();

        out.insert(
            item.id.to_string(),
            json!({
                "id": item.id,
                "name": item.name,
                "basePrice": to_rubles(item.price),
                "variants": item_variants,
                "addons": item_addons,
            }),
        );
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> (MenuService, greatideas_db::seed::DemoMenu) {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let demo = greatideas_db::seed::demo_menu(&pool).await.unwrap();
        (
            MenuService::new(CafeRepository::new(pool.clone()), MenuRepository::new(pool)),
            demo,
        )
    }

    #[tokio::test]
    async fn demo_cafe_menu_has_sections_and_json() {
        let (service, demo) = service().await;
        let menu = service.cafe_menu(demo.cafe_id).await.unwrap().unwrap();

        assert_eq!(menu.cafes_count, 1);
        assert!(menu.item_count(demo.coffee_category_id) >= 2);
        let latte = &menu.menu_json[demo.latte_id.to_string()];
        assert_eq!(latte["name"], "Латте");
        assert!(!latte["variants"].as_array().unwrap().is_empty());

        // Jam is restricted to pastry and must not be offered with coffee.
        let latte_addons: Vec<i64> = latte["addons"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_i64().unwrap())
            .collect();
        assert!(latte_addons.contains(&demo.oat_milk_id));
        assert!(!latte_addons.contains(&demo.jam_id));
    }

    #[tokio::test]
    async fn inactive_or_missing_cafe_is_none() {
        let (service, demo) = service().await;
        assert!(service.cafe_menu(demo.cafe_id + 100).await.unwrap().is_none());
        service.cafes.set_active(demo.cafe_id, false).await.unwrap();
        assert!(service.cafe_menu(demo.cafe_id).await.unwrap().is_none());
    }
}
