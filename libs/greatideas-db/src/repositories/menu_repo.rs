use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::models::menu::{
    Addon, AddonGroup, AddonWithLinks, Category, MenuItem, MenuItemVariant, NewAddon, NewMenuItem,
};

#[derive(Debug, Clone)]
pub struct MenuRepository {
    pool: SqlitePool,
}

impl MenuRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Categories

    pub async fn create_category(
        &self,
        cafe_id: i64,
        name: &str,
        description: &str,
        sort_order: i64,
    ) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (cafe_id, name, description, sort_order) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(cafe_id)
        .bind(name)
        .bind(description)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create category")
    }

    pub async fn active_categories(&self, cafe_id: i64) -> Result<Vec<Category>> {
        sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE cafe_id = ? AND is_active = 1 ORDER BY sort_order, name",
        )
        .bind(cafe_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch categories")
    }

    // Items

    pub async fn create_item(&self, item: &NewMenuItem) -> Result<MenuItem> {
        let now = Utc::now();
        sqlx::query_as::<_, MenuItem>(
            r#"
            INSERT INTO menu_items (cafe_id, category_id, name, description, price, weight, calories,
                                    is_popular, sort_order, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(item.cafe_id)
        .bind(item.category_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price)
        .bind(&item.weight)
        .bind(item.calories)
        .bind(item.is_popular)
        .bind(item.sort_order)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create menu item")
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<MenuItem>> {
        sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch menu item")
    }

    pub async fn set_item_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE menu_items SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update menu item")?;
        Ok(())
    }

    pub async fn active_items(&self, cafe_id: i64) -> Result<Vec<MenuItem>> {
        sqlx::query_as::<_, MenuItem>(
            "SELECT * FROM menu_items WHERE cafe_id = ? AND is_active = 1 ORDER BY sort_order, name",
        )
        .bind(cafe_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch menu items")
    }

    pub async fn first_popular(&self, cafe_id: i64) -> Result<Option<MenuItem>> {
        sqlx::query_as::<_, MenuItem>(
            "SELECT * FROM menu_items WHERE cafe_id = ? AND is_active = 1 AND is_popular = 1 ORDER BY sort_order, name, id LIMIT 1",
        )
        .bind(cafe_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch popular item")
    }

    // Variants

    pub async fn create_variant(
        &self,
        menu_item_id: i64,
        name: &str,
        size: &str,
        price_modifier: i64,
        is_default: bool,
        sort_order: i64,
    ) -> Result<MenuItemVariant> {
        sqlx::query_as::<_, MenuItemVariant>(
            r#"
            INSERT INTO menu_item_variants (menu_item_id, name, size, price_modifier, is_default, sort_order)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(menu_item_id)
        .bind(name)
        .bind(size)
        .bind(price_modifier)
        .bind(is_default)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create variant")
    }

    pub async fn get_variant(&self, id: i64) -> Result<Option<MenuItemVariant>> {
        sqlx::query_as::<_, MenuItemVariant>("SELECT * FROM menu_item_variants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch variant")
    }

    /// Active variants of every item in the cafe, keyed by item id.
    pub async fn active_variants_by_item(&self, cafe_id: i64) -> Result<HashMap<i64, Vec<MenuItemVariant>>> {
        let rows = sqlx::query_as::<_, MenuItemVariant>(
            r#"
            SELECT v.* FROM menu_item_variants v
            JOIN menu_items m ON m.id = v.menu_item_id
            WHERE m.cafe_id = ? AND v.is_active = 1
            ORDER BY v.sort_order, v.name
            "#,
        )
        .bind(cafe_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch variants")?;

        let mut map: HashMap<i64, Vec<MenuItemVariant>> = HashMap::new();
        for v in rows {
            map.entry(v.menu_item_id).or_default().push(v);
        }
        Ok(map)
    }

    // Add-ons

    pub async fn create_addon_group(
        &self,
        cafe_id: i64,
        name: &str,
        is_required: bool,
        max_selections: i64,
        sort_order: i64,
    ) -> Result<AddonGroup> {
        sqlx::query_as::<_, AddonGroup>(
            r#"
            INSERT INTO addon_groups (cafe_id, name, is_required, max_selections, sort_order)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(cafe_id)
        .bind(name)
        .bind(is_required)
        .bind(max_selections)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create addon group")
    }

    pub async fn active_addon_groups(&self, cafe_id: i64) -> Result<Vec<AddonGroup>> {
        sqlx::query_as::<_, AddonGroup>(
            "SELECT * FROM addon_groups WHERE cafe_id = ? AND is_active = 1 ORDER BY sort_order, name",
        )
        .bind(cafe_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch addon groups")
    }

    pub async fn create_addon(&self, addon: &NewAddon) -> Result<Addon> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Addon>(
            r#"
            INSERT INTO addons (cafe_id, group_id, name, addon_type, price, sort_order)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(addon.cafe_id)
        .bind(addon.group_id)
        .bind(&addon.name)
        .bind(if addon.addon_type.is_empty() { "other" } else { addon.addon_type.as_str() })
        .bind(addon.price)
        .bind(addon.sort_order)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to create addon")?;

        for item_id in &addon.menu_item_ids {
            sqlx::query("INSERT INTO addon_menu_items (addon_id, menu_item_id) VALUES (?, ?)")
                .bind(created.id)
                .bind(item_id)
                .execute(&mut *tx)
                .await
                .context("Failed to link addon to item")?;
        }
        for category_id in &addon.category_ids {
            sqlx::query("INSERT INTO addon_categories (addon_id, category_id) VALUES (?, ?)")
                .bind(created.id)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to link addon to category")?;
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Add-ons by id regardless of status, in catalogue order.
    pub async fn addons_by_ids(&self, ids: &[i64]) -> Result<Vec<Addon>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM addons WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY sort_order, name");

        qb.build_query_as::<Addon>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch addons")
    }

    /// Active add-ons of a cafe with group names and applicability links.
    pub async fn active_addons_with_links(&self, cafe_id: i64) -> Result<Vec<AddonWithLinks>> {
        let addons = sqlx::query_as::<_, Addon>(
            r#"
            SELECT * FROM addons
            WHERE cafe_id = ? AND is_active = 1
            ORDER BY group_id IS NULL, group_id, sort_order, name
            "#,
        )
        .bind(cafe_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch addons")?;

        let groups: HashMap<i64, String> =
            sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM addon_groups WHERE cafe_id = ?")
                .bind(cafe_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch addon group names")?
                .into_iter()
                .collect();

        let item_links: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT l.addon_id, l.menu_item_id FROM addon_menu_items l
            JOIN addons a ON a.id = l.addon_id
            WHERE a.cafe_id = ?
            "#,
        )
        .bind(cafe_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch addon item links")?;

        let category_links: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT l.addon_id, l.category_id FROM addon_categories l
            JOIN addons a ON a.id = l.addon_id
            WHERE a.cafe_id = ?
            "#,
        )
        .bind(cafe_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch addon category links")?;

        Ok(addons
            .into_iter()
            .map(|addon| AddonWithLinks {
                group_name: addon.group_id.and_then(|g| groups.get(&g).cloned()),
                menu_item_ids: item_links
                    .iter()
                    .filter(|(a, _)| *a == addon.id)
                    .map(|(_, i)| *i)
                    .collect(),
                category_ids: category_links
                    .iter()
                    .filter(|(a, _)| *a == addon.id)
                    .map(|(_, c)| *c)
                    .collect(),
                addon,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    #[tokio::test]
    async fn addons_respect_item_and_category_links() {
        let pool = crate::db::connect_memory().await.unwrap();
        let menu = seed::demo_menu(&pool).await.unwrap();
        let repo = MenuRepository::new(pool);

        let addons = repo.active_addons_with_links(menu.cafe_id).await.unwrap();
        let latte = repo.get_item(menu.latte_id).await.unwrap().unwrap();
        let croissant = repo.get_item(menu.croissant_id).await.unwrap().unwrap();

        let for_latte: Vec<&str> = addons
            .iter()
            .filter(|a| a.is_applicable_to_item(&latte))
            .map(|a| a.addon.name.as_str())
            .collect();
        let for_croissant: Vec<&str> = addons
            .iter()
            .filter(|a| a.is_applicable_to_item(&croissant))
            .map(|a| a.addon.name.as_str())
            .collect();

        assert!(for_latte.contains(&"Овсяное молоко"));
        assert!(for_latte.contains(&"Ванильный сироп"));
        assert!(!for_croissant.contains(&"Овсяное молоко"));
        assert!(for_croissant.contains(&"Джем"));
    }

    #[tokio::test]
    async fn menu_listing_is_ordered_and_filtered() {
        let pool = crate::db::connect_memory().await.unwrap();
        let menu = seed::demo_menu(&pool).await.unwrap();
        let repo = MenuRepository::new(pool);

        repo.set_item_active(menu.croissant_id, false).await.unwrap();
        let items = repo.active_items(menu.cafe_id).await.unwrap();
        assert!(items.iter().all(|i| i.id != menu.croissant_id));

        let popular = repo.first_popular(menu.cafe_id).await.unwrap().unwrap();
        assert_eq!(popular.id, menu.latte_id);

        let variants = repo.active_variants_by_item(menu.cafe_id).await.unwrap();
        assert_eq!(variants[&menu.latte_id].len(), 2);

        let picked = repo.addons_by_ids(&[menu.syrup_id, menu.oat_milk_id]).await.unwrap();
        assert_eq!(picked.len(), 2);
        assert!(repo.addons_by_ids(&[]).await.unwrap().is_empty());
    }
}
