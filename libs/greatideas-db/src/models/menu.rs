use chrono::{DateTime, Utc};
use greatideas_shared::AddonType;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub cafe_id: i64,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MenuItem {
    pub id: i64,
    pub cafe_id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub image: Option<String>,
    pub weight: String,
    pub calories: Option<i64>,
    pub is_active: bool,
    pub is_popular: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MenuItemVariant {
    pub id: i64,
    pub menu_item_id: i64,
    pub name: String,
    pub size: String,
    pub price_modifier: i64,
    pub is_default: bool,
    pub is_active: bool,
    pub sort_order: i64,
}

impl MenuItemVariant {
    pub fn price(&self, item: &MenuItem) -> i64 {
        item.price + self.price_modifier
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AddonGroup {
    pub id: i64,
    pub cafe_id: i64,
    pub name: String,
    pub is_required: bool,
    pub max_selections: i64,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Addon {
    pub id: i64,
    pub cafe_id: i64,
    pub group_id: Option<i64>,
    pub name: String,
    pub addon_type: String,
    pub price: i64,
    pub is_active: bool,
    pub sort_order: i64,
}

impl Addon {
    pub fn kind(&self) -> AddonType {
        self.addon_type.parse().unwrap_or(AddonType::Other)
    }
}

/// An add-on together with its item/category restrictions.
#[derive(Debug, Clone)]
pub struct AddonWithLinks {
    pub addon: Addon,
    pub group_name: Option<String>,
    pub menu_item_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

impl AddonWithLinks {
    /// Item restrictions win over category restrictions; no restrictions means "everything".
    pub fn is_applicable_to_item(&self, item: &MenuItem) -> bool {
        if !self.menu_item_ids.is_empty() {
            return self.menu_item_ids.contains(&item.id);
        }
        if !self.category_ids.is_empty() {
            return self.category_ids.contains(&item.category_id);
        }
        true
    }

    /// Group name, or the add-on type's label when ungrouped.
    pub fn group_label(&self) -> String {
        self.group_name
            .clone()
            .unwrap_or_else(|| self.addon.kind().display_name().to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewMenuItem {
    pub cafe_id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub weight: String,
    pub calories: Option<i64>,
    pub is_popular: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewAddon {
    pub cafe_id: i64,
    pub group_id: Option<i64>,
    pub name: String,
    pub addon_type: String,
    pub price: i64,
    pub sort_order: i64,
    pub menu_item_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, category_id: i64) -> MenuItem {
        MenuItem {
            id,
            cafe_id: 1,
            category_id,
            name: "Латте".into(),
            description: String::new(),
            price: 20000,
            image: None,
            weight: String::new(),
            calories: None,
            is_active: true,
            is_popular: false,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn addon(items: Vec<i64>, categories: Vec<i64>) -> AddonWithLinks {
        AddonWithLinks {
            addon: Addon {
                id: 1,
                cafe_id: 1,
                group_id: None,
                name: "Сироп".into(),
                addon_type: "syrup".into(),
                price: 3000,
                is_active: true,
                sort_order: 0,
            },
            group_name: None,
            menu_item_ids: items,
            category_ids: categories,
        }
    }

    #[test]
    fn applicability_prefers_item_list() {
        assert!(addon(vec![], vec![]).is_applicable_to_item(&item(1, 1)));
        assert!(addon(vec![1], vec![9]).is_applicable_to_item(&item(1, 1)));
        assert!(!addon(vec![2], vec![1]).is_applicable_to_item(&item(1, 1)));
        assert!(addon(vec![], vec![1]).is_applicable_to_item(&item(5, 1)));
        assert!(!addon(vec![], vec![2]).is_applicable_to_item(&item(5, 1)));
    }

    #[test]
    fn group_label_falls_back_to_type() {
        assert_eq!(addon(vec![], vec![]).group_label(), "Сироп");
        let mut grouped = addon(vec![], vec![]);
        grouped.group_name = Some("Добавки".into());
        assert_eq!(grouped.group_label(), "Добавки");
    }
}
