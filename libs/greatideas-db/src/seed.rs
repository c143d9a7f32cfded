//! Demo catalogue used by the `seed` command and by tests.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::models::cafe::NewCafe;
use crate::models::menu::{NewAddon, NewMenuItem};
use crate::repositories::{CafeRepository, MenuRepository};

#[derive(Debug, Clone, Copy)]
pub struct DemoMenu {
    pub cafe_id: i64,
    pub coffee_category_id: i64,
    pub pastry_category_id: i64,
    pub latte_id: i64,
    pub cappuccino_id: i64,
    pub croissant_id: i64,
    pub latte_small_id: i64,
    pub latte_large_id: i64,
    pub oat_milk_id: i64,
    pub syrup_id: i64,
    pub jam_id: i64,
}

/// Creates the demo cafe only when the catalogue is empty.
pub async fn seed_demo_if_empty(pool: &SqlitePool) -> Result<Option<DemoMenu>> {
    let cafes = CafeRepository::new(pool.clone());
    if cafes.count_all().await? > 0 {
        tracing::info!("Cafes already exist, skipping demo seed");
        return Ok(None);
    }
    let menu = demo_menu(pool).await?;
    tracing::info!("Seeded demo cafe #{}", menu.cafe_id);
    Ok(Some(menu))
}

pub async fn demo_menu(pool: &SqlitePool) -> Result<DemoMenu> {
    let cafes = CafeRepository::new(pool.clone());
    let menu = MenuRepository::new(pool.clone());

    let cafe = cafes
        .create(&NewCafe {
            name: "GreatIdeas Coffee".into(),
            slug: "greatideas".into(),
            description: "Кофейня в коворкинге GreatIdeas".into(),
            address: "Москва, ул. Тверская, 7".into(),
            phone: "+74950000000".into(),
            working_hours: "Пн-Пт 10:00-19:00".into(),
            ..Default::default()
        })
        .await?;

    let coffee = menu.create_category(cafe.id, "Кофе", "Свежесваренный кофе", 0).await?;
    let pastry = menu.create_category(cafe.id, "Выпечка", "", 1).await?;

    let latte = menu
        .create_item(&NewMenuItem {
            cafe_id: cafe.id,
            category_id: coffee.id,
            name: "Латте".into(),
            description: "Эспрессо с молоком".into(),
            price: 25000,
            weight: "250 мл".into(),
            is_popular: true,
            sort_order: 0,
            ..Default::default()
        })
        .await?;
    let cappuccino = menu
        .create_item(&NewMenuItem {
            cafe_id: cafe.id,
            category_id: coffee.id,
            name: "Капучино".into(),
            price: 22000,
            weight: "200 мл".into(),
            sort_order: 1,
            ..Default::default()
        })
        .await?;
    let croissant = menu
        .create_item(&NewMenuItem {
            cafe_id: cafe.id,
            category_id: pastry.id,
            name: "Круассан".into(),
            price: 15000,
            weight: "80 г".into(),
            calories: Some(320),
            ..Default::default()
        })
        .await?;

    let small = menu.create_variant(latte.id, "Маленький", "250 мл", 0, true, 0).await?;
    let large = menu.create_variant(latte.id, "Большой", "400 мл", 5000, false, 1).await?;

    let milk_group = menu.create_addon_group(cafe.id, "Молоко", false, 1, 0).await?;
    let syrup_group = menu.create_addon_group(cafe.id, "Сиропы", false, 2, 1).await?;

    let oat_milk = menu
        .create_addon(&NewAddon {
            cafe_id: cafe.id,
            group_id: Some(milk_group.id),
            name: "Овсяное молоко".into(),
            addon_type: "milk".into(),
            price: 4000,
            category_ids: vec![coffee.id],
            ..Default::default()
        })
        .await?;
    let syrup = menu
        .create_addon(&NewAddon {
            cafe_id: cafe.id,
            group_id: Some(syrup_group.id),
            name: "Ванильный сироп".into(),
            addon_type: "syrup".into(),
            price: 3000,
            menu_item_ids: vec![latte.id, cappuccino.id],
            ..Default::default()
        })
        .await?;
    let jam = menu
        .create_addon(&NewAddon {
            cafe_id: cafe.id,
            name: "Джем".into(),
            addon_type: "extra".into(),
            price: 2000,
            category_ids: vec![pastry.id],
            ..Default::default()
        })
        .await?;

    Ok(DemoMenu {
        cafe_id: cafe.id,
        coffee_category_id: coffee.id,
        pastry_category_id: pastry.id,
        latte_id: latte.id,
        cappuccino_id: cappuccino.id,
        croissant_id: croissant.id,
        latte_small_id: small.id,
        latte_large_id: large.id,
        oat_milk_id: oat_milk.id,
        syrup_id: syrup.id,
        jam_id: jam.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_only_once() {
        let pool = crate::db::connect_memory().await.unwrap();
        assert!(seed_demo_if_empty(&pool).await.unwrap().is_some());
        assert!(seed_demo_if_empty(&pool).await.unwrap().is_none());
    }
}
