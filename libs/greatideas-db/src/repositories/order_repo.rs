use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use greatideas_shared::OrderStatus;
use greatideas_shared::order_number::daily_number;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};

use crate::models::order::{NewOrder, Order, OrderItem, OrderItemAddonDetail, OrderItemDetail, PricedLine};

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct OrderItemRow {
    #[sqlx(flatten)]
    item: OrderItem,
    item_name: String,
    variant_name: Option<String>,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Writes the order, its items and their add-ons in one transaction.
    pub async fn create_with_items(&self, new: &NewOrder, lines: &[PricedLine], now: DateTime<Utc>) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let order_number = match &new.order_number {
            Some(n) => n.clone(),
            None => Self::next_daily_number(&mut tx, now).await?,
        };
        let total = lines.iter().fold(0i64, |acc, l| acc.saturating_add(l.total_price()));

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (cafe_id, user_id, order_number, status, delivery_type, total_amount, delivery_fee,
                                customer_name, customer_phone, delivery_address, comment, workspace_number,
                                created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new.cafe_id)
        .bind(new.user_id)
        .bind(&order_number)
        .bind(new.delivery_type.as_str())
        .bind(total)
        .bind(new.delivery_fee)
        .bind(&new.customer_name)
        .bind(&new.customer_phone)
        .bind(&new.delivery_address)
        .bind(&new.comment)
        .bind(new.workspace_number)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to create order")?;

        for line in lines {
            let item_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO order_items (order_id, menu_item_id, variant_id, quantity, base_price, variant_price,
                                         addons_price, final_price, total_price)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(order.id)
            .bind(line.menu_item_id)
            .bind(line.variant_id)
            .bind(line.quantity)
            .bind(line.base_price)
            .bind(line.variant_price)
            .bind(line.addons_price)
            .bind(line.final_price())
            .bind(line.total_price())
            .fetch_one(&mut *tx)
            .await
            .context("Failed to create order item")?;

            for addon_id in &line.addon_ids {
                sqlx::query("INSERT OR IGNORE INTO order_item_addons (order_item_id, addon_id) VALUES (?, ?)")
                    .bind(item_id)
                    .bind(addon_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to attach addon to order item")?;
            }
        }

        tx.commit().await.context("Failed to commit order")?;
        Ok(order)
    }

    async fn next_daily_number(tx: &mut Transaction<'_, Sqlite>, now: DateTime<Utc>) -> Result<String> {
        let today = now.date_naive();
        let start_of_day = today.and_hms_opt(0, 0, 0).map(|d| d.and_utc()).unwrap_or(now);
        let latest: Option<String> = sqlx::query_scalar(
            "SELECT order_number FROM orders WHERE created_at >= ? ORDER BY id DESC LIMIT 1",
        )
        .bind(start_of_day)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to fetch latest order number")?;
        Ok(daily_number(today, latest.as_deref()))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order")
    }

    pub async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = ?")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order by number")
    }

    /// Newest first. `limit = None` returns everything.
    pub async fn for_user(&self, user_id: i64, limit: Option<i64>) -> Result<Vec<Order>> {
        sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch user orders")
    }

    /// A pending or confirmed order created at or after `since`.
    pub async fn has_recent_active(&self, user_id: i64, since: DateTime<Utc>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE user_id = ? AND status IN ('pending', 'confirmed') AND created_at >= ?
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check recent orders")?;
        Ok(count > 0)
    }

    pub async fn items_with_details(&self, order_id: i64) -> Result<Vec<OrderItemDetail>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT oi.*, m.name AS item_name, v.name AS variant_name
            FROM order_items oi
            JOIN menu_items m ON m.id = oi.menu_item_id
            LEFT JOIN menu_item_variants v ON v.id = oi.variant_id
            WHERE oi.order_id = ?
            ORDER BY oi.id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch order items")?;

        let addons = sqlx::query_as::<_, OrderItemAddonDetail>(
            r#"
            SELECT oia.order_item_id, oia.addon_id, a.name, a.price
            FROM order_item_addons oia
            JOIN order_items oi ON oi.id = oia.order_item_id
            JOIN addons a ON a.id = oia.addon_id
            WHERE oi.order_id = ?
            ORDER BY a.sort_order, a.name
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch order item addons")?;

        Ok(rows
            .into_iter()
            .map(|row| OrderItemDetail {
                addons: addons
                    .iter()
                    .filter(|a| a.order_item_id == row.item.id)
                    .cloned()
                    .collect(),
                item: row.item,
                item_name: row.item_name,
                variant_name: row.variant_name,
            })
            .collect())
    }

    /// Sets the status; moving to delivered stamps `delivered_at`.
    pub async fn update_status(&self, id: i64, status: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, updated_at = ?,
                delivered_at = CASE WHEN ? THEN ? ELSE delivered_at END
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(status == OrderStatus::Delivered)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update order status")?;
        Ok(())
    }

    pub async fn set_staff_message(&self, id: i64, message_id: Option<i64>) -> Result<()> {
        sqlx::query(
            "UPDATE orders SET staff_notification_sent = 1, staff_message_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to store staff message")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::TelegramProfile;
    use crate::repositories::UserRepository;
    use chrono::Duration;

    async fn setup() -> (OrderRepository, crate::seed::DemoMenu, i64) {
        let pool = crate::db::connect_memory().await.unwrap();
        let menu = crate::seed::demo_menu(&pool).await.unwrap();
        let (user, _) = UserRepository::new(pool.clone())
            .upsert_profile(&TelegramProfile {
                telegram_id: 1001,
                first_name: "Анна".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        (OrderRepository::new(pool), menu, user.id)
    }

    fn latte_line(menu: &crate::seed::DemoMenu) -> PricedLine {
        PricedLine {
            menu_item_id: menu.latte_id,
            variant_id: Some(menu.latte_large_id),
            addon_ids: vec![menu.syrup_id, menu.oat_milk_id],
            quantity: 2,
            base_price: 25000,
            variant_price: 5000,
            addons_price: 7000,
        }
    }

    #[tokio::test]
    async fn creates_order_with_items_and_addons() {
        let (repo, menu, user_id) = setup().await;
        let order = repo
            .create_with_items(
                &NewOrder {
                    cafe_id: menu.cafe_id,
                    user_id,
                    order_number: Some("GI1234560ABC".into()),
                    customer_name: "Анна".into(),
                    workspace_number: Some(12),
                    ..Default::default()
                },
                &[latte_line(&menu)],
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(order.total_amount, 74000);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.workspace_number, Some(12));

        let items = repo.items_with_details(order.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name(), "Латте (Большой)");
        assert_eq!(items[0].item.final_price, 37000);
        assert_eq!(items[0].addons.len(), 2);
    }

    #[tokio::test]
    async fn daily_numbers_continue_within_a_day() {
        let (repo, menu, user_id) = setup().await;
        let now = Utc::now();
        let new = NewOrder {
            cafe_id: menu.cafe_id,
            user_id,
            ..Default::default()
        };
        let first = repo.create_with_items(&new, &[], now).await.unwrap();
        let second = repo.create_with_items(&new, &[], now + Duration::seconds(1)).await.unwrap();
        let prefix = now.format("%Y%m%d").to_string();
        assert_eq!(first.order_number, format!("{}001", prefix));
        assert_eq!(second.order_number, format!("{}002", prefix));
    }

    #[tokio::test]
    async fn daily_numbers_follow_insertion_order() {
        let (repo, menu, user_id) = setup().await;
        let now = Utc::now();
        let new = NewOrder {
            cafe_id: menu.cafe_id,
            user_id,
            ..Default::default()
        };
        repo.create_with_items(&new, &[], now + Duration::seconds(10)).await.unwrap();
        repo.create_with_items(&new, &[], now).await.unwrap();
        let third = repo.create_with_items(&new, &[], now + Duration::seconds(1)).await.unwrap();
        assert_eq!(third.order_number, format!("{}003", now.format("%Y%m%d")));
    }

    #[tokio::test]
    async fn recent_active_orders_are_detected() {
        let (repo, menu, user_id) = setup().await;
        let now = Utc::now();
        let order = repo
            .create_with_items(
                &NewOrder {
                    cafe_id: menu.cafe_id,
                    user_id,
                    ..Default::default()
                },
                &[],
                now,
            )
            .await
            .unwrap();

        assert!(repo.has_recent_active(user_id, now - Duration::minutes(5)).await.unwrap());
        assert!(!repo.has_recent_active(user_id, now + Duration::minutes(1)).await.unwrap());

        repo.update_status(order.id, OrderStatus::Delivered, now).await.unwrap();
        assert!(!repo.has_recent_active(user_id, now - Duration::minutes(5)).await.unwrap());
        let delivered = repo.get(order.id).await.unwrap().unwrap();
        assert!(delivered.delivered_at.is_some());
    }

    #[tokio::test]
    async fn user_orders_are_newest_first() {
        let (repo, menu, user_id) = setup().await;
        let now = Utc::now();
        let new = NewOrder {
            cafe_id: menu.cafe_id,
            user_id,
            ..Default::default()
        };
        let older = repo.create_with_items(&new, &[], now - Duration::hours(1)).await.unwrap();
        let newer = repo.create_with_items(&new, &[], now).await.unwrap();

        let orders = repo.for_user(user_id, Some(10)).await.unwrap();
        assert_eq!(orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert_eq!(repo.for_user(user_id, Some(1)).await.unwrap().len(), 1);
    }
}
