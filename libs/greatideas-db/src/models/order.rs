use chrono::{DateTime, Utc};
use greatideas_shared::{DeliveryType, OrderStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub cafe_id: i64,
    pub user_id: i64,
    pub order_number: String,
    pub status: String,
    pub delivery_type: String,
    pub total_amount: i64,
    pub delivery_fee: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub comment: String,
    pub workspace_number: Option<i64>,
    pub staff_notification_sent: bool,
    pub staff_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn status(&self) -> OrderStatus {
        self.status.parse().unwrap_or(OrderStatus::Pending)
    }

    pub fn delivery(&self) -> DeliveryType {
        self.delivery_type.parse().unwrap_or_default()
    }

    /// Amount charged to the customer.
    pub fn amount_due(&self) -> i64 {
        self.total_amount + self.delivery_fee
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
    pub base_price: i64,
    pub variant_price: i64,
    pub addons_price: i64,
    pub final_price: i64,
    pub total_price: i64,
    pub comment: String,
}

/// One add-on chosen for an order line, with its current catalogue price.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItemAddonDetail {
    pub order_item_id: i64,
    pub addon_id: i64,
    pub name: String,
    pub price: i64,
}

/// Order line joined with menu names, as shown to staff and customers.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItemDetail {
    pub item: OrderItem,
    pub item_name: String,
    pub variant_name: Option<String>,
    pub addons: Vec<OrderItemAddonDetail>,
}

impl OrderItemDetail {
    /// "name (variant)"
    pub fn display_name(&self) -> String {
        match &self.variant_name {
            Some(v) => format!("{} ({})", self.item_name, v),
            None => self.item_name.clone(),
        }
    }
}

/// A priced cart line ready to be written as an order item.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub menu_item_id: i64,
    pub variant_id: Option<i64>,
    pub addon_ids: Vec<i64>,
    pub quantity: i64,
    pub base_price: i64,
    pub variant_price: i64,
    pub addons_price: i64,
}

impl PricedLine {
    pub fn final_price(&self) -> i64 {
        self.base_price
            .saturating_add(self.variant_price)
            .saturating_add(self.addons_price)
    }

    pub fn total_price(&self) -> i64 {
        self.final_price().saturating_mul(self.quantity)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub cafe_id: i64,
    pub user_id: i64,
    pub order_number: Option<String>,
    pub delivery_type: DeliveryType,
    pub delivery_fee: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub comment: String,
    pub workspace_number: Option<i64>,
}
