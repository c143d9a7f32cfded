use anyhow::Result;
use chrono::{DateTime, Utc};
use greatideas_db::models::order::OrderItemDetail;
use greatideas_shared::hours::moscow_hhmm;
use greatideas_shared::money::format_rub;
use greatideas_shared::{DeliveryType, OrderStatus};
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::utils::html::escape;
use tracing::{error, info, warn};

use crate::bot::keyboards;
use crate::services::order_service::{OrderService, OrderSummary};

pub const DEFAULT_STAFF_NAME: &str = "Персонал";

/// Sends order messages to staff and customers. Missing bots or chat ids turn sends into no-ops.
#[derive(Clone)]
pub struct NotificationService {
    orders: OrderService,
    customer_bot: Option<Bot>,
    staff_bot: Option<Bot>,
    staff_chat_id: Option<i64>,
}

impl NotificationService {
    pub fn new(orders: OrderService, customer_bot: Option<Bot>, staff_bot: Option<Bot>, staff_chat_id: Option<i64>) -> Self {
        Self {
            orders,
            customer_bot,
            staff_bot,
            staff_chat_id,
        }
    }

    /// Posts the order to the staff chat with a "delivered" button and remembers the message id.
    pub async fn send_new_order_notification(&self, summary: &OrderSummary) -> Result<Option<i64>> {
        let Some(chat_id) = self.staff_chat_id else {
            warn!("STAFF_CHAT_ID is not set, order #{} not announced", summary.order.order_number);
            return Ok(None);
        };
        let Some(bot) = &self.staff_bot else {
            warn!("Staff bot is not configured, order #{} not announced", summary.order.order_number);
            return Ok(None);
        };

        let message = bot
            .send_message(ChatId(chat_id), format_new_order(summary))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::staff_order_keyboard(summary.order.id))
            .await?;

        let message_id = i64::from(message.id.0);
        self.orders.set_staff_message(summary.order.id, Some(message_id)).await?;
        info!("Staff notified about order #{}", summary.order.order_number);
        Ok(Some(message_id))
    }

    /// Loads the order and announces it. Errors are logged, never returned.
    pub async fn notify_staff_about_order(&self, order_id: i64) {
        let result = async {
            let Some(order) = self.orders.get(order_id).await? else {
                return Ok(None);
            };
            let summary = self.orders.summary(order).await?;
            self.send_new_order_notification(&summary).await
        }
        .await;
        if let Err(e) = result {
            error!("Failed to notify staff about order {}: {:#}", order_id, e);
        }
    }

    pub async fn mark_order_delivered(&self, order_id: i64, user_name: &str) -> bool {
        let order = match self.orders.set_status_by_id(order_id, OrderStatus::Delivered).await {
            Ok(order) => order,
            Err(e) => {
                error!("Failed to mark order {} as delivered: {}", order_id, e);
                return false;
            }
        };

        if let (Some(message_id), Some(chat_id), Some(bot)) =
            (order.staff_message_id, self.staff_chat_id, &self.staff_bot)
        {
            let delivered_at = order.delivered_at.unwrap_or_else(Utc::now);
            match self.orders.summary(order.clone()).await {
                Ok(summary) => {
                    let text = format_delivered(&summary, user_name, delivered_at);
                    if let Err(e) = bot
                        .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
                        .parse_mode(ParseMode::Html)
                        .await
                    {
                        error!("Failed to update staff message for order #{}: {}", order.order_number, e);
                    }
                }
                Err(e) => error!("Failed to load order #{} for staff message: {:#}", order.order_number, e),
            }
        }

        info!("Order #{} marked as delivered by {}", order.order_number, user_name);
        true
    }

    /// Tells the customer their gateway payment went through.
    pub async fn send_payment_notice(&self, summary: &OrderSummary) -> Result<bool> {
        let Some(bot) = &self.customer_bot else {
            warn!("Customer bot is not configured, payment notice for #{} skipped", summary.order.order_number);
            return Ok(false);
        };
        let Some(telegram_id) = summary.customer.as_ref().map(|u| u.telegram_id).filter(|id| *id != 0) else {
            return Ok(false);
        };

        bot.send_message(ChatId(telegram_id), format_payment_notice(summary))
            .parse_mode(ParseMode::Html)
            .await?;
        info!("Payment notice sent to {}", telegram_id);
        Ok(true)
    }
}

/// "• Латте (Большой) x2 + Сироп - 660.00 ₽"
pub fn format_item_line(detail: &OrderItemDetail) -> String {
    let mut line = format!("• {}", escape(&detail.display_name()));
    if detail.item.quantity > 1 {
        line.push_str(&format!(" x{}", detail.item.quantity));
    }
    if !detail.addons.is_empty() {
        let names: Vec<String> = detail.addons.iter().map(|a| escape(&a.name)).collect();
        line.push_str(&format!(" + {}", names.join(", ")));
    }
    line.push_str(&format!(" - {} ₽", format_rub(detail.item.total_price)));
    line
}

pub fn format_new_order(summary: &OrderSummary) -> String {
    let order = &summary.order;
    let delivery = match order.delivery() {
        DeliveryType::Pickup => "🏃 Самовывоз",
        DeliveryType::Delivery => "🚚 Доставка",
    };
    let items: Vec<String> = summary.items.iter().map(format_item_line).collect();

    let mut text = format!(
        "🆕 <b>НОВЫЙ ЗАКАЗ #{}</b>\n\n\
         🏪 <b>Кафе:</b> {}\n\
         👤 <b>Клиент:</b> {}\n\
         📞 <b>Телефон:</b> {}\n\
         {}\n",
        escape(&order.order_number),
        escape(summary.cafe_name()),
        escape(&summary.customer_name()),
        escape(&order.customer_phone),
        delivery,
    );
    if let Some(workspace) = order.workspace_number {
        text.push_str(&format!("💺 <b>Рабочее место:</b> {}\n", workspace));
    }
    text.push_str(&format!(
        "\n📋 <b>Состав заказа:</b>\n{}\n\n💰 <b>Общая сумма:</b> {} ₽\n⏰ <b>Время заказа:</b> {}\n",
        items.join("\n"),
        format_rub(order.total_amount),
        moscow_hhmm(order.created_at),
    ));
    if order.delivery() == DeliveryType::Delivery && !order.delivery_address.is_empty() {
        text.push_str(&format!("📍 <b>Адрес доставки:</b> {}\n", escape(&order.delivery_address)));
    }
    if !order.comment.is_empty() {
        text.push_str(&format!("💬 <b>Комментарий:</b> {}\n", escape(&order.comment)));
    }
    text.trim_end().to_string()
}

pub fn format_delivered(summary: &OrderSummary, user_name: &str, delivered_at: DateTime<Utc>) -> String {
    format!(
        "✅ <b>ЗАКАЗ #{} ДОСТАВЛЕН</b>\n\n\
         👤 Доставил: {}\n\
         ⏰ Время доставки: {}\n\
         🏪 Кафе: {}\n\
         👤 Клиент: {}",
        escape(&summary.order.order_number),
        escape(user_name),
        moscow_hhmm(delivered_at),
        escape(summary.cafe_name()),
        escape(&summary.customer_name()),
    )
}

pub fn format_payment_notice(summary: &OrderSummary) -> String {
    format!(
        "✅ <b>Платеж успешен!</b>\n\
         Номер заказа: <b>#{}</b>\n\
         Сумма: {} ₽\n\
         Спасибо за покупку! 🎉\n\n\
         📋 Ваш заказ передан в кафе и готовится.\n\
         🔔 Вы получите уведомление, когда заказ будет готов.\n\n\
         🏪 Кафе: {}\n\
         📍 {}\n\n\
         👆 <b>Посмотреть ваш заказ вы можете в приложении</b>",
        escape(&summary.order.order_number),
        format_rub(summary.order.amount_due()),
        escape(summary.cafe_name()),
        escape(summary.cafe_address()),
    )
}

/// Reply to the customer after Telegram Payments confirms the charge.
pub fn format_payment_success(summary: &OrderSummary) -> String {
    let items: Vec<String> = summary
        .items
        .iter()
        .map(|d| {
            format!(
                "• {} x{} - {} ₽",
                escape(&d.display_name()),
                d.item.quantity,
                format_rub(d.item.total_price)
            )
        })
        .collect();
    format!(
        "✅ <b>Платеж успешно обработан!</b>\n\n\
         🧾 Заказ: <b>#{}</b>\n\
         🏪 Кафе: {}\n\
         💰 Сумма: {} ₽\n\
         📋 Статус: Оплачен\n\n\
         <b>Состав заказа:</b>\n{}",
        escape(&summary.order.order_number),
        escape(summary.cafe_name()),
        format_rub(summary.order.amount_due()),
        items.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use greatideas_db::models::order::{Order, OrderItem, OrderItemAddonDetail};

    fn summary(delivery: &str) -> OrderSummary {
        let created = Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap();
        OrderSummary {
            order: Order {
                id: 7,
                cafe_id: 1,
                user_id: 1,
                order_number: "GI123456ABCD".into(),
                status: "confirmed".into(),
                delivery_type: delivery.into(),
                total_amount: 81000,
                delivery_fee: 0,
                customer_name: "Анна".into(),
                customer_phone: "+79990001122".into(),
                delivery_address: "Офис 5".into(),
                comment: "Без сахара & льда".into(),
                workspace_number: Some(12),
                staff_notification_sent: false,
                staff_message_id: None,
                created_at: created,
                updated_at: created,
                delivered_at: None,
            },
            cafe: None,
            customer: None,
            items: vec![
                OrderItemDetail {
                    item: OrderItem {
                        id: 1,
                        order_id: 7,
                        menu_item_id: 1,
                        variant_id: Some(2),
                        quantity: 2,
                        base_price: 25000,
                        variant_price: 5000,
                        addons_price: 3000,
                        final_price: 33000,
                        total_price: 66000,
                        comment: String::new(),
                    },
                    item_name: "Латте".into(),
                    variant_name: Some("Большой".into()),
                    addons: vec![OrderItemAddonDetail {
                        order_item_id: 1,
                        addon_id: 3,
                        name: "Ванильный сироп".into(),
                        price: 3000,
                    }],
                },
                OrderItemDetail {
                    item: OrderItem {
                        id: 2,
                        order_id: 7,
                        menu_item_id: 3,
                        variant_id: None,
                        quantity: 1,
                        base_price: 15000,
                        variant_price: 0,
                        addons_price: 0,
                        final_price: 15000,
                        total_price: 15000,
                        comment: String::new(),
                    },
                    item_name: "Круассан".into(),
                    variant_name: None,
                    addons: vec![],
                },
            ],
        }
    }

    #[test]
    fn item_lines_show_quantity_only_above_one() {
        let s = summary("pickup");
        assert_eq!(format_item_line(&s.items[0]), "• Латте (Большой) x2 + Ванильный сироп - 660.00 ₽");
        assert_eq!(format_item_line(&s.items[1]), "• Круассан - 150.00 ₽");
    }

    #[test]
    fn new_order_message_for_pickup() {
        let text = format_new_order(&summary("pickup"));
        assert!(text.starts_with("🆕 <b>НОВЫЙ ЗАКАЗ #GI123456ABCD</b>"));
        assert!(text.contains("🏃 Самовывоз"));
        assert!(text.contains("💰 <b>Общая сумма:</b> 810.00 ₽"));
        assert!(text.contains("⏰ <b>Время заказа:</b> 12:30"));
        assert!(text.contains("Без сахара &amp; льда"));
        assert!(!text.contains("Адрес доставки"));
    }

    #[test]
    fn new_order_message_for_delivery_has_address() {
        let text = format_new_order(&summary("delivery"));
        assert!(text.contains("🚚 Доставка"));
        assert!(text.contains("📍 <b>Адрес доставки:</b> Офис 5"));
    }

    #[test]
    fn delivered_message() {
        let at = Utc.with_ymd_and_hms(2025, 6, 2, 10, 5, 0).unwrap();
        let text = format_delivered(&summary("pickup"), "Иван (@ivan)", at);
        assert!(text.starts_with("✅ <b>ЗАКАЗ #GI123456ABCD ДОСТАВЛЕН</b>"));
        assert!(text.contains("👤 Доставил: Иван (@ivan)"));
        assert!(text.contains("⏰ Время доставки: 13:05"));
        assert!(text.ends_with("👤 Клиент: Анна"));
    }

    #[tokio::test]
    async fn sends_are_noops_without_bots() {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let orders = crate::services::test_support::order_service(&pool).await;
        let service = NotificationService::new(orders, None, None, Some(-100));
        assert_eq!(service.send_new_order_notification(&summary("pickup")).await.unwrap(), None);
        assert!(!service.send_payment_notice(&summary("pickup")).await.unwrap());
        assert!(!service.mark_order_delivered(424242, DEFAULT_STAFF_NAME).await);
    }
}
