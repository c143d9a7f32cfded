use teloxide::{dptree, prelude::*, types::Update};
use teloxide::types::{CallbackQuery, User};
use tracing::{error, info, warn};

use crate::AppState;

pub const DELIVERED_ALERT: &str = "✅ Заказ отмечен как доставленный!";
pub const UPDATE_FAILED_ALERT: &str = "❌ Ошибка при обновлении статуса заказа";
pub const BAD_DATA_ALERT: &str = "❌ Неверный формат данных";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverCallback {
    Order(i64),
    Malformed,
}

/// Only `deliver_order_<digits>` is a delivery request. Other `deliver_order_` data is malformed.
pub fn parse_deliver_callback(data: &str) -> Option<DeliverCallback> {
    let rest = data.strip_prefix("deliver_order_")?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Some(DeliverCallback::Malformed);
    }
    Some(rest.parse().map_or(DeliverCallback::Malformed, DeliverCallback::Order))
}

/// "first[ last][ (@username)]"
pub fn staff_display_name(user: &User) -> String {
    let mut name = user.first_name.clone();
    if let Some(last) = user.last_name.as_deref().filter(|l| !l.is_empty()) {
        name.push(' ');
        name.push_str(last);
    }
    if let Some(username) = user.username.as_deref().filter(|u| !u.is_empty()) {
        name.push_str(&format!(" (@{})", username));
    }
    name
}

async fn staff_message_handler(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    if msg.text().is_some_and(|t| t.starts_with("/start")) {
        bot.send_message(
            msg.chat.id,
            format!(
                "👋 Бот персонала GreatIdeas.\nСюда приходят новые заказы.\n\nID этого чата: {}",
                msg.chat.id.0
            ),
        )
        .await?;
    }
    Ok(())
}

async fn staff_callback_handler(bot: Bot, q: CallbackQuery, state: AppState) -> Result<(), teloxide::RequestError> {
    let Some(parsed) = q.data.as_deref().and_then(parse_deliver_callback) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let alert = match parsed {
        DeliverCallback::Malformed => {
            warn!("Malformed staff callback: {:?}", q.data);
            BAD_DATA_ALERT
        }
        DeliverCallback::Order(order_id) => {
            let user_name = staff_display_name(&q.from);
            if state.notification_service.mark_order_delivered(order_id, &user_name).await {
                DELIVERED_ALERT
            } else {
                UPDATE_FAILED_ALERT
            }
        }
    };

    bot.answer_callback_query(q.id.clone()).text(alert).show_alert(true).await?;
    Ok(())
}

pub async fn run_staff_bot(
    bot: Bot,
    mut shutdown_signal: tokio::sync::broadcast::Receiver<()>,
    state: AppState,
) {
    info!("Starting staff bot dispatcher...");
    match bot.get_me().await {
        Ok(me) => info!("Staff bot connected as: @{}", me.username.clone().unwrap_or_default()),
        Err(e) => {
            error!("Staff bot failed to connect to Telegram: {}", e);
            return;
        }
    }

    let mut dispatcher = Dispatcher::builder(
        bot,
        dptree::entry()
            .branch(Update::filter_message().endpoint(staff_message_handler))
            .branch(Update::filter_callback_query().endpoint(staff_callback_handler)),
    )
    .dependencies(dptree::deps![state])
    .default_handler(|_upd: std::sync::Arc<Update>| async {})
    .build();

    tokio::select! {
        _ = dispatcher.dispatch() => {
            info!("Staff bot dispatcher exited");
        }
        _ = shutdown_signal.recv() => {
            info!("Staff bot received shutdown signal, stopping...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::UserId;

    #[test]
    fn deliver_callbacks() {
        assert_eq!(parse_deliver_callback("deliver_order_15"), Some(DeliverCallback::Order(15)));
        assert_eq!(parse_deliver_callback("deliver_order_"), Some(DeliverCallback::Malformed));
        assert_eq!(parse_deliver_callback("deliver_order_1a"), Some(DeliverCallback::Malformed));
        assert_eq!(
            parse_deliver_callback("deliver_order_99999999999999999999"),
            Some(DeliverCallback::Malformed)
        );
        assert_eq!(parse_deliver_callback("main_menu"), None);
    }

    #[test]
    fn display_name_includes_optional_parts() {
        let mut user = User {
            id: UserId(5),
            is_bot: false,
            first_name: "Анна".into(),
            last_name: None,
            username: None,
            language_code: None,
            is_premium: false,
            added_to_attachment_menu: false,
        };
        assert_eq!(staff_display_name(&user), "Анна");
        user.last_name = Some("Петрова".into());
        user.username = Some("anna_p".into());
        assert_eq!(staff_display_name(&user), "Анна Петрова (@anna_p)");
    }
}
