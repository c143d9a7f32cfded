use serde_json::Value;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, PreCheckoutQuery, SuccessfulPayment};
use tracing::{error, info, warn};

use super::log_reply;
use crate::bot::invoice::is_test_payload;
use crate::services::notification_service::format_payment_success;
use crate::services::order_service::OrderError;
use crate::AppState;

pub const ALREADY_PAID_TEXT: &str = "Этот заказ уже оплачен";
pub const CHECK_FAILED_TEXT: &str = "Произошла ошибка при проверке заказа";
pub const PAYMENT_FAILED_TEXT: &str = "❌ Произошла ошибка при обработке платежа. Обратитесь в поддержку.";

/// Error text for a failed pre-checkout, `None` when the payment may proceed.
pub fn pre_checkout_error(result: &Result<(), OrderError>) -> Option<&'static str> {
    match result {
        Ok(()) => None,
        Err(OrderError::AlreadyPaid) => Some(ALREADY_PAID_TEXT),
        Err(_) => Some(CHECK_FAILED_TEXT),
    }
}

/// Charge ids as plain strings, whatever wrapper types the API layer uses.
pub fn charge_ids(payment: &SuccessfulPayment) -> (String, String) {
    let value = serde_json::to_value(payment).unwrap_or(Value::Null);
    let field = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    (field("telegram_payment_charge_id"), field("provider_payment_charge_id"))
}

pub async fn pre_checkout_handler(bot: Bot, q: PreCheckoutQuery, state: AppState) -> Result<(), teloxide::RequestError> {
    let payload = q.invoice_payload.clone();
    info!("Pre-checkout for payload {}", payload);

    let result = if is_test_payload(&payload) {
        Ok(())
    } else {
        state.order_service.validate_pre_checkout(&payload).await.map(|_| ())
    };

    match pre_checkout_error(&result) {
        None => {
            bot.answer_pre_checkout_query(q.id, true).await?;
        }
        Some(message) => {
            if let Err(e) = &result {
                warn!("Pre-checkout rejected for {}: {}", payload, e);
            }
            bot.answer_pre_checkout_query(q.id, false).error_message(message).await?;
        }
    }
    Ok(())
}

pub async fn successful_payment_handler(
    bot: &Bot,
    msg: &Message,
    payment: &SuccessfulPayment,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    let tg_id = msg.chat.id.0;
    let payload = payment.invoice_payload.as_str();

    if is_test_payload(payload) {
        info!("Test payment received from {}", tg_id);
        bot.send_message(msg.chat.id, "✅ Тестовый платеж прошел успешно!").await?;
        return Ok(());
    }

    let (telegram_charge, provider_charge) = charge_ids(payment);
    let result = async {
        let (order, _) = state
            .order_service
            .process_successful_payment(payload, &telegram_charge, &provider_charge)
            .await?;
        let summary = state.order_service.summary(order).await?;
        Ok::<_, OrderError>(summary)
    }
    .await;

    match result {
        Ok(summary) => {
            let text = format_payment_success(&summary);
            bot.send_message(msg.chat.id, &text).parse_mode(ParseMode::Html).await?;
            log_reply(state, tg_id, "payment_success", &text).await;
            state.notification_service.notify_staff_about_order(summary.order.id).await;
        }
        Err(e) => {
            error!("Failed to process payment {} from {}: {}", payload, tg_id, e);
            bot.send_message(msg.chat.id, PAYMENT_FAILED_TEXT).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_checkout_messages() {
        assert_eq!(pre_checkout_error(&Ok(())), None);
        assert_eq!(pre_checkout_error(&Err(OrderError::AlreadyPaid)), Some(ALREADY_PAID_TEXT));
        assert_eq!(pre_checkout_error(&Err(OrderError::OrderNotFound)), Some(CHECK_FAILED_TEXT));
    }
}
