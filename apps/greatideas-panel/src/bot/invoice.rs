use anyhow::{Context, Result};
use greatideas_shared::DeliveryType;
use teloxide::prelude::*;
use teloxide::types::LabeledPrice;
use url::Url;

use crate::services::order_service::{Checkout, InvoicePrice};

pub const CURRENCY: &str = "RUB";
pub const TEST_PAYLOAD_PREFIX: &str = "test_payment_";

pub fn is_test_payload(payload: &str) -> bool {
    payload.starts_with(TEST_PAYLOAD_PREFIX)
}

fn labeled(prices: &[InvoicePrice]) -> Result<Vec<LabeledPrice>> {
    prices
        .iter()
        .map(|p| {
            let amount = u32::try_from(p.amount).with_context(|| format!("Invoice amount out of range: {}", p.amount))?;
            Ok(LabeledPrice::new(p.label.clone(), amount))
        })
        .collect()
}

/// Sends the Telegram invoice for a web checkout to the buyer's chat.
pub async fn send_order_invoice(bot: &Bot, chat_id: i64, provider_token: &str, checkout: &Checkout) -> Result<()> {
    let mut request = bot
        .send_invoice(
            ChatId(chat_id),
            checkout.invoice_title(),
            checkout.invoice_description(),
            checkout.payment.invoice_payload.clone(),
            CURRENCY,
            labeled(&checkout.prices)?,
        )
        .provider_token(provider_token)
        .need_name(true)
        .need_phone_number(true)
        .need_shipping_address(checkout.order.delivery() == DeliveryType::Delivery);

    if let Some(logo) = checkout.cafe.logo.as_deref().and_then(|l| Url::parse(l).ok()) {
        request = request.photo_url(logo);
    }

    request.await.context("Failed to send invoice")?;
    Ok(())
}

/// Fixed two-item invoice used to check the payment provider.
pub async fn send_test_invoice(bot: &Bot, chat_id: ChatId, user_id: i64, provider_token: &str) -> Result<()> {
    let prices = [
        InvoicePrice {
            label: "Кофе Латте".into(),
            amount: 25000,
        },
        InvoicePrice {
            label: "Круассан".into(),
            amount: 15000,
        },
    ];
    bot.send_invoice(
        chat_id,
        "Тестовый заказ GreatIdeas",
        "Тестирование платежной системы с ЮKassa",
        format!("{}{}", TEST_PAYLOAD_PREFIX, user_id),
        CURRENCY,
        labeled(&prices)?,
    )
    .provider_token(provider_token)
    .await
    .context("Failed to send test invoice")?;
    Ok(())
}
