use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html::escape;
use tracing::{debug, error, info};

use super::{log_reply, payment, profile_from};
use crate::bot::{invoice, keyboards};
use crate::AppState;

pub fn welcome_text(first_name: &str) -> String {
    format!(
        "🎉 Добро пожаловать в GreatIdeas!\n\n\
        Привет, {}! Здесь можно заказать кофе и перекус прямо к рабочему месту.\n\n\
        Нажмите «Открыть GreatIdeas», чтобы выбрать кафе и собрать заказ.",
        escape(first_name)
    )
}

pub const HELP_TEXT: &str = "ℹ️ <b>Как сделать заказ</b>\n\n\
    1. Откройте GreatIdeas и выберите кафе\n\
    2. Добавьте напитки и еду в корзину\n\
    3. Укажите номер рабочего места и оплатите заказ в Telegram\n\n\
    <b>Команды</b>\n\
    /start - главное меню\n\
    /help - эта справка\n\
    /pay - тестовый платеж";

/// `/start`, `/start@bot payload` → `/start`.
pub fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    first.split('@').next()
}

pub async fn message_handler(bot: Bot, msg: Message, state: AppState) -> Result<(), teloxide::RequestError> {
    if let Some(paid) = msg.successful_payment() {
        return payment::successful_payment_handler(&bot, &msg, paid, &state).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };
    let tg_id = msg.chat.id.0;

    match command_name(text) {
        Some("/start") => {
            let first_name = match msg.from.as_ref() {
                Some(from) => match state.users.upsert_profile(&profile_from(from)).await {
                    Ok((user, created)) => {
                        if created {
                            info!("New Telegram user {} registered via /start", user.telegram_id);
                        }
                        user.first_name
                    }
                    Err(e) => {
                        error!("Failed to upsert user on /start: {:#}", e);
                        from.first_name.clone()
                    }
                },
                None => String::new(),
            };

            let text = welcome_text(&first_name);
            bot.send_message(msg.chat.id, &text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::welcome_keyboard(state.site_url().as_ref()))
                .await?;
            log_reply(&state, tg_id, "welcome", &text).await;
        }
        Some("/help") => {
            bot.send_message(msg.chat.id, HELP_TEXT)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::help_keyboard())
                .await?;
            log_reply(&state, tg_id, "help", HELP_TEXT).await;
        }
        Some("/pay") => {
            let Some(token) = state.config.payment_provider_token.as_deref() else {
                bot.send_message(msg.chat.id, "❌ Платежи временно недоступны").await?;
                return Ok(());
            };
            let user_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(tg_id);
            match invoice::send_test_invoice(&bot, msg.chat.id, user_id, token).await {
                Ok(()) => log_reply(&state, tg_id, "invoice", "Тестовый заказ GreatIdeas").await,
                Err(e) => {
                    error!("Test invoice for {} failed: {:#}", tg_id, e);
                    bot.send_message(msg.chat.id, "❌ Не удалось создать тестовый платеж").await?;
                }
            }
        }
        _ => debug!("Ignoring message from {}", tg_id),
    }
    Ok(())
}
