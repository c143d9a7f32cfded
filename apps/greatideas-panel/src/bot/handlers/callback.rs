use greatideas_db::models::cafe::Cafe;
use greatideas_shared::money::format_rub;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardMarkup, ParseMode};
use teloxide::utils::html::escape;
use tracing::{error, info, warn};
use url::Url;

use super::log_reply;
use crate::bot::keyboards;
use crate::AppState;

pub const MAIN_MENU_TEXT: &str = "🏠 <b>Главное меню</b>\n\nВыберите действие:";
pub const NO_CAFES_TEXT: &str = "😔 Кафе временно недоступны\n\nПопробуйте позже.";
pub const CAFE_NOT_FOUND_TEXT: &str = "😔 Кафе не найдено или временно недоступно";

pub fn about_text(window: &str) -> String {
    format!(
        "☕ <b>О сервисе GreatIdeas</b>\n\n\
        Мы привозим кофе и еду из кафе-партнеров прямо к вашему рабочему месту.\n\n\
        🕐 Заказы принимаются с {}\n\
        💳 Оплата картой через Telegram",
        window
    )
}

pub fn cafes_text(count: usize) -> String {
    format!("🏪 <b>Выберите кафе</b> ({} доступно)", count)
}

pub fn cafe_text(cafe: &Cafe) -> String {
    let mut text = format!("☕ <b>{}</b>\n", escape(&cafe.name));
    if !cafe.description.is_empty() {
        text.push_str(&format!("\n{}\n", escape(&cafe.description)));
    }
    text.push_str(&format!("\n📍 <b>Адрес:</b> {}", escape(&cafe.address)));
    if !cafe.working_hours.is_empty() {
        text.push_str(&format!("\n🕐 <b>Часы работы:</b> {}", escape(&cafe.working_hours)));
    }
    if !cafe.phone.is_empty() {
        text.push_str(&format!("\n📞 <b>Телефон:</b> {}", escape(&cafe.phone)));
    }
    if cafe.min_order_amount > 0 {
        text.push_str(&format!("\n💰 <b>Минимальный заказ:</b> {} ₽", format_rub(cafe.min_order_amount)));
    }
    if cafe.delivery_fee > 0 {
        text.push_str(&format!("\n🚚 <b>Доставка:</b> {} ₽", format_rub(cafe.delivery_fee)));
    }
    text
}

/// `cafe_12` → 12.
pub fn parse_cafe_callback(data: &str) -> Option<i64> {
    data.strip_prefix("cafe_")?.parse().ok()
}

pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: AppState) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    bot.answer_callback_query(q.id.clone()).await?;

    let (Some(data), Some(msg)) = (q.data.as_deref(), q.message.as_ref()) else {
        return Ok(());
    };
    let tg_id = q.from.id.0 as i64;

    let (message_type, text, markup): (&str, String, InlineKeyboardMarkup) = match data {
        "main_menu" => (
            "main_menu",
            MAIN_MENU_TEXT.to_string(),
            keyboards::main_menu_keyboard(state.site_url().as_ref()),
        ),
        "about_service" => {
            let window = state.settings.order_window().await.describe();
            ("about", about_text(&window), keyboards::back_to_menu_keyboard())
        }
        "show_cafes" => match state.cafes.list_active().await {
            Ok(cafes) if !cafes.is_empty() => ("cafes", cafes_text(cafes.len()), keyboards::cafes_keyboard(&cafes)),
            Ok(_) => ("cafes", NO_CAFES_TEXT.to_string(), keyboards::back_to_menu_keyboard()),
            Err(e) => {
                error!("Failed to list cafes: {:#}", e);
                ("cafes", NO_CAFES_TEXT.to_string(), keyboards::back_to_menu_keyboard())
            }
        },
        other => match parse_cafe_callback(other) {
            Some(cafe_id) => match state.cafes.get_active(cafe_id).await {
                Ok(Some(cafe)) => {
                    remember_cafe(&state, tg_id, cafe.id).await;
                    let menu_url = Url::parse(&state.config.site_link(&format!("cafe/{}/", cafe.id))).ok();
                    ("cafe_details", cafe_text(&cafe), keyboards::cafe_keyboard(menu_url))
                }
                Ok(None) => ("cafe_details", CAFE_NOT_FOUND_TEXT.to_string(), keyboards::back_to_menu_keyboard()),
                Err(e) => {
                    error!("Failed to load cafe {}: {:#}", cafe_id, e);
                    ("cafe_details", CAFE_NOT_FOUND_TEXT.to_string(), keyboards::back_to_menu_keyboard())
                }
            },
            None => {
                warn!("Unknown callback data: {}", other);
                return Ok(());
            }
        },
    };

    bot.edit_message_text(msg.chat().id, msg.id(), &text)
        .parse_mode(ParseMode::Html)
        .reply_markup(markup)
        .await?;
    log_reply(&state, tg_id, message_type, &text).await;
    Ok(())
}

async fn remember_cafe(state: &AppState, telegram_id: i64, cafe_id: i64) {
    let result = async {
        if let Some(user) = state.users.get_by_telegram_id(telegram_id).await? {
            state.bot_log.set_navigation(user.id, Some(cafe_id), "cafe_selected").await?;
        }
        anyhow::Ok(())
    }
    .await;
    if let Err(e) = result {
        warn!("Failed to store bot navigation for {}: {:#}", telegram_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cafe(min_order_amount: i64, delivery_fee: i64) -> Cafe {
        Cafe {
            id: 3,
            name: "GreatIdeas Coffee".into(),
            slug: "greatideas-coffee".into(),
            description: String::new(),
            address: "Москва, ул. Тверская, 7".into(),
            phone: "+74951234567".into(),
            working_hours: "08:00-20:00".into(),
            logo: None,
            cover_image: None,
            is_active: true,
            min_order_amount,
            delivery_fee,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cafe_text_shows_fees_only_when_set() {
        let plain = cafe_text(&cafe(0, 0));
        assert!(plain.contains("Тверская"));
        assert!(!plain.contains("Минимальный заказ"));
        assert!(!plain.contains("Доставка"));

        let paid = cafe_text(&cafe(50000, 15000));
        assert!(paid.contains("Минимальный заказ:</b> 500.00 ₽"));
        assert!(paid.contains("Доставка:</b> 150.00 ₽"));
    }

    #[test]
    fn cafe_callback_needs_numeric_id() {
        assert_eq!(parse_cafe_callback("cafe_12"), Some(12));
        assert_eq!(parse_cafe_callback("cafe_x"), None);
        assert_eq!(parse_cafe_callback("show_cafes"), None);
    }
}
