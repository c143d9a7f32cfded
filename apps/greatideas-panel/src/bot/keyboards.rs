use greatideas_db::models::cafe::Cafe;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, WebAppInfo};
use url::Url;

pub fn welcome_keyboard(site_url: Option<&Url>) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Some(url) = site_url {
        rows.push(vec![InlineKeyboardButton::web_app(
            "🚀 Открыть GreatIdeas",
            WebAppInfo { url: url.clone() },
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback("ℹ️ О сервисе", "about_service")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn help_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🏠 Главное меню", "main_menu"),
        InlineKeyboardButton::callback("🏪 Выбрать кафе", "show_cafes"),
    ]])
}

pub fn main_menu_keyboard(site_url: Option<&Url>) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![InlineKeyboardButton::callback("🏪 Выбрать кафе", "show_cafes")],
        vec![InlineKeyboardButton::callback("ℹ️ О сервисе", "about_service")],
    ];
    if let Some(url) = site_url {
        rows.push(vec![InlineKeyboardButton::url("🌐 Открыть веб-сайт", url.clone())]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn back_to_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("🏠 Главное меню", "main_menu")]])
}

pub fn cafes_keyboard(cafes: &[Cafe]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = cafes
        .iter()
        .map(|cafe| vec![InlineKeyboardButton::callback(format!("☕ {}", cafe.name), format!("cafe_{}", cafe.id))])
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("🏠 Главное меню", "main_menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn cafe_keyboard(menu_url: Option<Url>) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Some(url) = menu_url {
        rows.push(vec![InlineKeyboardButton::url("🍽️ Открыть меню", url)]);
    }
    rows.push(vec![InlineKeyboardButton::callback("🏪 Другие кафе", "show_cafes")]);
    rows.push(vec![InlineKeyboardButton::callback("🏠 Главное меню", "main_menu")]);
    InlineKeyboardMarkup::new(rows)
}

/// Button under each staff order message.
pub fn staff_order_keyboard(order_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ Доставлено",
        format!("deliver_order_{}", order_id),
    )]])
}
