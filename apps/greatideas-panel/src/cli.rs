use anyhow::{Context, Result};
use greatideas_db::repositories::GameRepository;
use greatideas_shared::OrderStatus;
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::services::game_content::load_test_events;
use crate::AppState;

pub async fn seed(pool: &SqlitePool) -> Result<()> {
    match greatideas_db::seed::seed_demo_if_empty(pool).await? {
        Some(menu) => println!("Demo cafe #{} created with its menu.", menu.cafe_id),
        None => println!("Cafes already exist, nothing to seed."),
    }
    Ok(())
}

pub async fn load_game_events(pool: &SqlitePool) -> Result<()> {
    let stats = load_test_events(&GameRepository::new(pool.clone())).await?;
    println!(
        "Game content loaded: {} skills, {} events, {} choices, {} achievements.",
        stats.skills, stats.events, stats.choices, stats.achievements
    );
    Ok(())
}

pub async fn set_status(state: &AppState, order_number: &str, status: &str) -> Result<()> {
    let status: OrderStatus = status.trim().parse().with_context(|| {
        let allowed: Vec<&str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();
        format!("Status must be one of: {}", allowed.join(", "))
    })?;
    let order = state
        .order_service
        .set_status(order_number, status)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to update order {}: {}", order_number, e))?;

    println!("Order {} is now '{}'.", order.order_number, order.status().display_name());
    if let Some(at) = order.delivered_at {
        println!("Delivered at {}", at.to_rfc3339());
    }
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value { "configured" } else { "not set" }
}

pub fn info(config: &AppConfig) {
    println!("\n=== GREATIDEAS INFO ===");
    println!("Site URL:        {}", config.site_url);
    println!("Port:            {}", config.port);
    println!("Database:        {}", config.database_url);
    println!("Customer bot:    {}", on_off(config.bot_token.is_some()));
    println!("Bot username:    {}", config.bot_username.as_deref().unwrap_or("-"));
    println!("Invoices:        {}", on_off(config.payment_provider_token.is_some()));
    println!("Staff bot:       {}", on_off(config.staff_bot_token.is_some()));
    println!("Staff chat:      {}", config.staff_chat_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()));
    println!(
        "YooKassa:        {}",
        on_off(config.yookassa_shop_id.is_some() && config.yookassa_secret_key.is_some())
    );
    println!("Internal API:    {}", on_off(config.internal_api_token.is_some()));
    println!("Session TTL:     {}h", config.session_ttl_hours);
    println!("=======================\n");
}
