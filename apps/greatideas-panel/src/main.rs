mod bot;
mod bot_manager;
mod cli;
mod config;
pub mod handlers;
mod middleware;
mod services;
mod settings;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::{get, post};
use clap::{Parser, Subcommand};
use greatideas_db::repositories::{
    BotRepository, CafeRepository, GameRepository, MenuRepository, OrderRepository, PaymentRepository,
    SessionRepository, UserRepository,
};
use sqlx::SqlitePool;
use teloxide::Bot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use bot_manager::{BotKind, BotManager};
use config::AppConfig;
use services::auth_service::AuthService;
use services::cart_service::CartService;
use services::game_service::GameService;
use services::menu_service::MenuService;
use services::notification_service::NotificationService;
use services::order_service::OrderService;
use services::pay_service::PayService;
use services::payment::{install_crypto_provider, yookassa::YooKassaAdapter, PaymentAdapter};
use services::session_service::SessionService;
use settings::SettingsService;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub settings: Arc<SettingsService>,
    pub bot_manager: Arc<BotManager>,

    pub sessions: Arc<SessionService>,
    pub auth_service: Arc<AuthService>,
    pub cart_service: Arc<CartService>,
    pub menu_service: Arc<MenuService>,
    pub order_service: Arc<OrderService>,
    pub notification_service: Arc<NotificationService>,
    pub pay_service: Arc<PayService>,
    pub game_service: Arc<GameService>,

    pub users: UserRepository,
    pub cafes: CafeRepository,
    pub bot_log: BotRepository,

    pub customer_bot: Option<Bot>,
    pub staff_bot: Option<Bot>,
}

impl AppState {
    /// Wires every service around one pool.
    pub async fn build(pool: SqlitePool, config: AppConfig) -> Result<Self> {
        install_crypto_provider();

        let settings = SettingsService::new(pool.clone()).await?;
        let users = UserRepository::new(pool.clone());
        let cafes = CafeRepository::new(pool.clone());
        let cart_service = CartService::new(MenuRepository::new(pool.clone()));

        let order_service = OrderService::new(
            OrderRepository::new(pool.clone()),
            PaymentRepository::new(pool.clone()),
            users.clone(),
            cafes.clone(),
            cart_service.clone(),
            settings.clone(),
        );

        let customer_bot = config.bot_token.as_deref().map(Bot::new);
        let staff_bot = config.staff_bot_token.as_deref().map(Bot::new);

        let notification_service = NotificationService::new(
            order_service.clone(),
            customer_bot.clone(),
            staff_bot.clone(),
            config.staff_chat_id,
        );

        let gateway: Option<Arc<dyn PaymentAdapter>> =
            match (config.yookassa_shop_id.clone(), config.yookassa_secret_key.clone()) {
                (Some(shop_id), Some(secret_key)) => Some(Arc::new(YooKassaAdapter::new(
                    shop_id,
                    secret_key,
                    config.yookassa_return_url.clone(),
                )?)),
                _ => None,
            };

        let pay_service = PayService::new(
            PaymentRepository::new(pool.clone()),
            order_service.clone(),
            notification_service.clone(),
            gateway,
        );

        Ok(Self {
            sessions: Arc::new(SessionService::new(SessionRepository::new(pool.clone()), config.session_ttl_hours)),
            auth_service: Arc::new(AuthService::new(users.clone(), config.bot_token.clone())),
            menu_service: Arc::new(MenuService::new(cafes.clone(), MenuRepository::new(pool.clone()))),
            game_service: Arc::new(GameService::new(GameRepository::new(pool.clone()))),
            cart_service: Arc::new(cart_service),
            order_service: Arc::new(order_service),
            notification_service: Arc::new(notification_service),
            pay_service: Arc::new(pay_service),
            settings: Arc::new(settings),
            bot_manager: Arc::new(BotManager::new()),
            bot_log: BotRepository::new(pool.clone()),
            config: Arc::new(config),
            users,
            cafes,
            customer_bot,
            staff_bot,
            pool,
        })
    }

    pub fn site_url(&self) -> Option<Url> {
        Url::parse(&self.config.site_url).ok()
    }
}

#[derive(Parser)]
#[command(name = "greatideas")]
#[command(about = "GreatIdeas cafe ordering site, Telegram bots and startup game", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server and both bots
    Serve,
    /// Run only the customer bot
    Bot,
    /// Run only the staff bot
    StaffBot,
    /// Create the demo cafe when the catalogue is empty
    Seed,
    /// Load the startup game skills, events and achievements
    LoadGameEvents,
    /// Administrative tools
    Admin {
        #[command(subcommand)]
        subcommand: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Change an order's status
    SetStatus {
        /// Order number, e.g. GI1234565F3A
        order_number: String,
        /// pending, confirmed, preparing, ready, delivered or cancelled
        status: String,
    },
    /// Show configuration summary
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        println!("⚠️  Warning: Failed to load .env file: {}", e);
    }

    let cli = Cli::parse();

    let file_appender = tracing_appender::rolling::never(".", "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "greatideas=debug,greatideas_panel=debug,axum=info,tower_http=info,sqlx=warn,teloxide=info".into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let config = AppConfig::from_env();

    if let Commands::Admin {
        subcommand: AdminCommands::Info,
    } = &cli.command
    {
        cli::info(&config);
        return Ok(());
    }

    let pool = greatideas_db::connect(&config.database_url).await?;
    tracing::info!("Database initialized at {}", config.database_url);

    match cli.command {
        Commands::Serve => {
            config.warn_missing();
            let state = AppState::build(pool, config).await?;
            run_server(state).await?;
        }
        Commands::Bot => {
            let state = AppState::build(pool, config).await?;
            run_single_bot(state, BotKind::Customer).await?;
        }
        Commands::StaffBot => {
            let state = AppState::build(pool, config).await?;
            run_single_bot(state, BotKind::Staff).await?;
        }
        Commands::Seed => cli::seed(&pool).await?,
        Commands::LoadGameEvents => cli::load_game_events(&pool).await?,
        Commands::Admin { subcommand } => match subcommand {
            AdminCommands::SetStatus { order_number, status } => {
                let state = AppState::build(pool, config).await?;
                cli::set_status(&state, &order_number, &status).await?;
            }
            AdminCommands::Info => cli::info(&config),
        },
    }

    Ok(())
}

async fn run_single_bot(state: AppState, kind: BotKind) -> Result<()> {
    let bot = match kind {
        BotKind::Customer => state.customer_bot.clone(),
        BotKind::Staff => state.staff_bot.clone(),
    };
    let Some(bot) = bot else {
        return Err(anyhow::anyhow!(match kind {
            BotKind::Customer => "TELEGRAM_BOT_TOKEN is not set",
            BotKind::Staff => "STAFF_BOT_TOKEN is not set",
        }));
    };
    state.bot_manager.start(kind, bot, state.clone()).await;
    state.bot_manager.wait().await;
    Ok(())
}

fn router(state: AppState) -> axum::Router {
    use handlers::{cafes, cart, game, health, internal, orders_api, payments, tracking, users};

    axum::Router::new()
        .route("/", get(cafes::home))
        .route("/cafes/", get(cafes::cafe_list))
        .route("/cafe/{id}/", get(cafes::cafe_detail))
        .route("/cart/", get(cart::cart_page))
        .route("/add-to-cart/", post(cart::add_to_cart))
        .route("/update-cart-item/", post(cart::update_cart_item))
        .route("/remove-from-cart/", post(cart::remove_from_cart))
        .route("/users/profile/", get(users::profile))
        .route("/users/telegram-login/", get(users::telegram_login))
        .route("/users/telegram-auth/", get(users::telegram_auth).post(users::telegram_auth))
        .route("/api/orders/create-payment/", post(orders_api::create_payment))
        .route("/api/orders/payment-status/{id}/", get(orders_api::payment_status))
        .route("/orders/status/{order_number}/", get(tracking::order_status))
        .route("/orders/api/status/{order_number}/", get(tracking::api_order_status))
        .route("/orders/my-orders/", get(tracking::user_orders))
        .route("/payments/yookassa/webhook/", post(payments::yookassa_webhook))
        // Startup game
        .route("/game/", get(game::game_home))
        .route("/game/company-name/", get(game::company_name_page).post(game::company_name_submit))
        .route("/game/industry/", get(game::industry_select).post(game::industry_submit))
        .route("/game/play/", get(game::game_play).post(game::game_play_create))
        .route("/game/new-game/", post(game::new_game))
        .route("/game/api/action/", post(game::game_action))
        .route("/game/api/sync-time/", post(game::sync_time))
        .route("/game/api/choice/", post(game::process_choice))
        .route("/game/api/skill/", post(game::game_skill))
        .route("/game/api/events/", get(game::events_api))
        .route("/game/api/next-event/", get(game::next_event))
        .route("/game/stats/", get(game::game_stats))
        // Internal API (bearer INTERNAL_API_TOKEN)
        .route("/api/internal/orders/{order_number}/status", post(internal::set_order_status))
        .route("/api/internal/orders/{order_number}/gateway/{action}", post(internal::gateway_action))
        .route("/health", get(health::health))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::session_middleware))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(middleware::BODY_LIMIT))
        .layer(tower_http::set_header::SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            axum::http::HeaderValue::from_static("nosniff"),
        ))
        .layer(tower_http::set_header::SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            axum::http::HeaderValue::from_static("DENY"),
        ))
        .layer(tower_http::set_header::SetResponseHeaderLayer::overriding(
            axum::http::header::X_XSS_PROTECTION,
            axum::http::HeaderValue::from_static("1; mode=block"),
        ))
}

async fn run_server(state: AppState) -> Result<()> {
    state.bot_manager.start_configured(&state).await;

    // Expired web sessions are purged hourly.
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Purged {} expired sessions", n),
                Err(e) => tracing::error!("Failed to purge sessions: {:#}", e),
            }
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let bot_manager = state.bot_manager.clone();
    let app = router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    bot_manager.stop_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn app() -> (axum::Router, SqlitePool) {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let state = AppState::build(pool.clone(), AppConfig::default()).await.unwrap();
        (router(state), pool)
    }

    #[tokio::test]
    async fn health_reports_database() {
        let (app, _pool) = app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    }

    #[tokio::test]
    async fn cart_session_survives_between_requests() {
        let (app, pool) = app().await;
        let demo = greatideas_db::seed::demo_menu(&pool).await.unwrap();

        let add = Request::builder()
            .method("POST")
            .uri("/add-to-cart/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"item_id":{},"quantity":2}}"#, demo.croissant_id)))
            .unwrap();
        let response = app.clone().oneshot(add).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let again = Request::builder()
            .method("POST")
            .uri("/add-to-cart/")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie)
            .body(Body::from(format!(r#"{{"item_id":{}}}"#, demo.croissant_id)))
            .unwrap();
        let response = app.oneshot(again).await.unwrap();
        let body = handlers::test_support::body_json(response).await;
        assert_eq!(body["total_items"], 3);
    }
}
