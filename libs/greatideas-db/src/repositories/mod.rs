pub mod bot_repo;
pub mod cafe_repo;
pub mod game_repo;
pub mod menu_repo;
pub mod order_repo;
pub mod payment_repo;
pub mod session_repo;
pub mod user_repo;

pub use bot_repo::BotRepository;
pub use cafe_repo::CafeRepository;
pub use game_repo::GameRepository;
pub use menu_repo::MenuRepository;
pub use order_repo::OrderRepository;
pub use payment_repo::PaymentRepository;
pub use session_repo::SessionRepository;
pub use user_repo::UserRepository;
