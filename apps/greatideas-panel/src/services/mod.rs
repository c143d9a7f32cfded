pub mod auth_service;
pub mod cart_service;
pub mod game_content;
pub mod game_service;
pub mod menu_service;
pub mod notification_service;
pub mod order_service;
pub mod pay_service;
pub mod payment;
pub mod session_service;
