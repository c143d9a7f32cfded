pub mod bot;
pub mod cafe;
pub mod game;
pub mod menu;
pub mod order;
pub mod payment;
pub mod session;
pub mod user;
