pub mod db;
pub mod models;
pub mod repositories;
pub mod seed;

pub use sqlx;
pub use db::{connect, connect_memory, init_db};
