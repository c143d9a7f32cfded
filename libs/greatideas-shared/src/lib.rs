pub mod cart;
pub mod hours;
pub mod init_data;
pub mod money;
pub mod order_number;
pub mod status;
pub mod tracking;

pub use init_data::{InitDataError, WebAppInitData, WebAppUser};
pub use status::{AddonType, DeliveryType, OrderStatus, PaymentMethod, PaymentStatus};
