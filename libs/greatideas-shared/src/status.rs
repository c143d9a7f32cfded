use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => ($text:literal, $display:literal)),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Human readable (Russian) label shown to customers and staff.
            pub fn display_name(&self) -> &'static str {
                match self {
                    $($name::$variant => $display),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

string_enum!(OrderStatus, "order status", {
    Pending => ("pending", "Ожидает подтверждения"),
    Confirmed => ("confirmed", "Подтвержден"),
    Preparing => ("preparing", "Готовится"),
    Ready => ("ready", "Готов"),
    Delivered => ("delivered", "Доставлен"),
    Cancelled => ("cancelled", "Отменен"),
});

string_enum!(DeliveryType, "delivery type", {
    Pickup => ("pickup", "Самовывоз"),
    Delivery => ("delivery", "Доставка"),
});

string_enum!(PaymentStatus, "payment status", {
    Pending => ("pending", "Ожидает оплаты"),
    Processing => ("processing", "Обрабатывается"),
    Completed => ("completed", "Завершен"),
    Failed => ("failed", "Неудачно"),
    Cancelled => ("cancelled", "Отменен"),
    Refunded => ("refunded", "Возврат"),
});

string_enum!(PaymentMethod, "payment method", {
    Telegram => ("telegram", "Telegram Payments"),
    Card => ("card", "Банковская карта"),
    Cash => ("cash", "Наличные"),
    Online => ("online", "Онлайн-платеж"),
});

string_enum!(AddonType, "addon type", {
    Milk => ("milk", "Молоко"),
    Syrup => ("syrup", "Сироп"),
    Spice => ("spice", "Специи"),
    Extra => ("extra", "Дополнительно"),
    Other => ("other", "Другое"),
});

impl Default for DeliveryType {
    fn default() -> Self {
        DeliveryType::Pickup
    }
}

/// Display label for a raw status string; unknown values are shown as-is.
pub fn order_status_display(raw: &str) -> String {
    raw.parse::<OrderStatus>()
        .map(|s| s.display_name().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn delivery_type_display(raw: &str) -> String {
    raw.parse::<DeliveryType>()
        .map(|s| s.display_name().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_status() {
        let status: OrderStatus = "preparing".parse().unwrap();
        assert_eq!(status, OrderStatus::Preparing);
        assert_eq!(status.to_string(), "preparing");
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn display_falls_back_to_raw_value() {
        assert_eq!(order_status_display("ready"), "Готов");
        assert_eq!(order_status_display("weird"), "weird");
        assert_eq!(delivery_type_display("delivery"), "Доставка");
    }
}
