use anyhow::Context;
use chrono::{DateTime, Utc};
use greatideas_db::models::cafe::Cafe;
use greatideas_db::models::order::{NewOrder, Order, OrderItemDetail};
use greatideas_db::models::payment::Payment;
use greatideas_db::models::user::TelegramUser;
use greatideas_db::repositories::{CafeRepository, OrderRepository, PaymentRepository, UserRepository};
use greatideas_shared::cart::{Cart, CartDataError};
use greatideas_shared::hours::moscow_hhmm;
use greatideas_shared::order_number::{checkout_number, invoice_payload, order_id_from_payload};
use greatideas_shared::{DeliveryType, OrderStatus, PaymentMethod};
use serde_json::Value;
use tracing::{info, warn};

use crate::services::cart_service::CartService;
use crate::settings::SettingsService;

pub const WORKSPACE_RANGE: std::ops::RangeInclusive<i64> = 1..=30;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error(
        "К сожалению, заказы принимаются только с {window} (МСК). Сейчас: {now}. Пожалуйста, попробуйте оформить заказ в рабочее время."
    )]
    OutsideWorkingHours { window: String, now: String },
    #[error("telegram_id обязателен")]
    MissingTelegramId,
    #[error("Корзина пуста")]
    EmptyCart,
    #[error("Пользователь не найден")]
    UserNotFound,
    #[error("У вас уже есть активный заказ. Подождите несколько минут перед созданием нового.")]
    RecentOrderExists,
    #[error("Необходимо выбрать номер рабочего места (от 1 до 30)")]
    InvalidWorkspace,
    #[error("Заказ не найден")]
    OrderNotFound,
    #[error("Платеж не найден")]
    PaymentNotFound,
    #[error("Этот заказ уже оплачен")]
    AlreadyPaid,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OrderError {
    /// Validation failures are the caller's fault; the rest are ours.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, OrderError::Internal(_))
    }
}

impl From<CartDataError> for OrderError {
    fn from(_: CartDataError) -> Self {
        OrderError::EmptyCart
    }
}

/// Web checkout request body.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub telegram_id: Option<i64>,
    #[serde(default)]
    pub cart_data: Value,
    #[serde(default)]
    pub delivery_type: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: String,
    #[serde(default)]
    pub delivery_address: String,
    #[serde(default)]
    pub workspace_number: Option<i64>,
    #[serde(default)]
    pub comment: String,
}

/// Contact and delivery details captured at checkout.
#[derive(Debug, Clone, Default)]
pub struct OrderDetails {
    pub delivery_type: DeliveryType,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub workspace_number: Option<i64>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicePrice {
    pub label: String,
    pub amount: i64,
}

/// Everything needed to send the Telegram invoice for a fresh checkout.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub order: Order,
    pub payment: Payment,
    pub cafe: Cafe,
    pub prices: Vec<InvoicePrice>,
    pub item_count: usize,
}

impl Checkout {
    pub fn invoice_title(&self) -> String {
        format!("Заказ #{}", self.order.order_number)
    }

    pub fn invoice_description(&self) -> String {
        format!("Заказ в {}\nВсего позиций: {}", self.cafe.name, self.item_count)
    }
}

/// An order with the rows needed to describe it in messages.
#[derive(Debug, Clone)]
pub struct OrderSummary {
    pub order: Order,
    pub cafe: Option<Cafe>,
    pub customer: Option<TelegramUser>,
    pub items: Vec<OrderItemDetail>,
}

impl OrderSummary {
    pub fn cafe_name(&self) -> &str {
        self.cafe.as_ref().map(|c| c.name.as_str()).unwrap_or("")
    }

    pub fn cafe_address(&self) -> &str {
        self.cafe.as_ref().map(|c| c.address.as_str()).unwrap_or("")
    }

    /// Name given at checkout, else the Telegram profile name.
    pub fn customer_name(&self) -> String {
        if !self.order.customer_name.is_empty() {
            return self.order.customer_name.clone();
        }
        self.customer.as_ref().map(TelegramUser::full_name).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct OrderService {
    orders: OrderRepository,
    payments: PaymentRepository,
    users: UserRepository,
    cafes: CafeRepository,
    cart: CartService,
    settings: SettingsService,
}

impl OrderService {
    pub fn new(
        orders: OrderRepository,
        payments: PaymentRepository,
        users: UserRepository,
        cafes: CafeRepository,
        cart: CartService,
        settings: SettingsService,
    ) -> Self {
        Self {
            orders,
            payments,
            users,
            cafes,
            cart,
            settings,
        }
    }

    /// Creates an order from the cart, pricing every line against the current menu.
    pub async fn create_order_from_cart(
        &self,
        user: &TelegramUser,
        cart: &Cart,
        details: OrderDetails,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let priced = self.cart.price(cart).await?;
        let cafe_id = priced.cafe_id().ok_or(OrderError::EmptyCart)?;
        let lines: Vec<_> = priced.lines.iter().map(|l| l.to_priced_line()).collect();

        let customer_name = if details.customer_name.trim().is_empty() {
            user.full_name()
        } else {
            details.customer_name
        };

        let new = NewOrder {
            cafe_id,
            user_id: user.id,
            order_number: Some(checkout_number(now, &mut rand::rng())),
            delivery_type: details.delivery_type,
            delivery_fee: 0,
            customer_name,
            customer_phone: details.customer_phone,
            delivery_address: details.delivery_address,
            comment: details.comment,
            workspace_number: details.workspace_number,
        };
        let order = self.orders.create_with_items(&new, &lines, now).await?;
        info!(
            "Created order {} for user {} ({} lines, {} kopecks)",
            order.order_number,
            user.telegram_id,
            lines.len(),
            order.total_amount
        );
        Ok(order)
    }

    /// Pending Telegram payment for the full amount due.
    pub async fn create_payment(&self, order: &Order) -> anyhow::Result<Payment> {
        let payload = invoice_payload(order.id, &uuid::Uuid::new_v4().simple().to_string());
        self.payments
            .create(
                order.id,
                order.amount_due(),
                PaymentMethod::Telegram,
                &payload,
                &format!("Оплата заказа #{}", order.order_number),
            )
            .await
    }

    /// Labelled invoice lines in kopecks: each item, each of its add-ons, then delivery.
    pub async fn create_invoice_prices(&self, order: &Order) -> anyhow::Result<Vec<InvoicePrice>> {
        let items = self.orders.items_with_details(order.id).await?;
        Ok(invoice_prices(order, &items))
    }

    /// Validates and runs a web checkout up to the point of sending the invoice.
    pub async fn checkout(&self, req: CheckoutRequest, now: DateTime<Utc>) -> Result<Checkout, OrderError> {
        let window = self.settings.order_window().await;
        if !window.is_open(now) {
            return Err(OrderError::OutsideWorkingHours {
                window: window.describe(),
                now: moscow_hhmm(now),
            });
        }

        let telegram_id = req.telegram_id.filter(|id| *id != 0).ok_or(OrderError::MissingTelegramId)?;
        let cart = Cart::from_json(&req.cart_data)?;

        let user = self
            .users
            .get_by_telegram_id(telegram_id)
            .await?
            .ok_or(OrderError::UserNotFound)?;

        let since = now - self.settings.recent_order_window().await;
        if self.orders.has_recent_active(user.id, since).await? {
            return Err(OrderError::RecentOrderExists);
        }

        let workspace = req
            .workspace_number
            .filter(|n| WORKSPACE_RANGE.contains(n))
            .ok_or(OrderError::InvalidWorkspace)?;

        let delivery_type = req
            .delivery_type
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or_default();

        let order = self
            .create_order_from_cart(
                &user,
                &cart,
                OrderDetails {
                    delivery_type,
                    customer_name: req.customer_name,
                    customer_phone: req.customer_phone,
                    delivery_address: req.delivery_address,
                    workspace_number: Some(workspace),
                    comment: req.comment,
                },
                now,
            )
            .await?;

        let payment = self.create_payment(&order).await?;
        let items = self.orders.items_with_details(order.id).await?;
        let prices = invoice_prices(&order, &items);
        let cafe = self
            .cafes
            .get(order.cafe_id)
            .await?
            .context("Order cafe disappeared")?;

        Ok(Checkout {
            order,
            payment,
            cafe,
            prices,
            item_count: items.len(),
        })
    }

    /// Looks the order up by invoice payload, falling back to the id encoded in `order_{id}_…`.
    pub async fn get_order_by_payment_payload(
        &self,
        payload: &str,
    ) -> anyhow::Result<Option<(Order, Option<Payment>)>> {
        if let Some(payment) = self.payments.get_by_payload(payload).await? {
            let order = self.orders.get(payment.order_id).await?;
            return Ok(order.map(|o| (o, Some(payment))));
        }
        let Some(order_id) = order_id_from_payload(payload) else {
            return Ok(None);
        };
        let Some(order) = self.orders.get(order_id).await? else {
            return Ok(None);
        };
        let payment = self.payments.get_by_order(order.id).await?;
        Ok(Some((order, payment)))
    }

    /// Checks made before Telegram takes the money.
    pub async fn validate_pre_checkout(&self, payload: &str) -> Result<Order, OrderError> {
        let (order, payment) = self
            .get_order_by_payment_payload(payload)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        if payment.as_ref().is_some_and(Payment::is_paid) {
            return Err(OrderError::AlreadyPaid);
        }
        Ok(order)
    }

    pub async fn process_successful_payment(
        &self,
        payload: &str,
        telegram_charge_id: &str,
        provider_charge_id: &str,
    ) -> Result<(Order, Payment), OrderError> {
        let (order, payment) = self
            .get_order_by_payment_payload(payload)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        let payment = match payment {
            Some(p) => p,
            None => {
                warn!("Order {} had no payment row, creating one", order.order_number);
                self.payments
                    .create(
                        order.id,
                        order.amount_due(),
                        PaymentMethod::Telegram,
                        payload,
                        &format!("Оплата заказа #{}", order.order_number),
                    )
                    .await?
            }
        };

        let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
        let paid = self
            .payments
            .mark_as_paid(
                &payment,
                non_empty(telegram_charge_id).as_deref(),
                non_empty(provider_charge_id).as_deref(),
                Utc::now(),
            )
            .await?;
        let order = self.orders.get(order.id).await?.ok_or(OrderError::OrderNotFound)?;

        info!("Order {} paid through Telegram (payment #{})", order.order_number, paid.id);
        Ok((order, paid))
    }

    pub async fn payment_with_order(&self, payment_id: i64) -> Result<(Payment, Order), OrderError> {
        let payment = self.payments.get(payment_id).await?.ok_or(OrderError::PaymentNotFound)?;
        let order = self.orders.get(payment.order_id).await?.ok_or(OrderError::OrderNotFound)?;
        Ok((payment, order))
    }

    pub async fn summary(&self, order: Order) -> anyhow::Result<OrderSummary> {
        let cafe = self.cafes.get(order.cafe_id).await?;
        let customer = self.users.get_by_id(order.user_id).await?;
        let items = self.orders.items_with_details(order.id).await?;
        Ok(OrderSummary {
            order,
            cafe,
            customer,
            items,
        })
    }

    pub async fn get_by_number(&self, order_number: &str) -> anyhow::Result<Option<Order>> {
        self.orders.get_by_number(order_number).await
    }

    pub async fn get(&self, order_id: i64) -> anyhow::Result<Option<Order>> {
        self.orders.get(order_id).await
    }

    pub async fn for_user(&self, user_id: i64, limit: Option<i64>) -> anyhow::Result<Vec<Order>> {
        self.orders.for_user(user_id, limit).await
    }

    pub async fn set_status(&self, order_number: &str, status: OrderStatus) -> Result<Order, OrderError> {
        let order = self
            .orders
            .get_by_number(order_number)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        self.orders.update_status(order.id, status, Utc::now()).await?;
        info!("Order {} moved {} -> {}", order.order_number, order.status, status);
        self.orders.get(order.id).await?.ok_or(OrderError::OrderNotFound)
    }

    pub async fn set_status_by_id(&self, order_id: i64, status: OrderStatus) -> Result<Order, OrderError> {
        self.orders.update_status(order_id, status, Utc::now()).await?;
        self.orders.get(order_id).await?.ok_or(OrderError::OrderNotFound)
    }

    pub async fn set_staff_message(&self, order_id: i64, message_id: Option<i64>) -> anyhow::Result<()> {
        self.orders.set_staff_message(order_id, message_id).await
    }
}

pub fn invoice_prices(order: &Order, items: &[OrderItemDetail]) -> Vec<InvoicePrice> {
    let mut prices = Vec::new();
    for detail in items {
        let qty = detail.item.quantity;
        prices.push(InvoicePrice {
            label: format!("{} x{}", detail.display_name(), qty),
            amount: detail.item.final_price * qty,
        });
        for addon in &detail.addons {
            prices.push(InvoicePrice {
                label: format!("  + {}", addon.name),
                amount: addon.price * qty,
            });
        }
    }
    if order.delivery_fee > 0 {
        prices.push(InvoicePrice {
            label: "Доставка".to_string(),
            amount: order.delivery_fee,
        });
    }
    prices
}
