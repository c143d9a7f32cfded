use crate::status::{DeliveryType, OrderStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingStep {
    pub key: &'static str,
    pub title: &'static str,
    pub completed: bool,
    pub active: bool,
}

const CHAIN: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::Delivered,
];

fn step_title(step: OrderStatus, delivery: DeliveryType) -> &'static str {
    match (step, delivery) {
        (OrderStatus::Pending, _) => "Ожидает подтверждения",
        (OrderStatus::Confirmed, _) => "Подтвержден",
        (OrderStatus::Preparing, _) => "Готовится",
        (OrderStatus::Ready, DeliveryType::Pickup) => "Готов к выдаче",
        (OrderStatus::Ready, DeliveryType::Delivery) => "Готов к доставке",
        (OrderStatus::Delivered, DeliveryType::Pickup) => "Выдан",
        (OrderStatus::Delivered, DeliveryType::Delivery) => "Доставлен",
        (OrderStatus::Cancelled, _) => "Отменен",
    }
}

/// Progress steps for the tracking page. A step is completed once the order has
/// moved past it; the delivered step completes only when the order is delivered.
/// A cancelled order has no completed or active steps.
pub fn steps(status: OrderStatus, delivery: DeliveryType) -> Vec<TrackingStep> {
    let position = CHAIN.iter().position(|s| *s == status);
    CHAIN
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let completed = match position {
                Some(pos) if *step == OrderStatus::Delivered => pos == idx,
                Some(pos) => pos > idx,
                None => false,
            };
            TrackingStep {
                key: step.as_str(),
                title: step_title(*step, delivery),
                completed,
                active: *step == status,
            }
        })
        .collect()
}
