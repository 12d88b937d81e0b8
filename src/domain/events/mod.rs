//! Domain events
use crate::domain::value_objects::{Money, Sku};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: Sku },
    Published { product_id: Uuid },
    StockDepleted { product_id: Uuid, sku: Sku },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, total: Money },
    Paid { order_id: Uuid, order_number: String, total: Money },
    PaymentFailed { order_id: Uuid },
    ShipmentCreated { order_id: Uuid, shipment_id: String },
    Shipped { order_id: Uuid, awb_code: String },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
    RefundDue { order_id: Uuid, payment_id: String },
}

impl DomainEvent {
    /// Dotted name used for SSE event names and NATS subjects.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "product.created",
            Self::Product(ProductEvent::Published { .. }) => "product.published",
            Self::Product(ProductEvent::StockDepleted { .. }) => "product.stock_depleted",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::Paid { .. }) => "order.paid",
            Self::Order(OrderEvent::PaymentFailed { .. }) => "order.payment_failed",
            Self::Order(OrderEvent::ShipmentCreated { .. }) => "order.shipment_created",
            Self::Order(OrderEvent::Shipped { .. }) => "order.shipped",
            Self::Order(OrderEvent::Delivered { .. }) => "order.delivered",
            Self::Order(OrderEvent::Cancelled { .. }) => "order.cancelled",
            Self::Order(OrderEvent::RefundDue { .. }) => "order.refund_due",
        }
    }
}
