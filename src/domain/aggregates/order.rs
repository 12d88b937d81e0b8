//! Order Aggregate
//!
//! ```text
//! PendingPayment ──► Paid ──► Processing ──► Shipped ──► Delivered
//!       │   ▲          │ │         │             ▲
//!       ▼   │          │ └─────────┼─────────────┘  (shipped by hand)
//! PaymentFailed        └───────────┴──► Cancelled ◄── PendingPayment
//! ```
//!
//! A failed payment can be retried on the same gateway order, so
//! `PaymentFailed` still accepts a capture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::product::Product;
use crate::domain::aggregates::user::Address;
use crate::domain::value_objects::{Money, MoneyError, Sku};
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    email: String,
    status: OrderStatus,
    items: Vec<LineItem>,
    shipping_address: Address,
    subtotal: Money,
    shipping_fee: Money,
    total: Money,
    payment: PaymentRecord,
    shipment: Option<ShipmentRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub size: Option<String>,
    pub image: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub weight_grams: u32,
    pub unit_price: Money,
    pub total: Money,
}

impl LineItem {
    /// Snapshots the product as it is at checkout time.
    pub fn from_product(product: &Product, size: Option<String>, quantity: u32) -> Self {
        let unit_price = product.price().clone();
        Self {
            product_id: product.id(), sku: product.sku().clone(), name: product.name().to_string(), size,
            image: product.images().first().cloned(), quantity, weight_grams: product.weight_grams(),
            total: unit_price.multiply(quantity), unit_price,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Money was captured after the order was cancelled.
    #[serde(default)]
    pub refund_due: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub provider_order_id: String,
    pub shipment_id: String,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub tracking_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] PendingPayment, PaymentFailed, Paid, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Captured, Failed }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::PaymentFailed => "payment_failed",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid) | (PendingPayment, PaymentFailed) | (PaymentFailed, Paid)
                | (Paid, Processing) | (Paid, Shipped) | (Processing, Shipped) | (Shipped, Delivered)
                | (PendingPayment, Cancelled) | (Paid, Cancelled) | (Processing, Cancelled)
        )
    }

    pub fn is_paid(self) -> bool {
        matches!(self, Self::Paid | Self::Processing | Self::Shipped | Self::Delivered)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_lowercase()))
            .map_err(|_| OrderError::UnknownStatus(s.to_string()))
    }
}

impl Order {
    pub fn place(user_id: Uuid, email: impl Into<String>, shipping_address: Address, items: Vec<LineItem>, shipping_fee: Money) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let currency = shipping_fee.currency().to_string();
        let subtotal = items.iter().try_fold(Money::zero(&currency), |acc, i| acc.add(&i.total))?;
        let total = subtotal.add(&shipping_fee)?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut order = Self {
            id, order_number: generate_order_number(), user_id, email: email.into(),
            status: OrderStatus::PendingPayment, items, shipping_address,
            subtotal, shipping_fee, total, payment: PaymentRecord::default(), shipment: None,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, order_number: order.order_number.clone(), total: order.total.clone() }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn email(&self) -> &str { &self.email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping_fee(&self) -> &Money { &self.shipping_fee }
    pub fn total(&self) -> &Money { &self.total }
    pub fn payment(&self) -> &PaymentRecord { &self.payment }
    pub fn shipment(&self) -> Option<&ShipmentRecord> { self.shipment.as_ref() }
    pub fn awb_code(&self) -> Option<&str> { self.shipment.as_ref().and_then(|s| s.awb_code.as_deref()) }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn attach_gateway_order(&mut self, gateway_order_id: impl Into<String>) {
        self.payment.gateway_order_id = Some(gateway_order_id.into());
        self.touch();
    }

    pub fn mark_paid(&mut self, payment_id: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Paid)?;
        self.payment.status = PaymentStatus::Captured;
        self.payment.payment_id = Some(payment_id.into());
        self.payment.paid_at = Some(Utc::now());
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id, order_number: self.order_number.clone(), total: self.total.clone() }));
        Ok(())
    }

    /// Records a capture that arrived for a cancelled order. The order stays
    /// cancelled and is flagged for a refund. Returns false when this payment
    /// was already recorded.
    pub fn record_late_capture(&mut self, payment_id: impl Into<String>) -> Result<bool, OrderError> {
        if self.status != OrderStatus::Cancelled {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Paid });
        }
        let payment_id = payment_id.into();
        if self.payment.refund_due && self.payment.payment_id.as_deref() == Some(payment_id.as_str()) {
            return Ok(false);
        }
        self.payment.status = PaymentStatus::Captured;
        self.payment.payment_id = Some(payment_id.clone());
        self.payment.paid_at = Some(Utc::now());
        self.payment.refund_due = true;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::RefundDue { order_id: self.id, payment_id }));
        Ok(true)
    }

    pub fn mark_payment_failed(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::PaymentFailed)?;
        self.payment.status = PaymentStatus::Failed;
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentFailed { order_id: self.id }));
        Ok(())
    }

    pub fn attach_shipment(&mut self, shipment: ShipmentRecord) -> Result<(), OrderError> {
        if self.status != OrderStatus::Paid { return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Processing }); }
        let awb = shipment.awb_code.clone();
        let courier = shipment.courier_name.clone();
        let shipment_id = shipment.shipment_id.clone();
        self.shipment = Some(shipment);
        self.transition(OrderStatus::Processing)?;
        self.raise_event(DomainEvent::Order(OrderEvent::ShipmentCreated { order_id: self.id, shipment_id }));
        // Some couriers hand out the AWB with the order itself.
        if let Some(awb) = awb { self.assign_awb(awb, courier)?; }
        Ok(())
    }

    /// Records the AWB code. Works from `Paid` too, for orders shipped by hand.
    pub fn assign_awb(&mut self, awb_code: impl Into<String>, courier_name: Option<String>) -> Result<(), OrderError> {
        let awb_code = awb_code.into();
        if awb_code.trim().is_empty() { return Err(OrderError::MissingAwb); }
        self.transition(OrderStatus::Shipped)?;
        let now = Utc::now();
        let shipment = self.shipment.get_or_insert_with(|| ShipmentRecord {
            provider_order_id: String::new(), shipment_id: String::new(), awb_code: None,
            courier_name: None, tracking_status: None, created_at: now,
        });
        shipment.awb_code = Some(awb_code.clone());
        if courier_name.is_some() { shipment.courier_name = courier_name; }
        self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_id: self.id, awb_code }));
        Ok(())
    }

    pub fn record_tracking_status(&mut self, status: impl Into<String>) {
        if let Some(shipment) = self.shipment.as_mut() {
            shipment.tracking_status = Some(status.into());
            self.touch();
        }
    }

    pub fn deliver(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Delivered)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id }));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn generate_order_number() -> String {
    format!("ORD-{}-{:06}", Utc::now().format("%y%m%d"), rand::random::<u32>() % 1_000_000)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Cannot move order from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("AWB code is required")]
    MissingAwb,
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
    #[error(transparent)]
    Money(#[from] MoneyError),
}
