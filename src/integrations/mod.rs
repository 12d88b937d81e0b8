//! Third-party services.
//!
//! Each service sits behind a trait so handlers can run against fakes in
//! tests and so an unconfigured service can be reported as unavailable:
//!
//! - [`PaymentGateway`] - Razorpay orders and signature checks
//! - [`ShippingProvider`] - Shiprocket orders, AWB assignment and tracking
//! - [`ImageHost`] - Cloudinary uploads
//! - [`RateSource`] - exchange rates for display-only currency conversion
//! - [`Mailer`] - transactional email over SMTP

pub mod cloudinary;
pub mod currency;
pub mod mailer;
pub mod razorpay;
pub mod shiprocket;

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{Order, ShipmentRecord};
use crate::domain::Money;

pub use cloudinary::CloudinaryClient;
pub use currency::{CurrencyConverter, HttpRateSource};
pub use mailer::{LogMailer, SmtpMailer};
pub use razorpay::RazorpayClient;
pub use shiprocket::ShiprocketClient;

/// Errors that can occur when talking to a third-party service.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("{service} returned {status}: {message}")]
    Api { service: &'static str, status: u16, message: String },

    /// The response did not have the expected shape.
    #[error("unexpected response from {service}: {message}")]
    Decode { service: &'static str, message: String },

    /// Credentials were rejected.
    #[error("authentication with {0} failed")]
    Authentication(&'static str),

    /// The service has no configuration in this deployment.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// The caller asked for something the service cannot do.
    #[error("{0}")]
    Rejected(String),

    /// Email could not be built or delivered.
    #[error("mail error: {0}")]
    Mail(String),
}

/// An order opened at the payment gateway for the client widget to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key handed to the checkout widget.
    fn key_id(&self) -> &str;
    async fn create_order(&self, amount: &Money, receipt: &str) -> Result<GatewayOrder, IntegrationError>;
    fn verify_payment_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool;
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;
}

/// AWB code handed out by the courier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwbAssignment {
    pub awb_code: String,
    pub courier_name: Option<String>,
}

/// Current delivery status for an AWB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingInfo {
    pub status: String,
    pub delivered: bool,
}

#[async_trait]
pub trait ShippingProvider: Send + Sync {
    async fn create_shipment(&self, order: &Order) -> Result<ShipmentRecord, IntegrationError>;
    /// `None` while the courier has not issued an AWB yet.
    async fn assign_awb(&self, shipment_id: &str) -> Result<Option<AwbAssignment>, IntegrationError>;
    async fn track(&self, awb_code: &str) -> Result<TrackingInfo, IntegrationError>;
    fn tracking_url(&self, awb_code: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<UploadedImage, IntegrationError>;
    async fn destroy(&self, public_id: &str) -> Result<(), IntegrationError>;
}

#[async_trait]
pub trait RateSource: Send + Sync {
    /// Rates for one unit of `base`, keyed by upper-case currency code.
    async fn latest(&self, base: &str) -> Result<HashMap<String, Decimal>, IntegrationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), IntegrationError>;
}

/// Reads an error body without failing on decode problems.
pub(crate) async fn error_from_response(service: &'static str, response: reqwest::Response) -> IntegrationError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    if status == 401 || status == 403 {
        tracing::warn!(service, status, "Credentials rejected");
        return IntegrationError::Authentication(service);
    }
    IntegrationError::Api { service, status, message: truncate(&message, 500) }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
