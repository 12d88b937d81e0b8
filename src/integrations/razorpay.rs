//! Razorpay payment gateway client.
//!
//! Checkout opens a Razorpay order for the order total; the client widget
//! collects payment and hands back `razorpay_order_id`, `razorpay_payment_id`
//! and `razorpay_signature`, which are verified here with HMAC-SHA256.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::instrument;

use super::{GatewayOrder, IntegrationError, PaymentGateway, error_from_response};
use crate::config::RazorpayConfig;
use crate::domain::Money;

const API_BASE: &str = "https://api.razorpay.com/v1";
const SERVICE: &str = "razorpay";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct RazorpayClient {
    client: reqwest::Client,
    key_id: String,
    key_secret: SecretString,
    webhook_secret: Option<SecretString>,
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

impl RazorpayClient {
    /// # Errors
    ///
    /// Returns `IntegrationError::Http` if the HTTP client cannot be built.
    pub fn new(config: &RazorpayConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    #[instrument(skip(self, amount), fields(amount = %amount))]
    async fn create_order(&self, amount: &Money, receipt: &str) -> Result<GatewayOrder, IntegrationError> {
        let minor = amount
            .minor_units()
            .map_err(|e| IntegrationError::Rejected(e.to_string()))?;
        let response = self
            .client
            .post(format!("{API_BASE}/orders"))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&CreateOrderRequest { amount: minor, currency: amount.currency(), receipt, payment_capture: 1 })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }

        let order: CreateOrderResponse = response.json().await?;
        tracing::info!(gateway_order_id = %order.id, "Razorpay order created");
        Ok(GatewayOrder { id: order.id, amount: order.amount, currency: order.currency })
    }

    fn verify_payment_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let message = format!("{gateway_order_id}|{payment_id}");
        verify_hmac_hex(self.key_secret.expose_secret().as_bytes(), message.as_bytes(), signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        match &self.webhook_secret {
            Some(secret) => verify_hmac_hex(secret.expose_secret().as_bytes(), body, signature),
            None => false,
        }
    }
}

/// Hex-encoded HMAC-SHA256 of `message`.
#[must_use]
pub fn sign_hex(secret: &[u8], message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a hex signature against the expected HMAC.
#[must_use]
pub fn verify_hmac_hex(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Payment events delivered to the webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookEntity<WebhookPayment>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntity<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RazorpayClient {
        RazorpayClient::new(&RazorpayConfig {
            key_id: "rzp_test_key".into(),
            key_secret: SecretString::from("test_secret".to_string()),
            webhook_secret: Some(SecretString::from("whsec".to_string())),
        })
        .unwrap()
    }

    #[test]
    fn test_payment_signature() {
        let client = client();
        let signature = "2d67c3fceac8e3487e54e2d6ea7815a350a8562ed56d521a80eb43a393e9ab52";
        assert!(client.verify_payment_signature("order_IEIaMR65cu6nz3", "pay_IH4NVgf4Dreq1l", signature));
        assert!(!client.verify_payment_signature("order_IEIaMR65cu6nz3", "pay_other", signature));
        assert!(!client.verify_payment_signature("order_IEIaMR65cu6nz3", "pay_IH4NVgf4Dreq1l", "not-hex"));
    }

    #[test]
    fn test_webhook_signature() {
        let client = client();
        let body = br#"{"event":"payment.captured"}"#;
        assert!(client.verify_webhook_signature(body, "4673dd707ef4c41b987cb7fefe1583142dc702388c93145b7814b9ad3d3c183e"));
        assert!(!client.verify_webhook_signature(b"{}", "4673dd707ef4c41b987cb7fefe1583142dc702388c93145b7814b9ad3d3c183e"));
    }

    #[test]
    fn test_sign_hex_matches_verify() {
        let sig = sign_hex(b"k", b"m").unwrap();
        assert!(verify_hmac_hex(b"k", b"m", &sig));
    }

    #[test]
    fn test_webhook_event_shape() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"event":"payment.failed","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_1","status":"failed"}}}}"#,
        )
        .unwrap();
        assert_eq!(event.event, "payment.failed");
        assert_eq!(event.payload.payment.unwrap().entity.order_id.as_deref(), Some("order_1"));
    }
}
