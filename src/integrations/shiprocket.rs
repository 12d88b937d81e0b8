//! Shiprocket shipping API client.
//!
//! Authentication is email/password → bearer token. Tokens are valid for ten
//! days; the client caches one in memory and logs in again a day before it
//! expires, or immediately after a 401.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;
use tracing::instrument;

use super::{AwbAssignment, IntegrationError, ShippingProvider, TrackingInfo, error_from_response};
use crate::config::ShiprocketConfig;
use crate::domain::aggregates::{Order, ShipmentRecord};

const API_BASE: &str = "https://apiv2.shiprocket.in/v1/external";
const TRACKING_PAGE: &str = "https://shiprocket.co/tracking";
const SERVICE: &str = "shiprocket";
const TOKEN_LIFETIME: Duration = Duration::from_secs(9 * 24 * 60 * 60);

/// Package dimensions in centimetres used for every parcel.
const PARCEL_CM: (u32, u32, u32) = (30, 25, 5);
const MIN_WEIGHT_KG: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

#[derive(Clone)]
pub struct ShiprocketClient {
    inner: Arc<ShiprocketClientInner>,
}

struct ShiprocketClientInner {
    client: reqwest::Client,
    email: String,
    password: SecretString,
    pickup_location: String,
    token: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    token: SecretString,
    refresh_after: Instant,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct AdhocOrderRequest<'a> {
    order_id: &'a str,
    order_date: String,
    pickup_location: &'a str,
    billing_customer_name: &'a str,
    billing_last_name: &'a str,
    billing_address: &'a str,
    billing_address_2: &'a str,
    billing_city: &'a str,
    billing_pincode: &'a str,
    billing_state: &'a str,
    billing_country: &'a str,
    billing_email: &'a str,
    billing_phone: &'a str,
    shipping_is_billing: bool,
    order_items: Vec<AdhocOrderItem<'a>>,
    payment_method: &'static str,
    shipping_charges: Decimal,
    sub_total: Decimal,
    length: u32,
    breadth: u32,
    height: u32,
    weight: Decimal,
}

#[derive(Debug, Serialize)]
struct AdhocOrderItem<'a> {
    name: &'a str,
    sku: &'a str,
    units: u32,
    selling_price: Decimal,
}

#[derive(Deserialize)]
struct AdhocOrderResponse {
    #[serde(deserialize_with = "id_string")]
    order_id: String,
    #[serde(deserialize_with = "id_string")]
    shipment_id: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    awb_code: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    courier_name: Option<String>,
}

#[derive(Deserialize)]
struct AssignAwbResponse {
    #[serde(default)]
    awb_assign_status: i64,
    response: Option<AssignAwbBody>,
}

#[derive(Deserialize)]
struct AssignAwbBody {
    data: AssignAwbData,
}

#[derive(Deserialize)]
struct AssignAwbData {
    #[serde(default, deserialize_with = "blank_as_none")]
    awb_code: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    courier_name: Option<String>,
}

#[derive(Deserialize)]
struct TrackResponse {
    tracking_data: TrackingData,
}

#[derive(Deserialize)]
struct TrackingData {
    #[serde(default)]
    shipment_track: Vec<ShipmentTrack>,
}

#[derive(Deserialize)]
struct ShipmentTrack {
    #[serde(default)]
    current_status: Option<String>,
}

impl ShiprocketClient {
    /// # Errors
    ///
    /// Returns `IntegrationError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ShiprocketConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            inner: Arc::new(ShiprocketClientInner {
                client,
                email: config.email.clone(),
                password: config.password.clone(),
                pickup_location: config.pickup_location.clone(),
                token: RwLock::new(None),
            }),
        })
    }

    /// Returns a cached token, logging in when there is none or it is stale.
    async fn token(&self) -> Result<SecretString, IntegrationError> {
        if let Some(cached) = self.inner.token.read().await.as_ref() {
            if Instant::now() < cached.refresh_after {
                return Ok(cached.token.clone());
            }
        }
        self.login().await
    }

    #[instrument(skip(self), fields(email = %self.inner.email))]
    async fn login(&self) -> Result<SecretString, IntegrationError> {
        let response = self
            .inner
            .client
            .post(format!("{API_BASE}/auth/login"))
            .json(&LoginRequest { email: &self.inner.email, password: self.inner.password.expose_secret() })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }
        let LoginResponse { token } = response.json().await?;
        let token = SecretString::from(token);
        *self.inner.token.write().await = Some(CachedToken {
            token: token.clone(),
            refresh_after: Instant::now() + TOKEN_LIFETIME,
        });
        tracing::info!("Shiprocket token refreshed");
        Ok(token)
    }

    /// Sends an authorized request, logging in again once on 401.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response, IntegrationError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.token().await?;
        let response = build(&self.inner.client).bearer_auth(token.expose_secret()).send().await?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        *self.inner.token.write().await = None;
        let token = self.login().await?;
        Ok(build(&self.inner.client).bearer_auth(token.expose_secret()).send().await?)
    }
}

#[async_trait]
impl ShippingProvider for ShiprocketClient {
    #[instrument(skip(self, order), fields(order_number = %order.order_number()))]
    async fn create_shipment(&self, order: &Order) -> Result<ShipmentRecord, IntegrationError> {
        let address = order.shipping_address();
        let (first_name, last_name) = address.name_parts();
        let grams: u32 = order.items().iter().map(|i| i.weight_grams.saturating_mul(i.quantity)).sum();
        let weight = (Decimal::from(grams) / Decimal::ONE_THOUSAND).max(MIN_WEIGHT_KG);

        let request = AdhocOrderRequest {
            order_id: order.order_number(),
            order_date: order.created_at().format("%Y-%m-%d %H:%M").to_string(),
            pickup_location: &self.inner.pickup_location,
            billing_customer_name: first_name,
            billing_last_name: last_name,
            billing_address: &address.line1,
            billing_address_2: address.line2.as_deref().unwrap_or_default(),
            billing_city: &address.city,
            billing_pincode: address.pincode.as_str(),
            billing_state: &address.state,
            billing_country: &address.country,
            billing_email: order.email(),
            billing_phone: &address.phone,
            shipping_is_billing: true,
            order_items: order
                .items()
                .iter()
                .map(|i| AdhocOrderItem {
                    name: &i.name,
                    sku: i.sku.as_str(),
                    units: i.quantity,
                    selling_price: i.unit_price.amount(),
                })
                .collect(),
            payment_method: "Prepaid",
            shipping_charges: order.shipping_fee().amount(),
            sub_total: order.subtotal().amount(),
            length: PARCEL_CM.0,
            breadth: PARCEL_CM.1,
            height: PARCEL_CM.2,
            weight,
        };

        let response = self
            .send(|c| c.post(format!("{API_BASE}/orders/create/adhoc")).json(&request))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }
        let created: AdhocOrderResponse = response.json().await?;
        tracing::info!(shipment_id = %created.shipment_id, "Shiprocket order created");

        Ok(ShipmentRecord {
            provider_order_id: created.order_id,
            shipment_id: created.shipment_id,
            awb_code: created.awb_code,
            courier_name: created.courier_name,
            tracking_status: None,
            created_at: chrono::Utc::now(),
        })
    }

    #[instrument(skip(self))]
    async fn assign_awb(&self, shipment_id: &str) -> Result<Option<AwbAssignment>, IntegrationError> {
        let body = serde_json::json!({ "shipment_id": shipment_id });
        let response = self
            .send(|c| c.post(format!("{API_BASE}/courier/assign/awb")).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }
        let assigned: AssignAwbResponse = response.json().await?;
        Ok(parse_assignment(assigned))
    }

    #[instrument(skip(self))]
    async fn track(&self, awb_code: &str) -> Result<TrackingInfo, IntegrationError> {
        let response = self
            .send(|c| c.get(format!("{API_BASE}/courier/track/awb/{awb_code}")))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }
        let tracked: TrackResponse = response.json().await?;
        Ok(parse_tracking(tracked))
    }

    fn tracking_url(&self, awb_code: &str) -> String {
        format!("{TRACKING_PAGE}/{awb_code}")
    }
}

fn parse_assignment(assigned: AssignAwbResponse) -> Option<AwbAssignment> {
    if assigned.awb_assign_status != 1 {
        return None;
    }
    let data = assigned.response?.data;
    Some(AwbAssignment { awb_code: data.awb_code?, courier_name: data.courier_name })
}

fn parse_tracking(tracked: TrackResponse) -> TrackingInfo {
    let status = tracked
        .tracking_data
        .shipment_track
        .into_iter()
        .find_map(|t| t.current_status)
        .unwrap_or_else(|| "Pending".to_string());
    let delivered = status.eq_ignore_ascii_case("delivered");
    TrackingInfo { status, delivered }
}

/// Shiprocket returns ids as numbers or strings depending on the endpoint.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn blank_as_none<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adhoc_response_normalizes_ids() {
        let created: AdhocOrderResponse =
            serde_json::from_str(r#"{"order_id": 1234, "shipment_id": "5678", "status": "NEW", "awb_code": "", "courier_name": ""}"#)
                .unwrap();
        assert_eq!(created.order_id, "1234");
        assert_eq!(created.shipment_id, "5678");
        assert!(created.awb_code.is_none());
    }

    #[test]
    fn test_parse_assignment() {
        let assigned: AssignAwbResponse = serde_json::from_str(
            r#"{"awb_assign_status": 1, "response": {"data": {"awb_code": "141123221084922", "courier_name": "Delhivery Surface"}}}"#,
        )
        .unwrap();
        let awb = parse_assignment(assigned).unwrap();
        assert_eq!(awb.awb_code, "141123221084922");
        assert_eq!(awb.courier_name.as_deref(), Some("Delhivery Surface"));

        let pending: AssignAwbResponse = serde_json::from_str(r#"{"awb_assign_status": 0}"#).unwrap();
        assert!(parse_assignment(pending).is_none());
    }

    #[test]
    fn test_parse_tracking() {
        let tracked: TrackResponse = serde_json::from_str(
            r#"{"tracking_data": {"track_status": 1, "shipment_track": [{"current_status": "Delivered"}]}}"#,
        )
        .unwrap();
        assert_eq!(parse_tracking(tracked), TrackingInfo { status: "Delivered".into(), delivered: true });

        let empty: TrackResponse = serde_json::from_str(r#"{"tracking_data": {}}"#).unwrap();
        assert_eq!(parse_tracking(empty).status, "Pending");
    }

    #[test]
    fn test_min_weight() {
        assert_eq!(MIN_WEIGHT_KG, Decimal::new(1, 1));
    }
}
