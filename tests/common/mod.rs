//! Test application with an in-memory store and fake integrations.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

use storefront::config::Config;
use storefront::domain::Money;
use storefront::domain::aggregates::{Order, ShipmentRecord};
use storefront::events::EventBus;
use storefront::integrations::razorpay::{sign_hex, verify_hmac_hex};
use storefront::integrations::{
    AwbAssignment, CurrencyConverter, GatewayOrder, ImageHost, IntegrationError, Mailer, OutgoingEmail,
    PaymentGateway, RateSource, ShippingProvider, TrackingInfo, UploadedImage,
};
use storefront::store::{DocumentStore, FindResult, MemoryStore, Query, StoreError};
use uuid::Uuid;
use storefront::{AppState, Services, router};

pub const ADMIN_EMAIL: &str = "admin@shop.in";
pub const KEY_SECRET: &str = "rzp_test_secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
pub struct FakeGateway {
    orders: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_order(&self, amount: &Money, _receipt: &str) -> Result<GatewayOrder, IntegrationError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_test_{n}"),
            amount: amount.minor_units().map_err(|e| IntegrationError::Rejected(e.to_string()))?,
            currency: amount.currency().to_string(),
        })
    }

    fn verify_payment_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let message = format!("{gateway_order_id}|{payment_id}");
        verify_hmac_hex(KEY_SECRET.as_bytes(), message.as_bytes(), signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        verify_hmac_hex(WEBHOOK_SECRET.as_bytes(), body, signature)
    }
}

/// Hands out an AWB code only once `awb_ready` is set.
pub struct FakeShipping {
    pub awb_ready: AtomicBool,
    pub delivered: AtomicBool,
    pub shipments: AtomicUsize,
}

impl FakeShipping {
    pub fn new(awb_ready: bool) -> Self {
        Self { awb_ready: AtomicBool::new(awb_ready), delivered: AtomicBool::new(false), shipments: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl ShippingProvider for FakeShipping {
    async fn create_shipment(&self, order: &Order) -> Result<ShipmentRecord, IntegrationError> {
        let n = self.shipments.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ShipmentRecord {
            provider_order_id: format!("sr_{}", order.order_number()),
            shipment_id: format!("ship_{n}"),
            awb_code: None,
            courier_name: None,
            tracking_status: None,
            created_at: Utc::now(),
        })
    }

    async fn assign_awb(&self, _shipment_id: &str) -> Result<Option<AwbAssignment>, IntegrationError> {
        if !self.awb_ready.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(AwbAssignment { awb_code: "AWB123456".into(), courier_name: Some("Delhivery".into()) }))
    }

    async fn track(&self, _awb_code: &str) -> Result<TrackingInfo, IntegrationError> {
        let delivered = self.delivered.load(Ordering::SeqCst);
        Ok(TrackingInfo { status: if delivered { "Delivered" } else { "In Transit" }.into(), delivered })
    }

    fn tracking_url(&self, awb_code: &str) -> String {
        format!("https://track.example/{awb_code}")
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub destroyed: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageHost for FakeImages {
    async fn upload(&self, file_name: &str, _content_type: &str, _bytes: Vec<u8>) -> Result<UploadedImage, IntegrationError> {
        Ok(UploadedImage {
            url: format!("https://img.example/{file_name}"),
            public_id: format!("storefront/{file_name}"),
            width: Some(800),
            height: Some(600),
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), IntegrationError> {
        self.destroyed.lock().await.push(public_id.to_string());
        Ok(())
    }
}

pub struct FixedRates;

#[async_trait]
impl RateSource for FixedRates {
    async fn latest(&self, _base: &str) -> Result<HashMap<String, Decimal>, IntegrationError> {
        Ok(HashMap::from([
            ("INR".to_string(), Decimal::ONE),
            ("USD".to_string(), Decimal::new(12, 3)),
        ]))
    }
}

/// Keeps every email so tests can read OTP codes.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), IntegrationError> {
        self.sent.lock().await.push(email);
        Ok(())
    }
}

/// Memory store that pauses after every read, so concurrent requests both
/// see the state before either writes.
pub struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self { inner: MemoryStore::new(), delay }
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    async fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<(), StoreError> {
        self.inner.insert(collection, id, body).await
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
        let found = self.inner.get(collection, id).await;
        tokio::time::sleep(self.delay).await;
        found
    }

    async fn replace(&self, collection: &str, id: Uuid, body: Value) -> Result<bool, StoreError> {
        self.inner.replace(collection, id, body).await
    }

    async fn replace_if(
        &self,
        collection: &str,
        id: Uuid,
        field: &'static str,
        expected: &Value,
        body: Value,
    ) -> Result<bool, StoreError> {
        self.inner.replace_if(collection, id, field, expected, body).await
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<FindResult, StoreError> {
        let found = self.inner.find(collection, query).await;
        tokio::time::sleep(self.delay).await;
        found
    }
}

// =============================================================================
// Test application
// =============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub shipping: Arc<FakeShipping>,
    pub images: Arc<FakeImages>,
    pub mailer: Arc<CapturingMailer>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `name=value` of the session cookie, when one was set.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("storefront_session="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(true, true)
    }

    /// `payments` and `awb_ready` control the fakes.
    pub fn with(payments: bool, awb_ready: bool) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), payments, awb_ready)
    }

    pub fn with_store(store: Arc<dyn DocumentStore>, payments: bool, awb_ready: bool) -> Self {
        let config = Config { admin_emails: vec![ADMIN_EMAIL.into()], ..Config::default() };
        let shipping = Arc::new(FakeShipping::new(awb_ready));
        let images = Arc::new(FakeImages::default());
        let mailer = Arc::new(CapturingMailer::default());
        let services = Services {
            store,
            payments: payments.then(|| Arc::new(FakeGateway::default()) as Arc<dyn PaymentGateway>),
            shipping: Some(shipping.clone()),
            images: Some(images.clone()),
            mailer: mailer.clone(),
            currency: CurrencyConverter::new(Arc::new(FixedRates)),
            events: EventBus::new(None),
        };
        let state = AppState::new(config, services);
        let router = router(state.clone(), tower_sessions::MemoryStore::default());
        Self { router, state, shipping, images, mailer }
    }

    pub fn without_integrations() -> Self {
        let mailer = Arc::new(CapturingMailer::default());
        let state = AppState::new(
            Config { admin_emails: vec![ADMIN_EMAIL.into()], ..Config::default() },
            Services {
                store: Arc::new(MemoryStore::new()),
                payments: None,
                shipping: None,
                images: None,
                mailer: mailer.clone(),
                currency: CurrencyConverter::new(Arc::new(FixedRates)),
                events: EventBus::new(None),
            },
        );
        let router = router(state.clone(), tower_sessions::MemoryStore::default());
        Self {
            router,
            state,
            shipping: Arc::new(FakeShipping::new(false)),
            images: Arc::new(FakeImages::default()),
            mailer,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse { status, headers, body }
    }

    pub async fn call(&self, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.call(Method::GET, uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.call(Method::POST, uri, cookie, Some(body)).await
    }

    /// Registers and returns the session cookie.
    pub async fn register(&self, email: &str) -> String {
        let response = self
            .post("/api/auth/register", None, json!({"name": "Test User", "email": email, "password": "password123"}))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "register failed: {}", response.body);
        response.session_cookie().expect("session cookie")
    }

    /// Signs in as the configured admin through an emailed code.
    pub async fn admin(&self) -> String {
        let response = self.login_with_code(ADMIN_EMAIL).await;
        assert_eq!(response.status, StatusCode::OK, "admin login failed: {}", response.body);
        response.session_cookie().expect("session cookie")
    }

    /// Requests an email code and submits it.
    pub async fn login_with_code(&self, email: &str) -> TestResponse {
        let requested = self.post("/api/auth/otp/request", None, json!({"email": email})).await;
        assert_eq!(requested.status, StatusCode::ACCEPTED, "code request failed: {}", requested.body);
        let code = self.last_code(email).await;
        self.post("/api/auth/otp/verify", None, json!({"email": email, "code": code})).await
    }

    /// The code from the latest email sent to `email`.
    pub async fn last_code(&self, email: &str) -> String {
        let sent = self.mailer.sent.lock().await;
        let message = sent.iter().rev().find(|m| m.to == email).expect("code email");
        message.body.chars().filter(char::is_ascii_digit).take(6).collect()
    }

    /// Creates an active product as admin and returns its JSON.
    pub async fn create_product(&self, admin: &str, name: &str, price: i64, stock: u32, sizes: &[&str]) -> Value {
        let response = self
            .post(
                "/api/admin/products",
                Some(admin),
                json!({
                    "name": name,
                    "description": format!("{name} in organic cotton"),
                    "price": price,
                    "sizes": sizes,
                    "images": [format!("https://img.example/{name}.jpg")],
                    "stock": stock,
                    "status": "active",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "create product failed: {}", response.body);
        response.body
    }

    pub async fn add_address(&self, cookie: &str) -> Value {
        let response = self
            .post(
                "/api/account/addresses",
                Some(cookie),
                json!({
                    "name": "Asha Rao",
                    "phone": "9876543210",
                    "line1": "12 MG Road",
                    "city": "Bengaluru",
                    "state": "Karnataka",
                    "pincode": "560001",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "add address failed: {}", response.body);
        response.body
    }
}

/// Signature the gateway's checkout widget would return.
pub fn payment_signature(gateway_order_id: &str, payment_id: &str) -> String {
    sign_hex(KEY_SECRET.as_bytes(), format!("{gateway_order_id}|{payment_id}").as_bytes()).unwrap()
}

pub fn webhook_signature(body: &[u8]) -> String {
    sign_hex(WEBHOOK_SECRET.as_bytes(), body).unwrap()
}

pub fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap_or_default().parse().unwrap()
}
