//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Health check
//!
//! # Storefront (public)
//! GET  /api/products                        - Active products (page, category, search, sort)
//! GET  /api/products/{id}                   - Product detail
//! GET  /api/categories                      - Categories by position
//! GET  /api/categories/{slug}               - Category by slug
//! GET  /api/announcements                   - Active announcements
//! GET  /api/banners?kind=                   - Active banners
//! GET  /api/currency/convert                - Display-only currency conversion
//! POST /api/webhooks/razorpay               - Payment gateway webhook
//!
//! # Auth
//! POST /api/auth/register | login | logout
//! GET  /api/auth/me
//! POST /api/auth/otp/request | otp/verify
//!
//! # Account (login required)
//! GET|PUT         /api/account
//! GET|POST        /api/account/addresses
//! PUT|DELETE      /api/account/addresses/{id}
//! GET|DELETE      /api/cart
//! POST|PUT        /api/cart/items
//! DELETE          /api/cart/items/{product_id}
//! POST            /api/cart/sync
//! GET             /api/wishlist
//! POST|DELETE     /api/wishlist/{product_id}
//! POST            /api/wishlist/sync
//! POST            /api/checkout
//! POST            /api/checkout/verify
//! GET             /api/orders
//! GET             /api/orders/{id}
//! POST            /api/orders/{id}/cancel
//! GET             /api/orders/{id}/shipment?wait=
//! GET             /api/orders/{id}/track
//!
//! # Admin (admin role required), see [`admin`]
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod content;
pub mod orders;
pub mod webhooks;

use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::middleware::create_session_layer;
use crate::state::AppState;

/// Builds the application with every route, the session layer and request
/// tracing.
pub fn router<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config().secure_cookies);
    let cors = cors_layer(state.config().cors_origin.as_deref());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(catalog::router())
        .merge(content::router())
        .merge(auth::router())
        .merge(account::router())
        .merge(cart::router())
        .merge(orders::router())
        .merge(webhooks::router())
        .nest("/admin", admin::router())
}

/// With a configured origin, credentials (the session cookie) are allowed
/// from that origin only. Without one, any origin may call, without cookies.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin.and_then(|o| HeaderValue::from_str(o).ok()) else {
        return CorsLayer::permissive();
    };
    CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "healthy", service: "storefront", version: env!("CARGO_PKG_VERSION") })
}
