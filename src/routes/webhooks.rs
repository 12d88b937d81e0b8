//! Payment gateway webhooks.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;

use crate::error::{AppError, AppResult};
use crate::services::orders;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/razorpay", post(razorpay))
}

/// The signature covers the raw body, so it is read as bytes.
async fn razorpay(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AppResult<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing webhook signature".into()))?;
    orders::handle_webhook(&state, &body, signature).await?;
    Ok(StatusCode::OK)
}
