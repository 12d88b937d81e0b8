//! Checkout and the customer's orders.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::Order;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::orders::{self, CheckoutInput, CheckoutSession, ShipmentStatus, VerifyPaymentInput};
use crate::services::{Paginated, Pagination};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/checkout/verify", post(verify_payment))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/shipment", get(shipment_status))
        .route("/orders/{id}/track", get(track_order))
}

async fn checkout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    input: Option<Json<CheckoutInput>>,
) -> AppResult<(StatusCode, Json<CheckoutSession>)> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let session = orders::checkout(&state, user.id, input).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn verify_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<VerifyPaymentInput>,
) -> AppResult<Json<Order>> {
    Ok(Json(orders::verify_payment(&state, user.id, input).await?))
}

async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Paginated<Order>>> {
    Ok(Json(orders::list_own_orders(&state, user.id, pagination).await?))
}

async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    Ok(Json(orders::get_own_order(&state, user.id, id).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    Ok(Json(orders::cancel_own_order(&state, user.id, id).await?))
}

#[derive(Debug, Default, Deserialize)]
struct ShipmentParams {
    /// Seconds to wait for an AWB code.
    #[serde(default)]
    wait: u64,
}

async fn shipment_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Query(params): Query<ShipmentParams>,
) -> AppResult<Json<ShipmentStatus>> {
    let wait = Duration::from_secs(params.wait);
    Ok(Json(orders::shipment_status(&state, user.id, id, wait).await?))
}

async fn track_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Redirect> {
    let url = orders::tracking_url(&state, user.id, id).await?;
    Ok(Redirect::temporary(&url))
}
