use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::domain::aggregates::{Order, UserProfile};
use crate::error::{AppError, AppResult};
use crate::middleware::RequireAdmin;
use crate::services::accounts::{self, UserListParams};
use crate::services::orders::{self, OrderListParams, StatusUpdateInput};
use crate::services::Paginated;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", patch(update_status))
        .route("/orders/{id}/shipment", post(retry_shipment))
        .route("/users", get(list_users))
}

async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<OrderListParams>,
) -> AppResult<Json<Paginated<Order>>> {
    Ok(Json(orders::list_orders(&state, &params).await?))
}

async fn get_order(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    orders::get_order(&state, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Order"))
}

async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(input): Json<StatusUpdateInput>,
) -> AppResult<Json<Order>> {
    tracing::info!(admin = %admin.email, order_id = %id, status = input.status.as_str(), "Admin status change");
    Ok(Json(orders::update_status(&state, id, input).await?))
}

async fn retry_shipment(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    Ok(Json(orders::retry_shipment(&state, id).await?))
}

async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<UserListParams>,
) -> AppResult<Json<Paginated<UserProfile>>> {
    Ok(Json(accounts::list_users(&state, &params).await?))
}
