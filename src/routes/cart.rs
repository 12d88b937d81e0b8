//! Cart and wishlist.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::domain::aggregates::Product;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::cart::{self, CartItemInput, CartSyncInput, CartSyncResult, CartView, WishlistSyncInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart", get(view_cart).delete(clear_cart))
        .route("/cart/items", post(add_item).put(set_quantity))
        .route("/cart/items/{product_id}", delete(remove_item))
        .route("/cart/sync", post(sync_cart))
        .route("/wishlist", get(wishlist))
        .route("/wishlist/sync", post(sync_wishlist))
        .route("/wishlist/{product_id}", post(add_to_wishlist).delete(remove_from_wishlist))
}

async fn view_cart(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<CartView>> {
    Ok(Json(cart::view(&state, user.id).await?))
}

async fn clear_cart(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<CartView>> {
    Ok(Json(cart::clear(&state, user.id).await?))
}

async fn add_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CartItemInput>,
) -> AppResult<Json<CartView>> {
    Ok(Json(cart::add_item(&state, user.id, input).await?))
}

async fn set_quantity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CartItemInput>,
) -> AppResult<Json<CartView>> {
    Ok(Json(cart::set_quantity(&state, user.id, input).await?))
}

async fn remove_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<CartView>> {
    Ok(Json(cart::remove_product(&state, user.id, product_id).await?))
}

async fn sync_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CartSyncInput>,
) -> AppResult<Json<CartSyncResult>> {
    Ok(Json(cart::sync(&state, user.id, input).await?))
}

async fn wishlist(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(cart::wishlist(&state, user.id).await?))
}

async fn add_to_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(cart::add_to_wishlist(&state, user.id, product_id).await?))
}

async fn remove_from_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(cart::remove_from_wishlist(&state, user.id, product_id).await?))
}

async fn sync_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<WishlistSyncInput>,
) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(cart::sync_wishlist(&state, user.id, input).await?))
}
