//! Profile and address book of the signed-in user.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use uuid::Uuid;

use crate::domain::aggregates::{Address, UserProfile};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::accounts::{self, AddressInput, ProfileInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/account", get(profile).put(update_profile))
        .route("/account/addresses", get(list_addresses).post(add_address))
        .route("/account/addresses/{id}", put(update_address).delete(remove_address))
}

async fn profile(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<UserProfile>> {
    Ok(Json(accounts::load_user(&state, user.id).await?.profile()))
}

async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<ProfileInput>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(accounts::update_profile(&state, user.id, input).await?))
}

async fn list_addresses(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<Vec<Address>>> {
    Ok(Json(accounts::load_user(&state, user.id).await?.addresses().to_vec()))
}

async fn add_address(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<AddressInput>,
) -> AppResult<(StatusCode, Json<Address>)> {
    let address = accounts::add_address(&state, user.id, input).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn update_address(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<AddressInput>,
) -> AppResult<Json<Address>> {
    Ok(Json(accounts::update_address(&state, user.id, id, input).await?))
}

/// Returns the remaining addresses.
async fn remove_address(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Address>>> {
    Ok(Json(accounts::remove_address(&state, user.id, id).await?))
}
