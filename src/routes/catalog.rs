//! Public catalog routes.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::{Category, Product};
use crate::error::{AppError, AppResult};
use crate::integrations::currency::Conversion;
use crate::services::catalog::{self, Audience, ProductListParams};
use crate::services::Paginated;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{id}", get(get_product))
        .route("/categories", get(list_categories))
        .route("/categories/{slug}", get(get_category))
        .route("/currency/convert", get(convert_currency))
}

async fn list_products(
    State(state): State<AppState>,
    Query(mut params): Query<ProductListParams>,
) -> AppResult<Json<Paginated<Product>>> {
    params.status = None;
    Ok(Json(catalog::list_products(&state, &params, Audience::Storefront).await?))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Product>> {
    Ok(Json(catalog::get_active_product(&state, id).await?))
}

async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(catalog::list_categories(&state).await?))
}

async fn get_category(State(state): State<AppState>, Path(slug): Path<String>) -> AppResult<Json<Category>> {
    catalog::find_category_by_slug(&state, &slug)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Category"))
}

#[derive(Debug, Deserialize)]
struct ConvertParams {
    amount: Decimal,
    /// Defaults to the store currency.
    from: Option<String>,
    to: String,
}

async fn convert_currency(
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
) -> AppResult<Json<Conversion>> {
    let from = params.from.unwrap_or_else(|| state.config().commerce.currency.clone());
    Ok(Json(state.currency().convert(params.amount, &from, &params.to).await?))
}
