use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use super::{MAX_UPLOAD_BYTES, read_file_field};
use crate::domain::aggregates::{Category, Product};
use crate::error::{AppError, AppResult};
use crate::middleware::RequireAdmin;
use crate::services::catalog::{self, Audience, CategoryInput, ImportReport, ProductInput, ProductListParams};
use crate::services::Paginated;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/export", get(export_products))
        .route(
            "/products/import",
            post(import_products).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/products/{id}", get(get_product).put(update_product).delete(archive_product))
        .route("/products/{id}/stock", post(adjust_stock))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}", put(update_category).delete(delete_category))
}

async fn list_products(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ProductListParams>,
) -> AppResult<Json<Paginated<Product>>> {
    Ok(Json(catalog::list_products(&state, &params, Audience::Admin).await?))
}

async fn get_product(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    catalog::get_product(&state, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Product"))
}

async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<ProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let product = catalog::create_product(&state, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(input): Json<ProductInput>,
) -> AppResult<Json<Product>> {
    Ok(Json(catalog::update_product(&state, id, input).await?))
}

async fn archive_product(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    Ok(Json(catalog::archive_product(&state, id).await?))
}

#[derive(Debug, Deserialize)]
struct StockAdjustment {
    /// Positive to add stock, negative to remove.
    delta: i64,
}

async fn adjust_stock(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(input): Json<StockAdjustment>,
) -> AppResult<Json<Product>> {
    Ok(Json(catalog::adjust_stock(&state, id, input.delta).await?))
}

async fn export_products(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> AppResult<impl IntoResponse> {
    let csv = catalog::export_products_csv(&state).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"products.csv\""),
        ],
        csv,
    ))
}

async fn import_products(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: Multipart,
) -> AppResult<Json<ImportReport>> {
    let file = read_file_field(multipart).await?;
    tracing::info!(admin = %admin.email, file = %file.file_name, bytes = file.bytes.len(), "Importing products");
    Ok(Json(catalog::import_products_csv(&state, &file.bytes).await?))
}

async fn list_categories(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(catalog::list_categories(&state).await?))
}

async fn create_category(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<CategoryInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let category = catalog::create_category(&state, input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(input): Json<CategoryInput>,
) -> AppResult<Json<Category>> {
    Ok(Json(catalog::update_category(&state, id, input).await?))
}

async fn delete_category(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    catalog::delete_category(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
