//! Back-office routes. Every handler takes [`RequireAdmin`].
//!
//! # Route Structure
//!
//! ```text
//! GET|POST         /api/admin/products
//! GET|PUT|DELETE   /api/admin/products/{id}      - DELETE archives
//! POST             /api/admin/products/{id}/stock
//! GET              /api/admin/products/export    - CSV download
//! POST             /api/admin/products/import    - CSV upload (multipart `file`)
//! GET|POST         /api/admin/categories
//! PUT|DELETE       /api/admin/categories/{id}
//! GET|POST         /api/admin/announcements
//! PUT|DELETE       /api/admin/announcements/{id}
//! GET|POST         /api/admin/banners
//! PUT|DELETE       /api/admin/banners/{id}
//! POST             /api/admin/uploads            - Image upload (multipart `file`)
//! GET              /api/admin/orders
//! GET              /api/admin/orders/{id}
//! PATCH            /api/admin/orders/{id}/status
//! POST             /api/admin/orders/{id}/shipment
//! GET              /api/admin/users
//! GET              /api/admin/events             - Server-sent domain events
//! ```
//!
//! [`RequireAdmin`]: crate::middleware::RequireAdmin

mod catalog;
mod content;
mod events;
mod orders;

use axum::extract::Multipart;
use axum::Router;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Largest accepted upload (images and CSV files).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(catalog::router())
        .merge(content::router())
        .merge(orders::router())
        .merge(events::router())
}

/// A file taken from a multipart form.
struct UploadedFile {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// Reads the `file` field of a multipart form; other fields are ignored.
async fn read_file_field(mut multipart: Multipart) -> AppResult<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?;
        return Ok(UploadedFile { file_name, content_type, bytes: bytes.to_vec() });
    }
    Err(AppError::BadRequest("No file was uploaded".into()))
}
