use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use uuid::Uuid;

use super::{MAX_UPLOAD_BYTES, read_file_field};
use crate::domain::aggregates::{Announcement, Banner};
use crate::error::AppResult;
use crate::integrations::UploadedImage;
use crate::middleware::RequireAdmin;
use crate::routes::content::BannerParams;
use crate::services::content::{self, AnnouncementInput, BannerInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/announcements", get(list_announcements).post(create_announcement))
        .route("/announcements/{id}", put(update_announcement).delete(delete_announcement))
        .route("/banners", get(list_banners).post(create_banner))
        .route("/banners/{id}", put(update_banner).delete(delete_banner))
        .route("/uploads", post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
}

/// Includes inactive announcements.
async fn list_announcements(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> AppResult<Json<Vec<Announcement>>> {
    Ok(Json(content::list_announcements(&state, false).await?))
}

async fn create_announcement(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<AnnouncementInput>,
) -> AppResult<(StatusCode, Json<Announcement>)> {
    let announcement = content::create_announcement(&state, input).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

async fn update_announcement(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(input): Json<AnnouncementInput>,
) -> AppResult<Json<Announcement>> {
    Ok(Json(content::update_announcement(&state, id, input).await?))
}

async fn delete_announcement(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    content::delete_announcement(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_banners(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<BannerParams>,
) -> AppResult<Json<Vec<Banner>>> {
    Ok(Json(content::list_banners(&state, params.kind, false).await?))
}

async fn create_banner(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<BannerInput>,
) -> AppResult<(StatusCode, Json<Banner>)> {
    let banner = content::create_banner(&state, input).await?;
    Ok((StatusCode::CREATED, Json(banner)))
}

async fn update_banner(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(input): Json<BannerInput>,
) -> AppResult<Json<Banner>> {
    Ok(Json(content::update_banner(&state, id, input).await?))
}

async fn delete_banner(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    content::delete_banner(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadedImage>)> {
    let file = read_file_field(multipart).await?;
    let image = content::upload_image(&state, &file.file_name, &file.content_type, file.bytes).await?;
    Ok((StatusCode::CREATED, Json(image)))
}
