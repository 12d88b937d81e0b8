//! Public storefront content.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::domain::aggregates::{Announcement, Banner, BannerKind};
use crate::error::AppResult;
use crate::services::content;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/announcements", get(list_announcements))
        .route("/banners", get(list_banners))
}

async fn list_announcements(State(state): State<AppState>) -> AppResult<Json<Vec<Announcement>>> {
    Ok(Json(content::list_announcements(&state, true).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct BannerParams {
    pub kind: Option<BannerKind>,
}

async fn list_banners(
    State(state): State<AppState>,
    Query(params): Query<BannerParams>,
) -> AppResult<Json<Vec<Banner>>> {
    Ok(Json(content::list_banners(&state, params.kind, true).await?))
}
