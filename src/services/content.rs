//! Announcement bar and banner images.

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Announcement, Banner, BannerKind};
use crate::error::{AppError, AppResult};
use crate::integrations::UploadedImage;
use crate::state::AppState;
use crate::store::{Filter, Sort};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnnouncementInput {
    #[validate(length(min = 1, max = 300, message = "Message is required"))]
    pub message: String,
    pub link: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BannerInput {
    pub kind: BannerKind,
    #[validate(length(max = 200, message = "Title is too long"))]
    pub title: Option<String>,
    #[validate(url(message = "Image must be a URL"))]
    pub image_url: String,
    pub public_id: Option<String>,
    pub link: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub position: i32,
}

const fn default_true() -> bool {
    true
}

pub async fn list_announcements(state: &AppState, active_only: bool) -> AppResult<Vec<Announcement>> {
    let filter = if active_only { Filter::new().eq("active", true) } else { Filter::new() };
    let mut items = state.collection::<Announcement>().all(filter, Sort::Oldest).await?;
    items.sort_by_key(|a| a.position);
    Ok(items)
}

pub async fn create_announcement(state: &AppState, input: AnnouncementInput) -> AppResult<Announcement> {
    input.validate()?;
    let announcement = Announcement::new(&input.message, input.link, input.active, input.position);
    state.collection::<Announcement>().insert(&announcement).await?;
    Ok(announcement)
}

pub async fn update_announcement(state: &AppState, id: Uuid, input: AnnouncementInput) -> AppResult<Announcement> {
    input.validate()?;
    let collection = state.collection::<Announcement>();
    let mut announcement = collection.get(id).await?.ok_or_else(|| AppError::not_found("Announcement"))?;
    announcement.message = input.message.trim().to_string();
    announcement.link = input.link;
    announcement.active = input.active;
    announcement.position = input.position;
    collection.save(&announcement).await?;
    Ok(announcement)
}

pub async fn delete_announcement(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.collection::<Announcement>().delete(id).await? {
        return Err(AppError::not_found("Announcement"));
    }
    Ok(())
}

pub async fn list_banners(state: &AppState, kind: Option<BannerKind>, active_only: bool) -> AppResult<Vec<Banner>> {
    let mut filter = Filter::new();
    if let Some(kind) = kind {
        filter = filter.eq("kind", kind);
    }
    if active_only {
        filter = filter.eq("active", true);
    }
    let mut banners = state.collection::<Banner>().all(filter, Sort::Oldest).await?;
    banners.sort_by_key(|b| b.position);
    Ok(banners)
}

pub async fn create_banner(state: &AppState, input: BannerInput) -> AppResult<Banner> {
    input.validate()?;
    let mut banner = Banner::new(input.kind, input.image_url, input.public_id);
    banner.title = input.title;
    banner.link = input.link;
    banner.active = input.active;
    banner.position = input.position;
    state.collection::<Banner>().insert(&banner).await?;
    Ok(banner)
}

pub async fn update_banner(state: &AppState, id: Uuid, input: BannerInput) -> AppResult<Banner> {
    input.validate()?;
    let collection = state.collection::<Banner>();
    let mut banner = collection.get(id).await?.ok_or_else(|| AppError::not_found("Banner"))?;
    if banner.public_id.is_some() && banner.public_id != input.public_id {
        destroy_image(state, banner.public_id.as_deref()).await;
    }
    banner.kind = input.kind;
    banner.title = input.title;
    banner.image_url = input.image_url;
    banner.public_id = input.public_id;
    banner.link = input.link;
    banner.active = input.active;
    banner.position = input.position;
    collection.save(&banner).await?;
    Ok(banner)
}

/// Also removes the uploaded image at the image host, best-effort.
pub async fn delete_banner(state: &AppState, id: Uuid) -> AppResult<()> {
    let collection = state.collection::<Banner>();
    let banner = collection.get(id).await?.ok_or_else(|| AppError::not_found("Banner"))?;
    collection.delete(id).await?;
    destroy_image(state, banner.public_id.as_deref()).await;
    Ok(())
}

pub async fn upload_image(state: &AppState, file_name: &str, content_type: &str, bytes: Vec<u8>) -> AppResult<UploadedImage> {
    if !content_type.starts_with("image/") {
        return Err(AppError::BadRequest("Only image uploads are allowed".into()));
    }
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }
    Ok(state.images()?.upload(file_name, content_type, bytes).await?)
}

async fn destroy_image(state: &AppState, public_id: Option<&str>) {
    let (Some(public_id), Ok(images)) = (public_id, state.images()) else {
        return;
    };
    if let Err(e) = images.destroy(public_id).await {
        tracing::warn!(error = %e, public_id, "Could not delete banner image");
    }
}
