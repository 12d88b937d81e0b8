//! Catalog structure and storefront content: categories, announcements, banners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::slugify;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: &str, description: Option<String>, image_url: Option<String>, position: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.trim().to_string(), slug: slugify(name), description, image_url, position,
            created_at: now, updated_at: now,
        }
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.slug = slugify(name);
        self.updated_at = Utc::now();
    }
}

/// A line of text in the site-wide announcement bar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Announcement {
    pub id: Uuid,
    pub message: String,
    pub link: Option<String>,
    pub active: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Announcement {
    pub fn new(message: &str, link: Option<String>, active: bool, position: i32) -> Self {
        Self { id: Uuid::now_v7(), message: message.trim().to_string(), link, active, position, created_at: Utc::now() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerKind { Carousel, Promo }

impl BannerKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Carousel => "carousel", Self::Promo => "promo" }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Banner {
    pub id: Uuid,
    pub kind: BannerKind,
    pub title: Option<String>,
    pub image_url: String,
    /// Image host id, so the image can be removed along with the banner.
    pub public_id: Option<String>,
    pub link: Option<String>,
    pub active: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Banner {
    pub fn new(kind: BannerKind, image_url: String, public_id: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(), kind, title: None, image_url, public_id, link: None, active: true, position: 0,
            created_at: Utc::now(),
        }
    }
}
