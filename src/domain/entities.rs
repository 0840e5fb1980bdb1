//! Domain entities mirrored from persistent storage.
//!
//! These records double as cache payloads, so they round-trip through JSON.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::PostType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePostRecord {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image_path: String,
    pub thumb_path: Option<String>,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupImageRecord {
    pub position: i32,
    pub image_path: String,
    pub thumb_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPostRecord {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Ordered by `position`.
    pub images: Vec<GroupImageRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeRecord {
    pub name: String,
    pub header_html: String,
    pub footer_html: String,
    pub accent_color: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One row of the gallery listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: i64,
    pub post_type: PostType,
    pub title: String,
    pub thumb_path: Option<String>,
    pub image_count: u32,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Count at the time the listing was generated; may lag on cached pages.
    pub view_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostListing {
    pub items: Vec<PostSummary>,
    pub offset: u32,
    pub limit: u32,
}
