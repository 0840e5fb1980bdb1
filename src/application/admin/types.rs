use serde::Deserialize;
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

/// Largest number of posts a single bulk upload may create.
pub const MAX_BULK_UPLOAD: usize = 500;

#[derive(Debug, Error)]
pub enum AdminContentError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSinglePostCommand {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image_path: String,
    #[serde(default)]
    pub thumb_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSinglePostCommand {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumb_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupImageInput {
    pub image_path: String,
    #[serde(default)]
    pub thumb_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupPostCommand {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub images: Vec<GroupImageInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateGroupPostCommand {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Omit to keep the current images.
    #[serde(default)]
    pub images: Option<Vec<GroupImageInput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkUploadCommand {
    pub items: Vec<CreateSinglePostCommand>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateThemeCommand {
    pub name: String,
    pub header_html: String,
    pub footer_html: String,
    #[serde(default)]
    pub accent_color: Option<String>,
}
