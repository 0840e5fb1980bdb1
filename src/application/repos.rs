//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{GroupPostRecord, PostSummary, SinglePostRecord, ThemeRecord};
use crate::domain::types::PostType;
use crate::domain::view_counts::{ViewCountRecord, ViewKey};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Gallery listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostListFilter {
    pub tag: Option<String>,
    pub post_type: Option<PostType>,
    pub offset: u32,
    pub limit: u32,
}

impl PostListFilter {
    /// The unfiltered first page at the configured page size.
    pub fn first_page(page_size: u32) -> Self {
        Self {
            tag: None,
            post_type: None,
            offset: 0,
            limit: page_size,
        }
    }

    /// Whether this is the one listing variant that is cached.
    pub fn is_default(&self, page_size: u32) -> bool {
        self.tag.is_none() && self.post_type.is_none() && self.offset == 0 && self.limit == page_size
    }
}

#[derive(Debug, Clone)]
pub struct CreateSinglePostParams {
    pub title: String,
    pub description: Option<String>,
    pub image_path: String,
    pub thumb_path: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateSinglePostParams {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub thumb_path: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewGroupImage {
    pub image_path: String,
    pub thumb_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateGroupPostParams {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub images: Vec<NewGroupImage>,
}

#[derive(Debug, Clone)]
pub struct UpdateGroupPostParams {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Replaces the whole image list when present.
    pub images: Option<Vec<NewGroupImage>>,
}

#[derive(Debug, Clone)]
pub struct UpdateThemeParams {
    pub name: String,
    pub header_html: String,
    pub footer_html: String,
    pub accent_color: Option<String>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Listing rows newest first; `view_count` is left at zero.
    async fn list_posts(&self, filter: &PostListFilter) -> Result<Vec<PostSummary>, RepoError>;

    async fn find_single(&self, id: i64) -> Result<Option<SinglePostRecord>, RepoError>;

    async fn find_group(&self, id: i64) -> Result<Option<GroupPostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_single(
        &self,
        params: CreateSinglePostParams,
    ) -> Result<SinglePostRecord, RepoError>;

    async fn update_single(
        &self,
        params: UpdateSinglePostParams,
    ) -> Result<SinglePostRecord, RepoError>;

    async fn delete_single(&self, id: i64) -> Result<(), RepoError>;

    async fn create_group(&self, params: CreateGroupPostParams)
    -> Result<GroupPostRecord, RepoError>;

    async fn update_group(&self, params: UpdateGroupPostParams)
    -> Result<GroupPostRecord, RepoError>;

    async fn delete_group(&self, id: i64) -> Result<(), RepoError>;

    /// Insert every post in one transaction; all or nothing.
    async fn bulk_create_singles(
        &self,
        params: Vec<CreateSinglePostParams>,
    ) -> Result<Vec<SinglePostRecord>, RepoError>;
}

#[async_trait]
pub trait ThemesRepo: Send + Sync {
    async fn load_theme(&self) -> Result<Option<ThemeRecord>, RepoError>;

    async fn update_theme(&self, params: UpdateThemeParams) -> Result<ThemeRecord, RepoError>;
}

/// Counters store.
#[async_trait]
pub trait ViewCountsRepo: Send + Sync {
    /// Atomically count a view unless the same visitor was the last one
    /// counted at or after `stale_before` (unix seconds).
    ///
    /// Returns the new count when the view was counted, `None` when it was
    /// suppressed as a duplicate.
    async fn record_view(
        &self,
        key: ViewKey,
        visitor_hash: &str,
        now: i64,
        stale_before: i64,
    ) -> Result<Option<u64>, RepoError>;

    async fn load(&self, key: ViewKey) -> Result<Option<ViewCountRecord>, RepoError>;

    /// Records for the keys that have one; missing keys are omitted.
    async fn load_many(&self, keys: &[ViewKey]) -> Result<Vec<ViewCountRecord>, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_unfiltered_page_is_default() {
        let page = PostListFilter::first_page(24);
        assert!(page.is_default(24));
        assert!(!page.is_default(12));

        let tagged = PostListFilter {
            tag: Some("sea".into()),
            ..page.clone()
        };
        assert!(!tagged.is_default(24));

        let second = PostListFilter {
            offset: 24,
            ..page.clone()
        };
        assert!(!second.is_default(24));

        let groups = PostListFilter {
            post_type: Some(PostType::Group),
            ..page
        };
        assert!(!groups.is_default(24));
    }
}
