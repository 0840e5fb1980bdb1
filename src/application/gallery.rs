//! Public gallery reads.
//!
//! Listing and detail payloads go through the content cache. Only the
//! unfiltered first page of the listing is cached; any other listing query
//! reaches the content store directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::application::repos::{PostListFilter, PostsRepo, RepoError};
use crate::application::views::ViewCounter;
use crate::cache::{CacheKey, CacheManager};
use crate::domain::entities::{GroupPostRecord, PostListing, PostSummary, SinglePostRecord};
use crate::domain::view_counts::ViewKey;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Detail payload with the live view count.
///
/// `view_count` is `None` when the counters store could not be reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetail<T> {
    #[serde(flatten)]
    pub post: T,
    pub view_count: Option<u64>,
}

#[derive(Clone)]
pub struct GalleryService {
    posts: Arc<dyn PostsRepo>,
    views: ViewCounter,
    cache: CacheManager,
    page_size: u32,
}

impl GalleryService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        views: ViewCounter,
        cache: CacheManager,
        page_size: u32,
    ) -> Self {
        Self {
            posts,
            views,
            cache,
            page_size,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn list(&self, filter: &PostListFilter) -> Result<PostListing, GalleryError> {
        if !filter.is_default(self.page_size) {
            return self.load_listing(filter).await;
        }

        let listing = self
            .cache
            .read_through_json(&CacheKey::posts_list(), || async {
                self.load_listing(filter).await.map(Some)
            })
            .await?;
        Ok(listing.unwrap_or_else(|| PostListing {
            items: Vec::new(),
            offset: filter.offset,
            limit: filter.limit,
        }))
    }

    pub async fn single(
        &self,
        id: i64,
    ) -> Result<Option<PostDetail<SinglePostRecord>>, GalleryError> {
        let post = self
            .cache
            .read_through_json(&CacheKey::single_post(id), || self.posts.find_single(id))
            .await?;
        let Some(post) = post else {
            return Ok(None);
        };
        let view_count = self.live_count(ViewKey::single(id)).await;
        Ok(Some(PostDetail { post, view_count }))
    }

    pub async fn group(&self, id: i64) -> Result<Option<PostDetail<GroupPostRecord>>, GalleryError> {
        let post = self
            .cache
            .read_through_json(&CacheKey::group_post(id), || self.posts.find_group(id))
            .await?;
        let Some(post) = post else {
            return Ok(None);
        };
        let view_count = self.live_count(ViewKey::group(id)).await;
        Ok(Some(PostDetail { post, view_count }))
    }

    async fn load_listing(&self, filter: &PostListFilter) -> Result<PostListing, GalleryError> {
        let mut items = self.posts.list_posts(filter).await?;
        self.attach_counts(&mut items).await;
        Ok(PostListing {
            items,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    async fn attach_counts(&self, items: &mut [PostSummary]) {
        let keys: Vec<ViewKey> = items
            .iter()
            .map(|item| ViewKey::new(item.id, item.post_type))
            .collect();
        match self.views.counts(&keys).await {
            Ok(counts) => {
                for item in items.iter_mut() {
                    let key = ViewKey::new(item.id, item.post_type);
                    item.view_count = counts.get(&key).copied().unwrap_or(0);
                }
            }
            Err(err) => warn!(
                target = "atelier::application::gallery",
                op = "attach_counts",
                error = %err,
                "Listing built without view counts"
            ),
        }
    }

    async fn live_count(&self, key: ViewKey) -> Option<u64> {
        match self.views.count(key).await {
            Ok(count) => Some(count),
            Err(err) => {
                warn!(
                    target = "atelier::application::gallery",
                    op = "live_count",
                    post_id = key.post_id,
                    post_type = %key.post_type,
                    error = %err,
                    "View count unavailable"
                );
                None
            }
        }
    }
}
