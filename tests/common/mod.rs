//! In-memory content and counter stores shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime, macros::datetime};
use tokio::sync::Mutex;

use atelier::application::repos::{
    CreateGroupPostParams, CreateSinglePostParams, PostListFilter, PostsRepo, PostsWriteRepo,
    RepoError, ThemesRepo, UpdateGroupPostParams, UpdateSinglePostParams, UpdateThemeParams,
    ViewCountsRepo,
};
use atelier::domain::entities::{
    GroupImageRecord, GroupPostRecord, PostSummary, SinglePostRecord, ThemeRecord,
};
use atelier::domain::types::PostType;
use atelier::domain::view_counts::{ViewCountRecord, ViewKey};

const EPOCH: OffsetDateTime = datetime!(2026-01-01 00:00:00 UTC);

#[derive(Default)]
struct ContentState {
    next_id: i64,
    singles: Vec<SinglePostRecord>,
    groups: Vec<GroupPostRecord>,
    theme: Option<ThemeRecord>,
}

impl ContentState {
    fn stamp(&mut self) -> (i64, OffsetDateTime) {
        self.next_id += 1;
        (self.next_id, EPOCH + Duration::seconds(self.next_id))
    }
}

/// Content store that counts how often each read reaches it.
#[derive(Default)]
pub struct MemoryContent {
    state: Mutex<ContentState>,
    pub list_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub group_calls: AtomicUsize,
    pub theme_calls: AtomicUsize,
}

impl MemoryContent {
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub fn theme_calls(&self) -> usize {
        self.theme_calls.load(Ordering::SeqCst)
    }

    pub async fn seed_single(&self, title: &str, tags: &[&str]) -> SinglePostRecord {
        self.create_single(CreateSinglePostParams {
            title: title.to_string(),
            description: None,
            image_path: format!("{}.jpg", title.to_lowercase().replace(' ', "-")),
            thumb_path: None,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        })
        .await
        .expect("seed single")
    }
}

fn summary_of_single(post: &SinglePostRecord) -> PostSummary {
    PostSummary {
        id: post.id,
        post_type: PostType::Single,
        title: post.title.clone(),
        thumb_path: post.thumb_path.clone().or_else(|| Some(post.image_path.clone())),
        image_count: 1,
        tags: post.tags.clone(),
        created_at: post.created_at,
        view_count: 0,
    }
}

fn summary_of_group(post: &GroupPostRecord) -> PostSummary {
    let cover = post.images.first();
    PostSummary {
        id: post.id,
        post_type: PostType::Group,
        title: post.title.clone(),
        thumb_path: cover.map(|image| {
            image
                .thumb_path
                .clone()
                .unwrap_or_else(|| image.image_path.clone())
        }),
        image_count: post.images.len() as u32,
        tags: post.tags.clone(),
        created_at: post.created_at,
        view_count: 0,
    }
}

#[async_trait]
impl PostsRepo for MemoryContent {
    async fn list_posts(&self, filter: &PostListFilter) -> Result<Vec<PostSummary>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;

        let mut items: Vec<PostSummary> = state
            .singles
            .iter()
            .map(summary_of_single)
            .chain(state.groups.iter().map(summary_of_group))
            .filter(|item| filter.post_type.is_none_or(|kind| item.post_type == kind))
            .filter(|item| {
                filter
                    .tag
                    .as_ref()
                    .is_none_or(|tag| item.tags.iter().any(|t| t == tag))
            })
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(items
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn find_single(&self, id: i64) -> Result<Option<SinglePostRecord>, RepoError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Ok(state.singles.iter().find(|post| post.id == id).cloned())
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupPostRecord>, RepoError> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|post| post.id == id).cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryContent {
    async fn create_single(
        &self,
        params: CreateSinglePostParams,
    ) -> Result<SinglePostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let (id, now) = state.stamp();
        let post = SinglePostRecord {
            id,
            title: params.title,
            description: params.description,
            image_path: params.image_path,
            thumb_path: params.thumb_path,
            tags: params.tags,
            created_at: now,
            updated_at: now,
        };
        state.singles.push(post.clone());
        Ok(post)
    }

    async fn update_single(
        &self,
        params: UpdateSinglePostParams,
    ) -> Result<SinglePostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let (_, now) = state.stamp();
        let post = state
            .singles
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.title = params.title;
        post.description = params.description;
        post.thumb_path = params.thumb_path;
        post.tags = params.tags;
        post.updated_at = now;
        Ok(post.clone())
    }

    async fn delete_single(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let before = state.singles.len();
        state.singles.retain(|post| post.id != id);
        if state.singles.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn create_group(
        &self,
        params: CreateGroupPostParams,
    ) -> Result<GroupPostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let (id, now) = state.stamp();
        let post = GroupPostRecord {
            id,
            title: params.title,
            description: params.description,
            tags: params.tags,
            images: params
                .images
                .into_iter()
                .enumerate()
                .map(|(position, image)| GroupImageRecord {
                    position: position as i32,
                    image_path: image.image_path,
                    thumb_path: image.thumb_path,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        };
        state.groups.push(post.clone());
        Ok(post)
    }

    async fn update_group(
        &self,
        params: UpdateGroupPostParams,
    ) -> Result<GroupPostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let (_, now) = state.stamp();
        let post = state
            .groups
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.title = params.title;
        post.description = params.description;
        post.tags = params.tags;
        if let Some(images) = params.images {
            post.images = images
                .into_iter()
                .enumerate()
                .map(|(position, image)| GroupImageRecord {
                    position: position as i32,
                    image_path: image.image_path,
                    thumb_path: image.thumb_path,
                })
                .collect();
        }
        post.updated_at = now;
        Ok(post.clone())
    }

    async fn delete_group(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let before = state.groups.len();
        state.groups.retain(|post| post.id != id);
        if state.groups.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn bulk_create_singles(
        &self,
        params: Vec<CreateSinglePostParams>,
    ) -> Result<Vec<SinglePostRecord>, RepoError> {
        let mut created = Vec::with_capacity(params.len());
        for item in params {
            created.push(self.create_single(item).await?);
        }
        Ok(created)
    }
}

#[async_trait]
impl ThemesRepo for MemoryContent {
    async fn load_theme(&self) -> Result<Option<ThemeRecord>, RepoError> {
        self.theme_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().await.theme.clone())
    }

    async fn update_theme(&self, params: UpdateThemeParams) -> Result<ThemeRecord, RepoError> {
        let mut state = self.state.lock().await;
        let (_, now) = state.stamp();
        let theme = ThemeRecord {
            name: params.name,
            header_html: params.header_html,
            footer_html: params.footer_html,
            accent_color: params.accent_color,
            updated_at: now,
        };
        state.theme = Some(theme.clone());
        Ok(theme)
    }
}

/// Counters kept in a map, with the same dedup rule as the SQL stores.
#[derive(Default)]
pub struct MemoryViewCounts {
    records: Mutex<Vec<ViewCountRecord>>,
}

#[async_trait]
impl ViewCountsRepo for MemoryViewCounts {
    async fn record_view(
        &self,
        key: ViewKey,
        visitor_hash: &str,
        now: i64,
        stale_before: i64,
    ) -> Result<Option<u64>, RepoError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|record| record.key == key) else {
            records.push(ViewCountRecord {
                key,
                count: 1,
                last_visitor_hash: Some(visitor_hash.to_string()),
                last_viewed_at: Some(now),
            });
            return Ok(Some(1));
        };

        let counted = record.last_visitor_hash.as_deref() != Some(visitor_hash)
            || record.last_viewed_at.is_none_or(|last| last < stale_before);
        if !counted {
            return Ok(None);
        }
        record.count += 1;
        record.last_visitor_hash = Some(visitor_hash.to_string());
        record.last_viewed_at = Some(now);
        Ok(Some(record.count))
    }

    async fn load(&self, key: ViewKey) -> Result<Option<ViewCountRecord>, RepoError> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|record| record.key == key).cloned())
    }

    async fn load_many(&self, keys: &[ViewKey]) -> Result<Vec<ViewCountRecord>, RepoError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| keys.contains(&record.key))
            .cloned()
            .collect())
    }
}
