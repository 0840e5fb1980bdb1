use time::OffsetDateTime;

use crate::application::repos::RepoError;
use crate::domain::entities::{GroupImageRecord, GroupPostRecord, PostSummary, SinglePostRecord};
use crate::domain::types::PostType;

use super::PostgresRepositories;

#[derive(sqlx::FromRow)]
pub(crate) struct SinglePostRow {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) image_path: String,
    pub(crate) thumb_path: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl From<SinglePostRow> for SinglePostRecord {
    fn from(row: SinglePostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            image_path: row.image_path,
            thumb_path: row.thumb_path,
            tags: row.tags,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct GroupPostRow {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl GroupPostRow {
    pub(crate) fn into_record(self, images: Vec<GroupImageRow>) -> GroupPostRecord {
        GroupPostRecord {
            id: self.id,
            title: self.title,
            description: self.description,
            tags: self.tags,
            images: images.into_iter().map(GroupImageRecord::from).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct GroupImageRow {
    pub(crate) position: i32,
    pub(crate) image_path: String,
    pub(crate) thumb_path: Option<String>,
}

impl From<GroupImageRow> for GroupImageRecord {
    fn from(row: GroupImageRow) -> Self {
        Self {
            position: row.position,
            image_path: row.image_path,
            thumb_path: row.thumb_path,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PostSummaryRow {
    pub(crate) id: i64,
    pub(crate) post_type: String,
    pub(crate) title: String,
    pub(crate) thumb_path: Option<String>,
    pub(crate) image_count: i64,
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<PostSummaryRow> for PostSummary {
    type Error = RepoError;

    fn try_from(row: PostSummaryRow) -> Result<Self, Self::Error> {
        let post_type: PostType = row.post_type.parse().map_err(|_| RepoError::Integrity {
            message: format!("unknown post type `{}`", row.post_type),
        })?;
        let image_count = PostgresRepositories::convert_count(row.image_count)?;

        Ok(Self {
            id: row.id,
            post_type,
            title: row.title,
            thumb_path: row.thumb_path,
            image_count: u32::try_from(image_count)
                .map_err(|_| RepoError::from_persistence("image count exceeds supported range"))?,
            tags: row.tags,
            created_at: row.created_at,
            view_count: 0,
        })
    }
}
