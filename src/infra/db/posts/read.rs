use async_trait::async_trait;
use sqlx::{Executor, Postgres, QueryBuilder};

use crate::application::repos::{PostListFilter, PostsRepo, RepoError};
use crate::domain::entities::{GroupPostRecord, PostSummary, SinglePostRecord};
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;
use super::types::{GroupImageRow, GroupPostRow, PostSummaryRow, SinglePostRow};

/// Both post kinds flattened into listing rows. Group thumbnails come from
/// the first image.
const LISTING_SOURCE: &str = "SELECT * FROM ( \
        SELECT s.id, 'single'::text AS post_type, s.title, \
               COALESCE(s.thumb_path, s.image_path) AS thumb_path, \
               1::bigint AS image_count, s.tags, s.created_at \
        FROM posts_single s \
        UNION ALL \
        SELECT g.id, 'group'::text AS post_type, g.title, \
               (SELECT COALESCE(gi.thumb_path, gi.image_path) FROM group_images gi \
                WHERE gi.group_id = g.id ORDER BY gi.position ASC LIMIT 1) AS thumb_path, \
               (SELECT COUNT(*) FROM group_images gi WHERE gi.group_id = g.id) AS image_count, \
               g.tags, g.created_at \
        FROM posts_group g \
    ) p WHERE 1=1 ";

pub(super) async fn fetch_group_images<'e, E>(
    executor: E,
    group_id: i64,
) -> Result<Vec<GroupImageRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, GroupImageRow>(
        "SELECT position, image_path, thumb_path FROM group_images \
         WHERE group_id = $1 ORDER BY position ASC",
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(&self, filter: &PostListFilter) -> Result<Vec<PostSummary>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(LISTING_SOURCE);

        if let Some(post_type) = filter.post_type {
            qb.push(" AND p.post_type = ");
            qb.push_bind(post_type.as_str());
        }

        if let Some(tag) = filter.tag.as_ref() {
            qb.push(" AND ");
            qb.push_bind(tag.clone());
            qb.push(" = ANY(p.tags)");
        }

        qb.push(" ORDER BY p.created_at DESC, p.post_type ASC, p.id DESC");
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(filter.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(filter.offset));

        let rows = qb
            .build_query_as::<PostSummaryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(PostSummary::try_from).collect()
    }

    async fn find_single(&self, id: i64) -> Result<Option<SinglePostRecord>, RepoError> {
        let row = sqlx::query_as::<_, SinglePostRow>(
            "SELECT id, title, description, image_path, thumb_path, tags, created_at, updated_at \
             FROM posts_single WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SinglePostRecord::from))
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupPostRecord>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let Some(row) = sqlx::query_as::<_, GroupPostRow>(
            "SELECT id, title, description, tags, created_at, updated_at \
             FROM posts_group WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?
        else {
            return Ok(None);
        };

        let images = fetch_group_images(tx.as_mut(), id)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(row.into_record(images)))
    }
}
