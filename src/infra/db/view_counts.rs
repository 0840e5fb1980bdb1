use async_trait::async_trait;

use crate::application::repos::{RepoError, ViewCountsRepo};
use crate::domain::view_counts::{ViewCountRecord, ViewKey};

use super::{PostgresRepositories, map_sqlx_error};

/// Counter row shared by the Postgres and SQLite counters stores.
#[derive(sqlx::FromRow)]
pub(crate) struct ViewCountRow {
    pub(crate) post_id: i64,
    pub(crate) post_type: String,
    pub(crate) count: i64,
    pub(crate) last_visitor_hash: Option<String>,
    pub(crate) last_viewed_at: Option<i64>,
}

impl TryFrom<ViewCountRow> for ViewCountRecord {
    type Error = RepoError;

    fn try_from(row: ViewCountRow) -> Result<Self, Self::Error> {
        let post_type = row.post_type.parse().map_err(|_| RepoError::Integrity {
            message: format!("unknown post type `{}`", row.post_type),
        })?;

        Ok(Self {
            key: ViewKey::new(row.post_id, post_type),
            count: PostgresRepositories::convert_count(row.count)?,
            last_visitor_hash: row.last_visitor_hash,
            last_viewed_at: row.last_viewed_at,
        })
    }
}

pub(crate) fn convert_count(value: i64) -> Result<u64, RepoError> {
    PostgresRepositories::convert_count(value)
}

#[async_trait]
impl ViewCountsRepo for PostgresRepositories {
    async fn record_view(
        &self,
        key: ViewKey,
        visitor_hash: &str,
        now: i64,
        stale_before: i64,
    ) -> Result<Option<u64>, RepoError> {
        // The conflict branch only fires when the guard holds, so a suppressed
        // duplicate returns no row.
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO view_counts (post_id, post_type, count, last_visitor_hash, last_viewed_at)
            VALUES ($1, $2, 1, $3, $4)
            ON CONFLICT (post_id, post_type) DO UPDATE
            SET count = view_counts.count + 1,
                last_visitor_hash = excluded.last_visitor_hash,
                last_viewed_at = excluded.last_viewed_at
            WHERE view_counts.last_visitor_hash IS DISTINCT FROM excluded.last_visitor_hash
               OR view_counts.last_viewed_at IS NULL
               OR view_counts.last_viewed_at < $5
            RETURNING count
            "#,
        )
        .bind(key.post_id)
        .bind(key.post_type.as_str())
        .bind(visitor_hash)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        count.map(convert_count).transpose()
    }

    async fn load(&self, key: ViewKey) -> Result<Option<ViewCountRecord>, RepoError> {
        let row = sqlx::query_as::<_, ViewCountRow>(
            "SELECT post_id, post_type, count, last_visitor_hash, last_viewed_at \
             FROM view_counts WHERE post_id = $1 AND post_type = $2",
        )
        .bind(key.post_id)
        .bind(key.post_type.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ViewCountRecord::try_from).transpose()
    }

    async fn load_many(&self, keys: &[ViewKey]) -> Result<Vec<ViewCountRecord>, RepoError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = keys.iter().map(|key| key.post_id).collect();
        let types: Vec<String> = keys
            .iter()
            .map(|key| key.post_type.as_str().to_string())
            .collect();

        let rows = sqlx::query_as::<_, ViewCountRow>(
            "SELECT vc.post_id, vc.post_type, vc.count, vc.last_visitor_hash, vc.last_viewed_at \
             FROM view_counts vc \
             JOIN UNNEST($1::bigint[], $2::text[]) AS k(post_id, post_type) \
               ON vc.post_id = k.post_id AND vc.post_type = k.post_type",
        )
        .bind(ids)
        .bind(types)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ViewCountRecord::try_from).collect()
    }
}
