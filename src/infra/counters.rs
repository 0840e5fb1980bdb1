//! Separate counters store backed by an embedded SQLite file.
//!
//! Used when view counts should not share the content database. The table
//! layout matches the Postgres `view_counts` table and is created on connect.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use tracing::info;

use crate::application::repos::{RepoError, ViewCountsRepo};
use crate::domain::view_counts::{ViewCountRecord, ViewKey};
use crate::infra::db::map_sqlx_error;
use crate::infra::db::view_counts::{ViewCountRow, convert_count};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS view_counts (
    post_id INTEGER NOT NULL,
    post_type TEXT NOT NULL CHECK (post_type IN ('single', 'group')),
    count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
    last_visitor_hash TEXT,
    last_viewed_at INTEGER,
    PRIMARY KEY (post_id, post_type)
)
"#;

#[derive(Clone)]
pub struct SqliteViewCounts {
    pool: SqlitePool,
}

impl SqliteViewCounts {
    /// Open (creating if needed) the counters database at `url` and ensure
    /// the schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Every in-memory connection is its own database, so pin one.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!(
            target = "atelier::infra::counters",
            in_memory, "Counters store ready"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ViewCountsRepo for SqliteViewCounts {
    async fn record_view(
        &self,
        key: ViewKey,
        visitor_hash: &str,
        now: i64,
        stale_before: i64,
    ) -> Result<Option<u64>, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO view_counts (post_id, post_type, count, last_visitor_hash, last_viewed_at)
            VALUES (?1, ?2, 1, ?3, ?4)
            ON CONFLICT (post_id, post_type) DO UPDATE
            SET count = view_counts.count + 1,
                last_visitor_hash = excluded.last_visitor_hash,
                last_viewed_at = excluded.last_viewed_at
            WHERE view_counts.last_visitor_hash IS NOT excluded.last_visitor_hash
               OR view_counts.last_viewed_at IS NULL
               OR view_counts.last_viewed_at < ?5
            RETURNING count
            "#,
        )
        .bind(key.post_id)
        .bind(key.post_type.as_str())
        .bind(visitor_hash)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        count.map(convert_count).transpose()
    }

    async fn load(&self, key: ViewKey) -> Result<Option<ViewCountRecord>, RepoError> {
        let row = sqlx::query_as::<_, ViewCountRow>(
            "SELECT post_id, post_type, count, last_visitor_hash, last_viewed_at \
             FROM view_counts WHERE post_id = ?1 AND post_type = ?2",
        )
        .bind(key.post_id)
        .bind(key.post_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(ViewCountRecord::try_from).transpose()
    }

    async fn load_many(&self, keys: &[ViewKey]) -> Result<Vec<ViewCountRecord>, RepoError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT post_id, post_type, count, last_visitor_hash, last_viewed_at \
             FROM view_counts WHERE (post_id, post_type) IN (VALUES ",
        );
        let mut tuples = qb.separated(", ");
        for key in keys {
            tuples.push("(");
            tuples.push_bind_unseparated(key.post_id);
            tuples.push_unseparated(", ");
            tuples.push_bind_unseparated(key.post_type.as_str());
            tuples.push_unseparated(")");
        }
        qb.push(")");

        let rows = qb
            .build_query_as::<ViewCountRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ViewCountRecord::try_from).collect()
    }
}
