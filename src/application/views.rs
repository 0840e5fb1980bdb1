//! Per-post view counting with per-visitor dedup.
//!
//! Increments never touch the content cache. Detail pages read the live count
//! from here; the cached listing carries whatever count it was built with.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::Duration;
use tracing::{debug, warn};

use crate::application::repos::{RepoError, ViewCountsRepo};
use crate::application::visitor::VisitorId;
use crate::domain::types::PostType;
use crate::domain::view_counts::ViewKey;
use crate::util::clock::Clock;

pub(crate) const METRIC_VIEW_INCREMENT: &str = "atelier_view_increment_total";

#[derive(Debug, Error)]
pub enum ViewCountError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct ViewCounter {
    repo: Arc<dyn ViewCountsRepo>,
    clock: Arc<dyn Clock>,
    dedup_window: Duration,
}

impl ViewCounter {
    pub fn new(repo: Arc<dyn ViewCountsRepo>, clock: Arc<dyn Clock>, dedup_window: Duration) -> Self {
        Self {
            repo,
            clock,
            dedup_window,
        }
    }

    /// Configured dedup window.
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Count one view of `(post_id, post_type)` by `visitor`.
    ///
    /// Returns `false` when the same visitor was the last one counted less
    /// than `window` ago.
    pub async fn increment(
        &self,
        post_id: i64,
        post_type: PostType,
        visitor: &VisitorId,
        window: Duration,
    ) -> Result<bool, ViewCountError> {
        let key = ViewKey::new(post_id, post_type);
        let now = self.clock.now().unix_timestamp();
        // A zero window disables dedup: every earlier view counts as stale.
        let stale_before = if window.is_positive() {
            now.saturating_sub(window.whole_seconds())
        } else {
            i64::MAX
        };
        let visitor_hash = visitor.hash();

        match self
            .repo
            .record_view(key, &visitor_hash, now, stale_before)
            .await
        {
            Ok(Some(count)) => {
                counter!(METRIC_VIEW_INCREMENT, "result" => "counted").increment(1);
                debug!(post_id, post_type = %post_type, count, "View counted");
                Ok(true)
            }
            Ok(None) => {
                counter!(METRIC_VIEW_INCREMENT, "result" => "deduplicated").increment(1);
                debug!(post_id, post_type = %post_type, "Duplicate view suppressed");
                Ok(false)
            }
            Err(err) => {
                counter!(METRIC_VIEW_INCREMENT, "result" => "failed").increment(1);
                warn!(
                    target = "atelier::application::views",
                    op = "increment",
                    post_id,
                    post_type = %post_type,
                    error = %err,
                    "View counter update failed"
                );
                Err(err.into())
            }
        }
    }

    /// Live count for one post; zero when never viewed.
    pub async fn count(&self, key: ViewKey) -> Result<u64, ViewCountError> {
        let record = self.repo.load(key).await?;
        Ok(record.map(|record| record.count).unwrap_or(0))
    }

    /// Live counts for many posts. Keys never viewed are absent from the map.
    pub async fn counts(&self, keys: &[ViewKey]) -> Result<HashMap<ViewKey, u64>, ViewCountError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let records = self.repo.load_many(keys).await?;
        Ok(records
            .into_iter()
            .map(|record| (record.key, record.count))
            .collect())
    }
}
