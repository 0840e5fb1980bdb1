//! Cache trigger service.
//!
//! Write paths call into `CacheTrigger` after their transaction committed.
//! The trigger plans and applies the invalidation before returning, so the
//! next reader regenerates from the committed state.

use std::time::Instant;

use metrics::histogram;
use tracing::{debug, info};

use super::events::EventKind;
use super::manager::CacheManager;
use super::planner::InvalidationPlan;

pub(crate) const METRIC_CACHE_INVALIDATE_MS: &str = "atelier_cache_invalidate_ms";

/// Cache trigger for invalidating entries after committed writes.
///
/// # Usage
///
/// ```ignore
/// // After a successful post update:
/// trigger.single_post_upserted(post.id);
/// ```
#[derive(Debug, Clone)]
pub struct CacheTrigger {
    cache: CacheManager,
}

impl CacheTrigger {
    pub fn new(cache: CacheManager) -> Self {
        Self { cache }
    }

    /// Plan and apply the invalidation for one event.
    ///
    /// Returns the number of entries removed.
    pub fn trigger(&self, kind: EventKind) -> usize {
        if !self.cache.is_enabled() {
            debug!(event_kind = kind.label(), "Cache trigger skipped: cache disabled");
            return 0;
        }

        let started_at = Instant::now();
        let plan = InvalidationPlan::for_event(&kind);
        let removed = self.apply(&plan);
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CACHE_INVALIDATE_MS).record(elapsed_ms);

        info!(
            event_kind = kind.label(),
            plan = %plan,
            removed,
            elapsed_ms,
            "Cache invalidated"
        );
        removed
    }

    fn apply(&self, plan: &InvalidationPlan) -> usize {
        if plan.all {
            return self.cache.invalidate_all();
        }
        let by_key = plan
            .keys
            .iter()
            .filter(|key| self.cache.invalidate(key))
            .count();
        let by_prefix: usize = plan
            .prefixes
            .iter()
            .map(|prefix| self.cache.invalidate_by_prefix(prefix))
            .sum();
        by_key + by_prefix
    }

    pub fn single_post_upserted(&self, id: i64) -> usize {
        self.trigger(EventKind::SinglePostUpserted { id })
    }

    pub fn single_post_deleted(&self, id: i64) -> usize {
        self.trigger(EventKind::SinglePostDeleted { id })
    }

    pub fn group_post_upserted(&self, id: i64) -> usize {
        self.trigger(EventKind::GroupPostUpserted { id })
    }

    pub fn group_post_deleted(&self, id: i64) -> usize {
        self.trigger(EventKind::GroupPostDeleted { id })
    }

    pub fn bulk_uploaded(&self, ids: Vec<i64>) -> usize {
        self.trigger(EventKind::BulkUploaded { ids })
    }

    pub fn theme_updated(&self) -> usize {
        self.trigger(EventKind::ThemeUpdated)
    }

    pub fn purge_all(&self) -> usize {
        self.trigger(EventKind::PurgeAll)
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }
}
