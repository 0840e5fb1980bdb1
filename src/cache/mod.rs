//! Atelier content cache.
//!
//! Flat-file cache for expensive read queries:
//!
//! - **store**: crash-safe temp-file + rename writes under per-file locks
//! - **manager**: keyed raw/JSON entries with read-through filling
//! - **trigger**: invalidation fired by committed writes
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! directory = "data/cache"
//! ```

mod config;
mod events;
mod keys;
mod manager;
mod planner;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use events::EventKind;
pub use keys::{
    CacheKey, CacheKeyError, GROUP_POST_PREFIX, SINGLE_POST_PREFIX, THEME_PREFIX, ThemeFragment,
};
pub use manager::{CacheManager, FillTicket};
pub(crate) use manager::{METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_WRITE_FAILED};
pub use planner::InvalidationPlan;
pub use store::{AtomicFileStore, FileGuard, StoreError};
pub use trigger::CacheTrigger;
pub(crate) use trigger::METRIC_CACHE_INVALIDATE_MS;
