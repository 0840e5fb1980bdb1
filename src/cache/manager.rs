//! Keyed content cache over [`AtomicFileStore`].
//!
//! Entries never expire on their own: an entry exists until a write path
//! invalidates it. Storage failures are logged and reported as misses or as
//! `false`, never surfaced to callers.

use std::future::Future;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::store::{AtomicFileStore, StoreError};

const ENTRY_SUFFIX: &str = ".cache";
/// Cache-wide invalidation counter. It carries no `.cache` suffix, so it never
/// parses as an entry.
const GENERATION_MARKER: &str = "generation";

pub(crate) const METRIC_CACHE_HIT: &str = "atelier_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "atelier_cache_miss_total";
pub(crate) const METRIC_CACHE_WRITE_FAILED: &str = "atelier_cache_write_failed_total";

/// Proof that a reader observed the cache at a given invalidation generation.
///
/// Take the ticket before querying the content store; [`CacheManager::fill`]
/// refuses to commit if any invalidation ran in between. Taking a ticket
/// touches no files, so misses on absent content leave nothing behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillTicket {
    key: CacheKey,
    generation: u64,
}

impl FillTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

#[derive(Debug, Clone)]
pub struct CacheManager {
    store: Option<AtomicFileStore>,
}

impl CacheManager {
    /// Build a manager from configuration, creating the cache directory.
    pub fn new(config: &CacheConfig) -> Result<Self, StoreError> {
        if !config.is_enabled() {
            return Ok(Self::disabled());
        }
        let store = AtomicFileStore::open(&config.directory)?;
        Ok(Self { store: Some(store) })
    }

    /// A manager that always misses and never writes.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn has(&self, key: &CacheKey) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.exists(&entry_name(key)) {
            Ok(exists) => exists,
            Err(err) => {
                log_store_error("has", key, &err);
                false
            }
        }
    }

    /// Raw entry bytes, or `None` on a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let store = self.store.as_ref()?;
        let outcome = match store.read(&entry_name(key)) {
            Ok(value) => value,
            Err(err) => {
                log_store_error("get", key, &err);
                None
            }
        };
        record_lookup(key, outcome.is_some());
        outcome
    }

    /// Decoded entry. Undecodable payloads are dropped and reported as a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target = "atelier::cache::manager",
                    op = "get_json",
                    cache_key = %key,
                    error = %err,
                    "Dropping corrupt cache entry"
                );
                self.discard_if_unchanged(key, &bytes);
                None
            }
        }
    }

    /// Replace an entry. Returns `false` if the write did not happen; the
    /// previous value, if any, is then still in place.
    pub fn set(&self, key: &CacheKey, value: &[u8]) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.write(&entry_name(key), value) {
            Ok(()) => {
                debug!(cache_key = %key, bytes = value.len(), "Cache entry written");
                true
            }
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_FAILED).increment(1);
                log_store_error("set", key, &err);
                false
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T) -> bool {
        match serde_json::to_vec(value) {
            Ok(encoded) => self.set(key, &encoded),
            Err(err) => {
                warn!(
                    target = "atelier::cache::manager",
                    op = "set_json",
                    cache_key = %key,
                    error = %err,
                    "Failed to encode cache payload"
                );
                false
            }
        }
    }

    /// Record the current cache generation ahead of a content-store read of `key`.
    pub fn ticket(&self, key: &CacheKey) -> Option<FillTicket> {
        let store = self.store.as_ref()?;
        match store.generation(GENERATION_MARKER) {
            Ok(generation) => Some(FillTicket {
                key: key.clone(),
                generation,
            }),
            Err(err) => {
                log_store_error("ticket", key, &err);
                None
            }
        }
    }

    /// Commit a freshly loaded value unless the key was invalidated after
    /// `ticket` was issued.
    pub fn fill(&self, ticket: &FillTicket, value: &[u8]) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let key = &ticket.key;
        let result = store.lock(&entry_name(key)).and_then(|guard| {
            if store.generation(GENERATION_MARKER)? != ticket.generation {
                guard.release_if_vacant()?;
                return Ok(false);
            }
            guard.replace(value).map(|_| true)
        });

        match result {
            Ok(true) => true,
            Ok(false) => {
                debug!(
                    cache_key = %key,
                    ticket_generation = ticket.generation,
                    "Skipped stale cache fill"
                );
                false
            }
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_FAILED).increment(1);
                log_store_error("fill", key, &err);
                false
            }
        }
    }

    pub fn fill_json<T: Serialize>(&self, ticket: &FillTicket, value: &T) -> bool {
        match serde_json::to_vec(value) {
            Ok(encoded) => self.fill(ticket, &encoded),
            Err(err) => {
                warn!(
                    target = "atelier::cache::manager",
                    op = "fill_json",
                    cache_key = %ticket.key,
                    error = %err,
                    "Failed to encode cache payload"
                );
                false
            }
        }
    }

    /// Serve `key` from cache, or load it and write it back.
    ///
    /// `load` returning `Ok(None)` is not cached. Loader errors pass through.
    pub async fn read_through_json<T, E, F, Fut>(&self, key: &CacheKey, load: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.get_json(key) {
            return Ok(Some(hit));
        }
        let ticket = self.ticket(key);
        let loaded = load().await?;
        if let (Some(ticket), Some(value)) = (ticket.as_ref(), loaded.as_ref()) {
            self.fill_json(ticket, value);
        }
        Ok(loaded)
    }

    /// Raw-bytes counterpart of [`CacheManager::read_through_json`].
    pub async fn read_through<E, F, Fut>(&self, key: &CacheKey, load: F) -> Result<Option<Bytes>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Bytes>, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(Some(hit));
        }
        let ticket = self.ticket(key);
        let loaded = load().await?;
        if let (Some(ticket), Some(value)) = (ticket.as_ref(), loaded.as_ref()) {
            self.fill(ticket, value);
        }
        Ok(loaded)
    }

    /// Drop one entry. Returns whether an entry was removed; a missing key is
    /// a no-op apart from advancing the generation.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        self.bump_generation(store);
        self.remove_entry(store, key)
    }

    fn remove_entry(&self, store: &AtomicFileStore, key: &CacheKey) -> bool {
        match store.lock(&entry_name(key)).and_then(|guard| guard.remove()) {
            Ok(removed) => {
                debug!(cache_key = %key, removed, "Cache key invalidated");
                removed
            }
            Err(err) => {
                log_store_error("invalidate", key, &err);
                false
            }
        }
    }

    /// Drop every entry. Returns the number of entries removed.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_matching("invalidate_all", |_| true)
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        self.invalidate_matching("invalidate_by_prefix", |key| key.has_prefix(prefix))
    }

    fn invalidate_matching(&self, op: &'static str, matches: impl Fn(&CacheKey) -> bool) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        // In-flight fills without an entry yet are stopped by the bump.
        self.bump_generation(store);
        let names = match store.list() {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    target = "atelier::cache::manager",
                    op,
                    error = %err,
                    "Failed to enumerate cache entries"
                );
                return 0;
            }
        };

        let removed = names
            .iter()
            .filter_map(|name| name.strip_suffix(ENTRY_SUFFIX))
            .filter_map(|raw| CacheKey::parse(raw).ok())
            .filter(|key| matches(key))
            .filter(|key| self.remove_entry(store, key))
            .count();

        if let Err(err) = store.prune_orphan_locks() {
            warn!(
                target = "atelier::cache::manager",
                op,
                error = %err,
                "Failed to prune cache lock files"
            );
        }
        removed
    }

    fn bump_generation(&self, store: &AtomicFileStore) {
        let result = store
            .lock(GENERATION_MARKER)
            .and_then(|guard| guard.bump_generation());
        if let Err(err) = result {
            warn!(
                target = "atelier::cache::manager",
                op = "bump_generation",
                error = %err,
                "Failed to advance cache generation"
            );
        }
    }

    fn discard_if_unchanged(&self, key: &CacheKey, observed: &[u8]) {
        let Some(store) = &self.store else {
            return;
        };
        let result = store.lock(&entry_name(key)).and_then(|guard| {
            let unchanged = guard
                .read()?
                .is_some_and(|current| current.as_ref() == observed);
            if unchanged {
                guard.remove()?;
            }
            Ok(())
        });
        if let Err(err) = result {
            log_store_error("discard", key, &err);
        }
    }
}

fn entry_name(key: &CacheKey) -> String {
    format!("{key}{ENTRY_SUFFIX}")
}

fn record_lookup(key: &CacheKey, hit: bool) {
    if hit {
        counter!(METRIC_CACHE_HIT).increment(1);
        debug!(cache_key = %key, result = "hit", "Cache lookup");
    } else {
        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(cache_key = %key, result = "miss", "Cache lookup");
    }
}

fn log_store_error(op: &'static str, key: &CacheKey, err: &StoreError) {
    warn!(
        target = "atelier::cache::manager",
        op,
        cache_key = %key,
        error = %err,
        "Cache storage operation failed"
    );
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;
    use crate::cache::keys::{SINGLE_POST_PREFIX, ThemeFragment};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        title: String,
        views: u64,
    }

    fn manager() -> (TempDir, CacheManager) {
        let dir = TempDir::new().expect("temp dir");
        let config = CacheConfig {
            enabled: true,
            directory: dir.path().join("cache"),
        };
        let manager = CacheManager::new(&config).expect("cache manager");
        (dir, manager)
    }

    #[test]
    fn set_then_get_returns_same_bytes() {
        let (_dir, cache) = manager();
        let key = CacheKey::theme_fragment(ThemeFragment::Header);

        assert!(cache.set(&key, b"<header>hi</header>"));

        assert!(cache.has(&key));
        assert_eq!(
            cache.get(&key).expect("hit").as_ref(),
            b"<header>hi</header>"
        );
    }

    #[test]
    fn json_round_trip_and_invalidate() {
        let (_dir, cache) = manager();
        let key = CacheKey::single_post(4);
        let payload = Payload {
            title: "Dunes".into(),
            views: 3,
        };

        assert!(cache.set_json(&key, &payload));
        assert_eq!(cache.get_json::<Payload>(&key), Some(payload));

        assert!(cache.invalidate(&key));
        assert!(!cache.has(&key));
        assert_eq!(cache.get_json::<Payload>(&key), None);
    }

    #[test]
    fn invalidating_missing_key_is_a_no_op() {
        let (_dir, cache) = manager();
        assert!(!cache.invalidate(&CacheKey::group_post(99)));
    }

    #[test]
    fn corrupt_json_is_a_miss_and_is_removed() {
        let (_dir, cache) = manager();
        let key = CacheKey::posts_list();
        assert!(cache.set(&key, b"{not json"));

        assert_eq!(cache.get_json::<Payload>(&key), None);
        assert!(!cache.has(&key));
    }

    #[test]
    fn prefix_invalidation_only_touches_its_family() {
        let (_dir, cache) = manager();
        for key in [
            CacheKey::single_post(1),
            CacheKey::single_post(2),
            CacheKey::group_post(1),
            CacheKey::posts_list(),
        ] {
            assert!(cache.set(&key, b"x"));
        }

        assert_eq!(cache.invalidate_by_prefix(SINGLE_POST_PREFIX), 2);

        assert!(!cache.has(&CacheKey::single_post(1)));
        assert!(!cache.has(&CacheKey::single_post(2)));
        assert!(cache.has(&CacheKey::group_post(1)));
        assert!(cache.has(&CacheKey::posts_list()));
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let (_dir, cache) = manager();
        cache.set(&CacheKey::posts_list(), b"a");
        cache.set(&CacheKey::group_post(5), b"b");

        assert_eq!(cache.invalidate_all(), 2);
        assert!(!cache.has(&CacheKey::posts_list()));
        assert!(!cache.has(&CacheKey::group_post(5)));
    }

    #[test]
    fn fill_after_invalidation_is_rejected() {
        let (_dir, cache) = manager();
        let key = CacheKey::posts_list();

        let ticket = cache.ticket(&key).expect("ticket");
        cache.invalidate(&key);

        assert!(!cache.fill(&ticket, b"stale"));
        assert!(!cache.has(&key));

        let fresh = cache.ticket(&key).expect("ticket");
        assert!(cache.fill(&fresh, b"fresh"));
        assert_eq!(cache.get(&key).expect("hit").as_ref(), b"fresh");
    }

    #[test]
    fn invalidate_all_covers_in_flight_fills_without_entries() {
        let (_dir, cache) = manager();
        let key = CacheKey::group_post(8);

        let ticket = cache.ticket(&key).expect("ticket");
        assert_eq!(cache.invalidate_all(), 0);

        assert!(!cache.fill(&ticket, b"stale"));
    }

    #[test]
    fn any_invalidation_rejects_pending_fills() {
        let (_dir, cache) = manager();
        let ticket = cache.ticket(&CacheKey::single_post(1)).expect("ticket");

        cache.invalidate(&CacheKey::group_post(2));

        assert!(!cache.fill(&ticket, b"maybe stale"));
        assert!(!cache.has(&CacheKey::single_post(1)));
    }

    fn cache_files(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir.path().join("cache"))
            .expect("read cache dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn misses_on_absent_content_leave_no_files() {
        let (dir, cache) = manager();

        for id in 0..500 {
            let value: Option<Payload> = cache
                .read_through_json(&CacheKey::single_post(id), || async {
                    Ok::<_, Infallible>(None)
                })
                .await
                .expect("infallible");
            assert!(value.is_none());
        }
        assert!(cache_files(&dir).is_empty(), "left {:?}", cache_files(&dir));

        assert!(cache.set(&CacheKey::posts_list(), b"[]"));
        assert!(!cache.invalidate(&CacheKey::single_post(7)));
        assert_eq!(cache.invalidate_all(), 1);
        assert_eq!(cache_files(&dir), vec!["generation", "generation.lock"]);
    }

    #[test]
    fn disabled_cache_always_misses() {
        let cache = CacheManager::disabled();
        let key = CacheKey::posts_list();

        assert!(!cache.set(&key, b"x"));
        assert!(!cache.has(&key));
        assert!(cache.get(&key).is_none());
        assert!(cache.ticket(&key).is_none());
        assert_eq!(cache.invalidate_all(), 0);
    }

    #[tokio::test]
    async fn read_through_loads_once_and_skips_absent_values() {
        let (_dir, cache) = manager();
        let key = CacheKey::single_post(11);
        let mut calls = 0;

        for _ in 0..3 {
            let value = cache
                .read_through_json(&key, || {
                    calls += 1;
                    async {
                        Ok::<_, Infallible>(Some(Payload {
                            title: "Tide".into(),
                            views: 0,
                        }))
                    }
                })
                .await
                .expect("infallible");
            assert_eq!(value.expect("present").title, "Tide");
        }
        assert_eq!(calls, 1);

        let absent = CacheKey::single_post(12);
        let value: Option<Payload> = cache
            .read_through_json(&absent, || async { Ok::<_, Infallible>(None) })
            .await
            .expect("infallible");
        assert!(value.is_none());
        assert!(!cache.has(&absent));
    }
}
