//! Per-post view counter records.

use serde::{Deserialize, Serialize};

use crate::domain::types::PostType;

/// Identity of one counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewKey {
    pub post_id: i64,
    pub post_type: PostType,
}

impl ViewKey {
    pub fn new(post_id: i64, post_type: PostType) -> Self {
        Self { post_id, post_type }
    }

    pub fn single(post_id: i64) -> Self {
        Self::new(post_id, PostType::Single)
    }

    pub fn group(post_id: i64) -> Self {
        Self::new(post_id, PostType::Group)
    }
}

/// Stored state of one counter.
///
/// `count` only ever grows. `last_visitor_hash` and `last_viewed_at` describe
/// the most recent accepted increment and drive per-visitor dedup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCountRecord {
    pub key: ViewKey,
    pub count: u64,
    pub last_visitor_hash: Option<String>,
    /// Unix seconds.
    pub last_viewed_at: Option<i64>,
}

impl ViewCountRecord {
    /// Whether a view by `visitor_hash` at `now` would be counted under
    /// `window_secs` of dedup.
    pub fn accepts(&self, visitor_hash: &str, now: i64, window_secs: i64) -> bool {
        let same_visitor = self.last_visitor_hash.as_deref() == Some(visitor_hash);
        match self.last_viewed_at {
            None => true,
            Some(_) if !same_visitor || window_secs <= 0 => true,
            Some(last) => last < now - window_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: Option<&str>, at: Option<i64>) -> ViewCountRecord {
        ViewCountRecord {
            key: ViewKey::single(1),
            count: 4,
            last_visitor_hash: hash.map(str::to_string),
            last_viewed_at: at,
        }
    }

    #[test]
    fn fresh_record_accepts_anyone() {
        assert!(record(None, None).accepts("abc", 100, 3600));
    }

    #[test]
    fn same_visitor_inside_window_is_rejected() {
        let rec = record(Some("abc"), Some(1_000));
        assert!(!rec.accepts("abc", 1_000 + 3_599, 3_600));
        assert!(!rec.accepts("abc", 1_000 + 3_600, 3_600));
        assert!(rec.accepts("abc", 1_000 + 3_601, 3_600));
    }

    #[test]
    fn different_visitor_is_always_counted() {
        let rec = record(Some("abc"), Some(1_000));
        assert!(rec.accepts("def", 1_001, 3_600));
    }
}
