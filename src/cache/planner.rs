//! Invalidation plan generation.
//!
//! Maps one cache event to the keys and key families to drop.

use std::collections::BTreeSet;
use std::fmt;

use super::events::EventKind;
use super::keys::{CacheKey, SINGLE_POST_PREFIX};

/// Bulk uploads larger than this drop the whole single-post family.
const BULK_PREFIX_THRESHOLD: usize = 32;

/// Keys and prefixes to invalidate for one event.
///
/// When `all` is set the other fields are empty.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub keys: BTreeSet<CacheKey>,
    pub prefixes: BTreeSet<&'static str>,
    pub all: bool,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ keys: {}, prefixes: {}, all: {} }}",
            self.keys.len(),
            self.prefixes.len(),
            self.all,
        )
    }
}

impl InvalidationPlan {
    pub fn for_event(kind: &EventKind) -> Self {
        let mut plan = Self::default();
        match kind {
            EventKind::SinglePostUpserted { id } | EventKind::SinglePostDeleted { id } => {
                plan.keys.insert(CacheKey::single_post(*id));
                plan.keys.insert(CacheKey::posts_list());
            }
            EventKind::GroupPostUpserted { id } | EventKind::GroupPostDeleted { id } => {
                plan.keys.insert(CacheKey::group_post(*id));
                plan.keys.insert(CacheKey::posts_list());
            }
            EventKind::BulkUploaded { ids } if ids.len() > BULK_PREFIX_THRESHOLD => {
                plan.prefixes.insert(SINGLE_POST_PREFIX);
                plan.keys.insert(CacheKey::posts_list());
            }
            EventKind::BulkUploaded { ids } => {
                plan.keys.extend(ids.iter().map(|id| CacheKey::single_post(*id)));
                plan.keys.insert(CacheKey::posts_list());
            }
            // Theme changes reach every payload that embeds theme data,
            // so the fragments go along with everything else.
            EventKind::ThemeUpdated | EventKind::PurgeAll => {
                plan.all = true;
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_post_edit_drops_detail_and_listing() {
        let plan = InvalidationPlan::for_event(&EventKind::SinglePostUpserted { id: 42 });

        assert!(!plan.all);
        assert_eq!(
            plan.keys,
            BTreeSet::from([CacheKey::posts_list(), CacheKey::single_post(42)])
        );
    }

    #[test]
    fn group_delete_drops_group_detail() {
        let plan = InvalidationPlan::for_event(&EventKind::GroupPostDeleted { id: 5 });
        assert!(plan.keys.contains(&CacheKey::group_post(5)));
        assert!(plan.keys.contains(&CacheKey::posts_list()));
        assert!(!plan.keys.contains(&CacheKey::single_post(5)));
    }

    #[test]
    fn small_bulk_upload_lists_each_key() {
        let plan = InvalidationPlan::for_event(&EventKind::BulkUploaded { ids: vec![1, 2, 3] });
        assert_eq!(plan.keys.len(), 4);
        assert!(plan.prefixes.is_empty());
    }

    #[test]
    fn large_bulk_upload_uses_prefix() {
        let ids: Vec<i64> = (1..=100).collect();
        let plan = InvalidationPlan::for_event(&EventKind::BulkUploaded { ids });
        assert_eq!(plan.prefixes, BTreeSet::from([SINGLE_POST_PREFIX]));
        assert_eq!(plan.keys, BTreeSet::from([CacheKey::posts_list()]));
    }

    #[test]
    fn theme_update_escalates_to_full_purge() {
        let plan = InvalidationPlan::for_event(&EventKind::ThemeUpdated);
        assert!(plan.all);
        assert!(plan.keys.is_empty());
        assert!(plan.prefixes.is_empty());
    }
}
