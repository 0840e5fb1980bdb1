//! Cache events.
//!
//! Every committed content mutation is described by one `EventKind`, planned
//! into invalidations and applied immediately; nothing is queued.

/// Types of cache events that trigger invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A single post was created or edited.
    SinglePostUpserted { id: i64 },
    SinglePostDeleted { id: i64 },
    /// A group post (or its image list) was created or edited.
    GroupPostUpserted { id: i64 },
    GroupPostDeleted { id: i64 },
    /// A batch of single posts was created by one upload.
    BulkUploaded { ids: Vec<i64> },
    /// Theme settings or its pre-rendered fragments changed.
    ThemeUpdated,
    /// Operator-requested purge.
    PurgeAll,
}

impl EventKind {
    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::SinglePostUpserted { .. } => "single_post_upserted",
            EventKind::SinglePostDeleted { .. } => "single_post_deleted",
            EventKind::GroupPostUpserted { .. } => "group_post_upserted",
            EventKind::GroupPostDeleted { .. } => "group_post_deleted",
            EventKind::BulkUploaded { .. } => "bulk_uploaded",
            EventKind::ThemeUpdated => "theme_updated",
            EventKind::PurgeAll => "purge_all",
        }
    }
}
