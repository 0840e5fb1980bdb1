use std::sync::Arc;

use crate::application::repos::{PostsWriteRepo, ThemesRepo};
use crate::cache::CacheTrigger;

/// Content mutations. Every method commits through the repository first and
/// only then fires the matching cache invalidation.
#[derive(Clone)]
pub struct AdminContentService {
    pub(crate) writer: Arc<dyn PostsWriteRepo>,
    pub(crate) themes: Arc<dyn ThemesRepo>,
    pub(crate) trigger: CacheTrigger,
}

impl AdminContentService {
    pub fn new(
        writer: Arc<dyn PostsWriteRepo>,
        themes: Arc<dyn ThemesRepo>,
        trigger: CacheTrigger,
    ) -> Self {
        Self {
            writer,
            themes,
            trigger,
        }
    }

    pub fn trigger(&self) -> &CacheTrigger {
        &self.trigger
    }
}
