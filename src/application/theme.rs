//! Pre-rendered theme fragments served from cache.

use std::sync::Arc;

use bytes::Bytes;

use crate::application::repos::{RepoError, ThemesRepo};
use crate::cache::{CacheKey, CacheManager, ThemeFragment};

#[derive(Clone)]
pub struct ThemeService {
    themes: Arc<dyn ThemesRepo>,
    cache: CacheManager,
}

impl ThemeService {
    pub fn new(themes: Arc<dyn ThemesRepo>, cache: CacheManager) -> Self {
        Self { themes, cache }
    }

    /// Raw HTML of one fragment; `None` until a theme has been saved.
    pub async fn fragment(&self, fragment: ThemeFragment) -> Result<Option<Bytes>, RepoError> {
        self.cache
            .read_through(&CacheKey::theme_fragment(fragment), || async {
                let theme = self.themes.load_theme().await?;
                Ok(theme.map(|theme| {
                    let html = match fragment {
                        ThemeFragment::Header => theme.header_html,
                        ThemeFragment::Footer => theme.footer_html,
                    };
                    Bytes::from(html)
                }))
            })
            .await
    }
}
