//! Cache key definitions.
//!
//! A `CacheKey` names one entry on disk. Keys are grouped by prefix so that a
//! whole family (every single-post detail, every theme fragment) can be
//! dropped at once.

use std::fmt;

use thiserror::Error;

/// Prefix shared by single-post detail entries.
pub const SINGLE_POST_PREFIX: &str = "post_";
/// Prefix shared by group-post detail entries.
pub const GROUP_POST_PREFIX: &str = "group_";
/// Prefix shared by pre-rendered theme fragments.
pub const THEME_PREFIX: &str = "theme_";

const POSTS_LIST: &str = "posts_list";
const MAX_KEY_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheKeyError {
    #[error("cache key must not be empty")]
    Empty,
    #[error("cache key exceeds {MAX_KEY_LEN} characters")]
    TooLong,
    #[error("cache key `{0}` contains characters outside [A-Za-z0-9_-]")]
    InvalidCharacter(String),
}

/// Pre-rendered theme fragment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeFragment {
    Header,
    Footer,
}

impl ThemeFragment {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeFragment::Header => "header",
            ThemeFragment::Footer => "footer",
        }
    }

    pub fn all() -> [ThemeFragment; 2] {
        [ThemeFragment::Header, ThemeFragment::Footer]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "header" => Some(ThemeFragment::Header),
            "footer" => Some(ThemeFragment::Footer),
            _ => None,
        }
    }
}

/// Identifier of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate an arbitrary key.
    pub fn parse(raw: &str) -> Result<Self, CacheKeyError> {
        if raw.is_empty() {
            return Err(CacheKeyError::Empty);
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(CacheKeyError::TooLong);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CacheKeyError::InvalidCharacter(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// The default gallery listing (no filter, first page).
    pub fn posts_list() -> Self {
        Self(POSTS_LIST.to_string())
    }

    pub fn single_post(id: i64) -> Self {
        Self(format!("{SINGLE_POST_PREFIX}{id}"))
    }

    pub fn group_post(id: i64) -> Self {
        Self(format!("{GROUP_POST_PREFIX}{id}"))
    }

    pub fn theme_fragment(fragment: ThemeFragment) -> Self {
        Self(format!("{THEME_PREFIX}{}", fragment.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
