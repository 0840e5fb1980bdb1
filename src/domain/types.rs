//! Shared domain enumerations aligned with persisted values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Kind of gallery post. Persisted as lowercase text in both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    /// One image with its own page.
    Single,
    /// An ordered set of images sharing one page.
    Group,
}

impl PostType {
    pub fn as_str(self) -> &'static str {
        match self {
            PostType::Single => "single",
            PostType::Group => "group",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "single" => Ok(PostType::Single),
            "group" => Ok(PostType::Group),
            other => Err(DomainError::validation(
                "post_type",
                format!("unknown post type `{other}`"),
            )),
        }
    }
}
