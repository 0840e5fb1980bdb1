//! Validation rules for gallery posts.

use std::collections::BTreeSet;

use super::error::DomainError;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_TAG_LEN: usize = 48;
pub const MAX_GROUP_IMAGES: usize = 200;

/// Trimmed, non-empty title of bounded length.
pub fn normalize_title(raw: &str) -> Result<String, DomainError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(DomainError::validation(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(title.to_string())
}

/// Relative media path under the uploads root.
pub fn validate_media_path(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let path = raw.trim();
    if path.is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    if path.starts_with('/') || path.contains('\\') || path.split('/').any(|part| part == "..") {
        return Err(DomainError::validation(
            field,
            format!("`{path}` must be a relative path inside the uploads directory"),
        ));
    }
    Ok(path.to_string())
}

pub fn validate_optional_media_path(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<String>, DomainError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(path) => validate_media_path(field, path).map(Some),
    }
}

/// Lowercased, deduplicated, sorted tags. Empty entries are dropped.
pub fn normalize_tags<I, S>(raw: I) -> Result<Vec<String>, DomainError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = BTreeSet::new();
    for tag in raw {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(DomainError::validation(
                "tags",
                format!("tag `{tag}` exceeds {MAX_TAG_LEN} characters"),
            ));
        }
        tags.insert(tag);
    }
    Ok(tags.into_iter().collect())
}

pub fn normalize_description(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
