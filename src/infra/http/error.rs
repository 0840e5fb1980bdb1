use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::admin::AdminContentError;
use crate::application::error::ErrorReport;
use crate::application::gallery::GalleryError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const VALIDATION: &str = "validation_error";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    source: &'static str,
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            source,
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(source: &'static str, message: &'static str, hint: Option<String>) -> Self {
        Self::new(
            source,
            StatusCode::BAD_REQUEST,
            codes::BAD_REQUEST,
            message,
            hint,
        )
    }

    pub fn not_found(source: &'static str, message: &'static str) -> Self {
        Self::new(
            source,
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            message,
            None,
        )
    }

    pub fn from_repo(source: &'static str, err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } => Self::new(
                source,
                StatusCode::CONFLICT,
                codes::DUPLICATE,
                "Duplicate record",
                Some(constraint),
            ),
            RepoError::NotFound => Self::not_found(source, "Resource not found"),
            RepoError::InvalidInput { message } => Self::new(
                source,
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Invalid input",
                Some(message),
            ),
            RepoError::Integrity { message } => Self::new(
                source,
                StatusCode::CONFLICT,
                codes::INTEGRITY,
                "Integrity constraint violated",
                Some(message),
            ),
            RepoError::Timeout => Self::new(
                source,
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
                None,
            ),
            RepoError::Persistence(message) => Self::new(
                source,
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
                Some(message),
            ),
        }
    }

    pub fn from_domain(source: &'static str, err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => Self::new(
                source,
                StatusCode::BAD_REQUEST,
                codes::VALIDATION,
                "Validation failed",
                Some(format!("{field}: {message}")),
            ),
            DomainError::NotFound { entity } => Self::new(
                source,
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                "Resource not found",
                Some(entity.to_string()),
            ),
            DomainError::Invariant { message } => Self::new(
                source,
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Unexpected error occurred",
                Some(message),
            ),
        }
    }

    /// 429 with a `Retry-After` header in whole seconds.
    pub fn rate_limited(retry_after: u64) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: codes::RATE_LIMITED.to_string(),
                message: "Rate limit exceeded".to_string(),
                hint: Some(format!("Retry after {retry_after} seconds")),
            },
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        ErrorReport::from_message(
            "infra::http::middleware::throttle_views",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={retry_after}"),
        )
        .attach(&mut response);
        response
    }
}

impl From<(&'static str, GalleryError)> for ApiError {
    fn from((source, err): (&'static str, GalleryError)) -> Self {
        match err {
            GalleryError::Repo(err) => Self::from_repo(source, err),
        }
    }
}

impl From<(&'static str, AdminContentError)> for ApiError {
    fn from((source, err): (&'static str, AdminContentError)) -> Self {
        match err {
            AdminContentError::Validation(err) => Self::from_domain(source, err),
            AdminContentError::Repo(err) => Self::from_repo(source, err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = format!(
            "{}: {}",
            self.code,
            self.hint.as_deref().unwrap_or(self.message)
        );
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(self.source, self.status, detail).attach(&mut response);
        response
    }
}
