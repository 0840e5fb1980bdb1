mod admin;
mod error;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::{
    ClientIp, RequestContext, VIEW_ACTION, ViewThrottle, client_ip, is_secure_request,
};
pub use public::{HttpState, MAX_LIST_LIMIT, ViewRecorded, build_router};

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;
use tracing::warn;

use crate::application::error::ErrorReport;
use crate::infra::counters::SqliteViewCounts;
use crate::infra::db::PostgresRepositories;

/// A database the service depends on, checked by the `_health/db` routes.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), SqlxError>;
}

#[async_trait]
impl StoreHealth for PostgresRepositories {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn check(&self) -> Result<(), SqlxError> {
        self.health_check().await
    }
}

#[async_trait]
impl StoreHealth for SqliteViewCounts {
    fn name(&self) -> &'static str {
        "counters"
    }

    async fn check(&self) -> Result<(), SqlxError> {
        self.health_check().await
    }
}

/// Every store checked by the health routes. Healthy only if all are.
#[derive(Clone, Default)]
pub struct StoreChecks {
    stores: Vec<Arc<dyn StoreHealth>>,
}

impl StoreChecks {
    pub fn new(stores: Vec<Arc<dyn StoreHealth>>) -> Self {
        Self { stores }
    }

    /// Stops at the first failing store.
    pub async fn check(&self) -> Result<(), SqlxError> {
        for store in &self.stores {
            if let Err(err) = store.check().await {
                warn!(
                    target = "atelier::http::health",
                    store = store.name(),
                    error = %err,
                    "Store health check failed"
                );
                return Err(err);
            }
        }
        Ok(())
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
