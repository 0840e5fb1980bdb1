mod cache;
mod health;
mod posts;
mod theme;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post, put},
};

use crate::application::admin::AdminContentService;

use super::StoreChecks;
use super::middleware::{log_responses, set_request_context};

/// Request bodies above this are rejected before deserialisation.
const ADMIN_BODY_LIMIT: usize = 4 * 1024 * 1024;

#[derive(Clone)]
pub struct AdminState {
    pub content: AdminContentService,
    pub checks: StoreChecks,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/posts", post(posts::create_single))
        .route(
            "/admin/posts/{id}",
            patch(posts::update_single).delete(posts::delete_single),
        )
        .route("/admin/groups", post(posts::create_group))
        .route(
            "/admin/groups/{id}",
            patch(posts::update_group).delete(posts::delete_group),
        )
        .route("/admin/uploads/bulk", post(posts::bulk_upload))
        .route("/admin/theme", put(theme::update_theme))
        .route("/admin/cache/purge", post(cache::purge_cache))
        .route("/admin/_health/db", get(health::admin_health))
        .layer(DefaultBodyLimit::max(ADMIN_BODY_LIMIT))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
