use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;

use super::AdminState;

#[derive(Debug, Serialize)]
struct PurgeSummary {
    removed: usize,
}

pub(super) async fn purge_cache(State(state): State<AdminState>) -> Response {
    let removed = state.content.purge_cache();
    info!(
        target = "atelier::http::admin",
        removed, "Cache purged from admin surface"
    );
    Json(PurgeSummary { removed }).into_response()
}
