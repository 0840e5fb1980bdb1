use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};

use crate::application::admin::UpdateThemeCommand;

use super::super::error::ApiError;
use super::AdminState;

pub(super) async fn update_theme(
    State(state): State<AdminState>,
    Json(command): Json<UpdateThemeCommand>,
) -> Response {
    match state.content.update_theme(command).await {
        Ok(theme) => Json(theme).into_response(),
        Err(err) => ApiError::from(("infra::http::admin::update_theme", err)).into_response(),
    }
}
