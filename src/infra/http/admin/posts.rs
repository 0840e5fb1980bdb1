use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::admin::{
    BulkUploadCommand, CreateGroupPostCommand, CreateSinglePostCommand, UpdateGroupPostCommand,
    UpdateSinglePostCommand,
};

use super::super::error::ApiError;
use super::AdminState;

pub(super) async fn create_single(
    State(state): State<AdminState>,
    Json(command): Json<CreateSinglePostCommand>,
) -> Response {
    match state.content.create_single(command).await {
        Ok(post) => (StatusCode::CREATED, Json(post)).into_response(),
        Err(err) => ApiError::from(("infra::http::admin::create_single", err)).into_response(),
    }
}

pub(super) async fn update_single(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(command): Json<UpdateSinglePostCommand>,
) -> Response {
    match state.content.update_single(id, command).await {
        Ok(post) => Json(post).into_response(),
        Err(err) => ApiError::from(("infra::http::admin::update_single", err)).into_response(),
    }
}

pub(super) async fn delete_single(State(state): State<AdminState>, Path(id): Path<i64>) -> Response {
    match state.content.delete_single(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ApiError::from(("infra::http::admin::delete_single", err)).into_response(),
    }
}

pub(super) async fn create_group(
    State(state): State<AdminState>,
    Json(command): Json<CreateGroupPostCommand>,
) -> Response {
    match state.content.create_group(command).await {
        Ok(post) => (StatusCode::CREATED, Json(post)).into_response(),
        Err(err) => ApiError::from(("infra::http::admin::create_group", err)).into_response(),
    }
}

pub(super) async fn update_group(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(command): Json<UpdateGroupPostCommand>,
) -> Response {
    match state.content.update_group(id, command).await {
        Ok(post) => Json(post).into_response(),
        Err(err) => ApiError::from(("infra::http::admin::update_group", err)).into_response(),
    }
}

pub(super) async fn delete_group(State(state): State<AdminState>, Path(id): Path<i64>) -> Response {
    match state.content.delete_group(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ApiError::from(("infra::http::admin::delete_group", err)).into_response(),
    }
}

pub(super) async fn bulk_upload(
    State(state): State<AdminState>,
    Json(command): Json<BulkUploadCommand>,
) -> Response {
    match state.content.bulk_upload(command).await {
        Ok(posts) => (StatusCode::CREATED, Json(posts)).into_response(),
        Err(err) => ApiError::from(("infra::http::admin::bulk_upload", err)).into_response(),
    }
}
