use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::progress::{
        GetCourseProgressQuery, GetVideoProgressQuery, RecordVideoProgressRequest,
        TrackDocumentProgressRequest,
    },
    services::{progress_service::ProgressService, AppState},
};

pub async fn record_video_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((course_id, video_id)): Path<(String, String)>,
    AppJson(payload): AppJson<RecordVideoProgressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProgressService::new(state.mongo.clone(), state.redis.clone());
    let response = service
        .record_video_progress(&claims, &course_id, &video_id, payload)
        .await?;
    Ok(Json(response))
}

pub async fn get_video_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((course_id, video_id)): Path<(String, String)>,
    Query(query): Query<GetVideoProgressQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProgressService::new(state.mongo.clone(), state.redis.clone());
    let response = service
        .get_video_progress(&claims, &course_id, &video_id, &query.user_id)
        .await?;
    Ok(Json(response))
}

pub async fn track_document_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((course_id, chapter_id, document_id)): Path<(String, String, String)>,
    AppJson(payload): AppJson<TrackDocumentProgressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProgressService::new(state.mongo.clone(), state.redis.clone());
    let response = service
        .track_document_progress(&claims, &course_id, &chapter_id, &document_id, payload)
        .await?;
    Ok(Json(response))
}

pub async fn get_course_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
    Query(query): Query<GetCourseProgressQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProgressService::new(state.mongo.clone(), state.redis.clone());
    let response = service
        .course_progress(&claims, &course_id, &query.user_id)
        .await?;
    Ok(Json(response))
}
