use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    models::content::{
        CreateChapterRequest, CreateContentItemRequest, MoveContentItemRequest, ReorderRequest,
        UpdateChapterRequest,
    },
    services::{content_service::ContentService, AppState},
};

pub async fn create_chapter(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    AppJson(payload): AppJson<CreateChapterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let chapter = service.create_chapter(&course_id, payload).await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

pub async fn update_chapter(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<String>,
    AppJson(payload): AppJson<UpdateChapterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let chapter = service.update_chapter(&chapter_id, payload).await?;
    Ok(Json(chapter))
}

pub async fn reorder_chapters(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    AppJson(payload): AppJson<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let chapters = service
        .reorder_chapters(&course_id, &payload.ordered_ids)
        .await?;
    Ok(Json(chapters))
}

pub async fn delete_chapter(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    service.delete_chapter(&chapter_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_content_item(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<String>,
    AppJson(payload): AppJson<CreateContentItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let item = service.create_content_item(&chapter_id, payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn reorder_content_items(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<String>,
    AppJson(payload): AppJson<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let items = service
        .reorder_content_items(&chapter_id, &payload.ordered_ids)
        .await?;
    Ok(Json(items))
}

pub async fn move_content_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
    AppJson(payload): AppJson<MoveContentItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let item = service.move_content_item(&item_id, payload).await?;
    Ok(Json(item))
}

pub async fn delete_content_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    service.delete_content_item(&item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_course_content(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let content = service.course_content(&course_id).await?;
    Ok(Json(content))
}
