use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::engagement::{AddCommentRequest, RateCourseRequest},
    services::{engagement_service::EngagementService, AppState},
};

pub async fn rate_course(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
    AppJson(payload): AppJson<RateCourseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    let summary = service.rate_course(&claims, &course_id, payload).await?;
    Ok(Json(summary))
}

pub async fn get_course_rating(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    let summary = service.course_rating(Some(&claims), &course_id).await?;
    Ok(Json(summary))
}

pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    let wishlist = service.add_to_wishlist(&claims, &course_id).await?;
    Ok((StatusCode::CREATED, Json(wishlist)))
}

pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    let wishlist = service.remove_from_wishlist(&claims, &course_id).await?;
    Ok(Json(wishlist))
}

pub async fn list_wishlist(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    let wishlist = service.list_wishlist(&claims).await?;
    Ok(Json(wishlist))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
    AppJson(payload): AppJson<AddCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    let comment = service.add_comment(&claims, &course_id, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    let comments = service.list_comments(&course_id).await?;
    Ok(Json(comments))
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(comment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EngagementService::new(state.mongo.clone());
    service.delete_comment(&claims, &comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
