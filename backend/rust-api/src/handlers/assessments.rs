use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::assessment::{
        CreateAssessmentRequest, ListAttemptsQuery, StartAttemptRequest, SubmitAttemptRequest,
        UpdateAssessmentRequest,
    },
    models::content::ReorderRequest,
    services::{assessment_service::AssessmentService, AppState},
};

fn ensure_instructor(claims: &JwtClaims) -> Result<(), ApiError> {
    if claims.is_instructor() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Instructor role required"))
    }
}

pub async fn create_assessment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(payload): AppJson<CreateAssessmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_instructor(&claims)?;

    let service = AssessmentService::new(state.mongo.clone());
    let assessment = service.create_assessment(payload).await?;
    Ok((StatusCode::CREATED, Json(service.view(&assessment, &claims))))
}

pub async fn get_assessment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(assessment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AssessmentService::new(state.mongo.clone());
    let assessment = service.get_assessment(&assessment_id).await?;
    Ok(Json(service.view(&assessment, &claims)))
}

pub async fn update_assessment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(assessment_id): Path<String>,
    AppJson(payload): AppJson<UpdateAssessmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_instructor(&claims)?;

    let service = AssessmentService::new(state.mongo.clone());
    let assessment = service.update_assessment(&assessment_id, payload).await?;
    Ok(Json(service.view(&assessment, &claims)))
}

/// PATCH shares the merge-on-missing path with PUT; both validate the
/// question set only when the key is present.
pub async fn patch_assessment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(assessment_id): Path<String>,
    AppJson(payload): AppJson<UpdateAssessmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_instructor(&claims)?;

    let service = AssessmentService::new(state.mongo.clone());
    let assessment = service.update_assessment(&assessment_id, payload).await?;
    Ok(Json(service.view(&assessment, &claims)))
}

pub async fn reorder_questions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(assessment_id): Path<String>,
    AppJson(payload): AppJson<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_instructor(&claims)?;

    let service = AssessmentService::new(state.mongo.clone());
    let assessment = service
        .reorder_questions(&assessment_id, &payload.ordered_ids)
        .await?;
    Ok(Json(service.view(&assessment, &claims)))
}

pub async fn delete_assessment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(assessment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_instructor(&claims)?;

    let service = AssessmentService::new(state.mongo.clone());
    service.delete_assessment(&assessment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(assessment_id): Path<String>,
    AppJson(payload): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AssessmentService::new(state.mongo.clone());
    let attempt = service.start_attempt(&claims, &assessment_id, payload).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(attempt_id): Path<String>,
    AppJson(payload): AppJson<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AssessmentService::new(state.mongo.clone());
    let attempt = service.submit_attempt(&claims, &attempt_id, payload).await?;
    Ok(Json(attempt))
}

pub async fn get_user_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(assessment_id): Path<String>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AssessmentService::new(state.mongo.clone());
    let attempts = service
        .get_user_attempts(&claims, &assessment_id, query)
        .await?;
    Ok(Json(attempts))
}
