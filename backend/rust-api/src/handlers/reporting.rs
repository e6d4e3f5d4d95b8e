use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::ApiError,
    services::{reporting_service::ReportingService, AppState},
};

pub async fn get_course_overview(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ReportingService::new(state.mongo.clone());
    let overview = service.course_overview(&course_id).await?;
    Ok(Json(overview))
}
