use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use crate::utils::time::bson_to_rfc3339;

/// One record per (user, course, video). `_id` is the composite key, which
/// makes the upsert-by-key atomic at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoProgressRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub video_id: String,
    pub current_time: f64,
    pub progress_percent: f64,
    pub completed: bool,
    pub last_accessed: BsonDateTime,
}

impl VideoProgressRecord {
    pub fn key(user_id: &str, course_id: &str, video_id: &str) -> String {
        format!("{}:{}:{}", user_id, course_id, video_id)
    }
}

/// One record per (user, course, chapter, document). Unlike video progress,
/// `time_spent` accumulates across pings instead of being overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProgressRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub chapter_id: String,
    pub document_id: String,
    pub current_page: i32,
    pub total_pages: i32,
    pub progress_percent: f64,
    pub completed: bool,
    pub time_spent: f64,
    pub last_accessed: BsonDateTime,
}

impl DocumentProgressRecord {
    pub fn key(user_id: &str, course_id: &str, chapter_id: &str, document_id: &str) -> String {
        format!("{}:{}:{}:{}", user_id, course_id, chapter_id, document_id)
    }
}

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RecordVideoProgressRequest {
    pub user_id: String,
    #[serde(default, deserialize_with = "super::coerce_f64")]
    pub current_time: f64,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub progress_percent: Option<f64>,
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GetVideoProgressQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackDocumentProgressRequest {
    pub user_id: String,
    #[serde(default, deserialize_with = "super::coerce_i32")]
    pub current_page: i32,
    #[serde(default, deserialize_with = "super::coerce_i32")]
    pub total_pages: i32,
    #[serde(default, deserialize_with = "super::coerce_f64")]
    pub time_spent: f64,
}

#[derive(Debug, Deserialize)]
pub struct GetCourseProgressQuery {
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct VideoProgressView {
    pub video_id: String,
    pub current_time: f64,
    pub progress_percent: f64,
    pub completed: bool,
    pub last_accessed: Option<String>,
}

impl VideoProgressView {
    pub fn from_record(record: &VideoProgressRecord) -> Self {
        Self {
            video_id: record.video_id.clone(),
            current_time: record.current_time,
            progress_percent: record.progress_percent,
            completed: record.completed,
            last_accessed: Some(bson_to_rfc3339(record.last_accessed)),
        }
    }

    /// Absence of progress is a valid state, not an error.
    pub fn zero(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            current_time: 0.0,
            progress_percent: 0.0,
            completed: false,
            last_accessed: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VideoProgressResponse {
    pub progress: VideoProgressView,
    pub course_progress: i32,
}

#[derive(Debug, Serialize)]
pub struct DocumentProgressView {
    pub document_id: String,
    pub current_page: i32,
    pub total_pages: i32,
    pub progress_percent: f64,
    pub completed: bool,
    pub time_spent: f64,
    pub last_accessed: Option<String>,
}

impl DocumentProgressView {
    pub fn from_record(record: &DocumentProgressRecord) -> Self {
        Self {
            document_id: record.document_id.clone(),
            current_page: record.current_page,
            total_pages: record.total_pages,
            progress_percent: record.progress_percent,
            completed: record.completed,
            time_spent: record.time_spent,
            last_accessed: Some(bson_to_rfc3339(record.last_accessed)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentProgressResponse {
    pub progress: DocumentProgressView,
    pub course_progress: i32,
}

#[derive(Debug, Serialize)]
pub struct CourseProgressResponse {
    pub course_id: String,
    pub course_progress: i32,
    pub items_total: usize,
    pub items_completed: usize,
}
