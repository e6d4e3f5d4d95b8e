use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::time::bson_to_rfc3339;

/// One rating per (user, course); `_id` is the composite key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRating {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub rating: i32,
    pub review: Option<String>,
    pub updated_at: BsonDateTime,
}

impl CourseRating {
    pub fn key(user_id: &str, course_id: &str) -> String {
        format!("{}:{}", user_id, course_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub added_at: BsonDateTime,
}

impl WishlistEntry {
    pub fn key(user_id: &str, course_id: &str) -> String {
        format!("{}:{}", user_id, course_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseComment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    pub course_id: String,
    pub text: String,
    pub created_at: BsonDateTime,
}

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RateCourseRequest {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i32,
    pub review: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddCommentRequest {
    #[validate(length(min = 1, max = 2000, message = "comment text must be 1-2000 characters"))]
    pub text: String,
}

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CourseRatingSummary {
    pub course_id: String,
    pub average: f64,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_rating: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct WishlistView {
    pub course_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: String,
}

impl CommentView {
    pub fn from_doc(comment: &CourseComment) -> Self {
        Self {
            id: comment.id.to_hex(),
            user_id: comment.user_id.clone(),
            text: comment.text.clone(),
            created_at: bson_to_rfc3339(comment.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating_request(rating: i32) -> RateCourseRequest {
        RateCourseRequest {
            rating,
            review: None,
        }
    }

    #[test]
    fn rating_must_be_one_to_five() {
        assert!(rating_request(0).validate().is_err());
        assert!(rating_request(6).validate().is_err());
        assert!(rating_request(1).validate().is_ok());
        assert!(rating_request(5).validate().is_ok());
    }

    #[test]
    fn comment_text_must_not_be_empty() {
        let empty = AddCommentRequest {
            text: String::new(),
        };
        assert!(empty.validate().is_err());

        let ok = AddCommentRequest {
            text: "Great chapter".to_string(),
        };
        assert!(ok.validate().is_ok());
    }
}
