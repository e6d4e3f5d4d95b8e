use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::time::bson_to_rfc3339;

/// Type-specific payload of a content item, dispatched by the `content_type`
/// tag in the stored document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum ContentPayload {
    Video {
        title: String,
        url: String,
        length_seconds: f64,
    },
    Document {
        title: String,
        url: String,
        total_pages: i32,
    },
    Assessment {
        assessment_id: ObjectId,
    },
}

impl ContentPayload {
    pub fn content_type(&self) -> &'static str {
        match self {
            ContentPayload::Video { .. } => "video",
            ContentPayload::Document { .. } => "document",
            ContentPayload::Assessment { .. } => "assessment",
        }
    }

    /// Video and document items count toward course progress; assessments are
    /// attempt-based and do not.
    pub fn is_trackable(&self) -> bool {
        matches!(
            self,
            ContentPayload::Video { .. } | ContentPayload::Document { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: i32,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub course_id: String,
    pub chapter_id: ObjectId,
    pub order: i32,
    pub payload: ContentPayload,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateChapterRequest {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChapterRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Full target ordering, 1-based position taken from array index.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ordered_ids: Vec<String>,
}

/// Inbound payload variant with string ids; resolved to `ContentPayload`
/// after the referenced assessment is verified to exist.
#[derive(Debug, Deserialize)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum ContentPayloadInput {
    Video {
        title: String,
        url: String,
        #[serde(default, deserialize_with = "super::coerce_f64")]
        length_seconds: f64,
    },
    Document {
        title: String,
        url: String,
        #[serde(default, deserialize_with = "super::coerce_i32")]
        total_pages: i32,
    },
    Assessment {
        assessment_id: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct CreateContentItemRequest {
    pub payload: ContentPayloadInput,
}

#[derive(Debug, Deserialize)]
pub struct MoveContentItemRequest {
    pub chapter_id: String,
}

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ChapterView {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub order: i32,
    pub updated_at: String,
}

impl ChapterView {
    pub fn from_doc(chapter: &Chapter) -> Self {
        Self {
            id: chapter.id.to_hex(),
            course_id: chapter.course_id.clone(),
            title: chapter.title.clone(),
            description: chapter.description.clone(),
            order: chapter.order,
            updated_at: bson_to_rfc3339(chapter.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContentItemView {
    pub id: String,
    pub chapter_id: String,
    pub order: i32,
    pub content_type: String,
    pub payload: ContentPayloadView,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ContentPayloadView {
    Video {
        title: String,
        url: String,
        length_seconds: f64,
    },
    Document {
        title: String,
        url: String,
        total_pages: i32,
    },
    Assessment {
        assessment_id: String,
    },
}

impl ContentItemView {
    pub fn from_doc(item: &ContentItem) -> Self {
        let payload = match &item.payload {
            ContentPayload::Video {
                title,
                url,
                length_seconds,
            } => ContentPayloadView::Video {
                title: title.clone(),
                url: url.clone(),
                length_seconds: *length_seconds,
            },
            ContentPayload::Document {
                title,
                url,
                total_pages,
            } => ContentPayloadView::Document {
                title: title.clone(),
                url: url.clone(),
                total_pages: *total_pages,
            },
            ContentPayload::Assessment { assessment_id } => ContentPayloadView::Assessment {
                assessment_id: assessment_id.to_hex(),
            },
        };
        Self {
            id: item.id.to_hex(),
            chapter_id: item.chapter_id.to_hex(),
            order: item.order,
            content_type: item.payload.content_type().to_string(),
            payload,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChapterWithItems {
    #[serde(flatten)]
    pub chapter: ChapterView,
    pub items: Vec<ContentItemView>,
}

#[derive(Debug, Serialize)]
pub struct CourseContentResponse {
    pub course_id: String,
    pub chapters: Vec<ChapterWithItems>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_through_tag() {
        let json = r#"{"content_type":"video","title":"Intro","url":"v/1.mp4","length_seconds":120.0}"#;
        let payload: ContentPayload = serde_json::from_str(json).unwrap();
        assert!(matches!(payload, ContentPayload::Video { .. }));
        assert!(payload.is_trackable());
        assert_eq!(payload.content_type(), "video");
    }

    #[test]
    fn assessments_are_not_trackable() {
        let payload = ContentPayload::Assessment {
            assessment_id: ObjectId::new(),
        };
        assert!(!payload.is_trackable());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let json = r#"{"content_type":"hologram","title":"x"}"#;
        assert!(serde_json::from_str::<ContentPayload>(json).is_err());
    }
}
