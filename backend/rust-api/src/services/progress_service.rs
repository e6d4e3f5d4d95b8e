use std::collections::HashMap;

use anyhow::Context;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection, Database,
};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ApiError,
    metrics::{COURSE_PROGRESS_COMPUTATIONS_TOTAL, PROGRESS_EVENTS_TOTAL},
    middlewares::auth::JwtClaims,
    models::content::{ContentItem, ContentPayload},
    models::progress::{
        CourseProgressResponse, DocumentProgressRecord, DocumentProgressResponse,
        DocumentProgressView, RecordVideoProgressRequest, TrackDocumentProgressRequest,
        VideoProgressRecord, VideoProgressResponse, VideoProgressView,
    },
    services::content_service::ContentService,
    utils::time::now_bson,
};

const VIDEO_PROGRESS: &str = "video_progress";
const DOCUMENT_PROGRESS: &str = "document_progress";

/// Completion threshold for videos: at or above this percent the item is
/// completed no matter what the client claims.
const VIDEO_COMPLETION_THRESHOLD: f64 = 95.0;

/// Placeholder percent for "playing a video whose length we do not know":
/// signals in-progress without pretending to be a real percentage.
const NOMINAL_IN_PROGRESS_PERCENT: f64 = 1.0;

/// Cached aggregate lives only briefly; every progress write refreshes it.
const COURSE_PROGRESS_CACHE_TTL_SECONDS: u64 = 30;

#[derive(Serialize, Deserialize)]
struct CachedCourseProgress {
    percent: i32,
    total: usize,
    completed: usize,
}

pub struct ProgressService {
    mongo: Database,
    redis: ConnectionManager,
}

impl ProgressService {
    pub fn new(mongo: Database, redis: ConnectionManager) -> Self {
        Self { mongo, redis }
    }

    fn video_progress(&self) -> Collection<VideoProgressRecord> {
        self.mongo.collection(VIDEO_PROGRESS)
    }

    fn document_progress(&self) -> Collection<DocumentProgressRecord> {
        self.mongo.collection(DOCUMENT_PROGRESS)
    }

    pub async fn record_video_progress(
        &self,
        claims: &JwtClaims,
        course_id: &str,
        video_id: &str,
        req: RecordVideoProgressRequest,
    ) -> Result<VideoProgressResponse, ApiError> {
        ensure_owner(claims, &req.user_id)?;

        let item_id = parse_item_id(video_id)?;
        let length_seconds = self.resolve_video_length(&item_id, course_id).await?;

        let percent = video_percent(req.current_time, length_seconds, req.progress_percent);
        let completed = video_completed(percent, req.completed);

        let key = VideoProgressRecord::key(&req.user_id, course_id, video_id);
        let update = doc! {
            "$set": {
                "user_id": &req.user_id,
                "course_id": course_id,
                "video_id": video_id,
                "current_time": req.current_time,
                "last_accessed": now_bson(),
            },
            // Progress never regresses: $max keeps the higher percent and a
            // completed=true written once stays true.
            "$max": {
                "progress_percent": percent,
                "completed": completed,
            },
        };

        let record = self
            .video_progress()
            .find_one_and_update(doc! { "_id": &key }, update)
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .context("Failed to upsert video progress")?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Upsert returned no document")))?;

        PROGRESS_EVENTS_TOTAL.with_label_values(&["video"]).inc();

        let (course_progress, _, _) = self
            .refresh_course_progress(&req.user_id, course_id)
            .await?;

        tracing::info!(
            "Video progress: user={} video={} percent={:.1} completed={} course_progress={}",
            req.user_id,
            video_id,
            record.progress_percent,
            record.completed,
            course_progress
        );

        Ok(VideoProgressResponse {
            progress: VideoProgressView::from_record(&record),
            course_progress,
        })
    }

    /// No record is a valid state and returns a zero-valued default. Legacy
    /// records with a position but no percent are healed in place.
    pub async fn get_video_progress(
        &self,
        claims: &JwtClaims,
        course_id: &str,
        video_id: &str,
        user_id: &str,
    ) -> Result<VideoProgressResponse, ApiError> {
        ensure_owner(claims, user_id)?;

        let key = VideoProgressRecord::key(user_id, course_id, video_id);
        let record = self
            .video_progress()
            .find_one(doc! { "_id": &key })
            .await
            .context("Failed to load video progress")?;

        let (course_progress, _, _) = self.cached_course_progress(user_id, course_id).await?;

        let Some(mut record) = record else {
            return Ok(VideoProgressResponse {
                progress: VideoProgressView::zero(video_id),
                course_progress,
            });
        };

        if record.progress_percent == 0.0 && record.current_time > 0.0 {
            record = self.heal_video_percent(record, course_id).await?;
        }

        Ok(VideoProgressResponse {
            progress: VideoProgressView::from_record(&record),
            course_progress,
        })
    }

    pub async fn track_document_progress(
        &self,
        claims: &JwtClaims,
        course_id: &str,
        chapter_id: &str,
        document_id: &str,
        req: TrackDocumentProgressRequest,
    ) -> Result<DocumentProgressResponse, ApiError> {
        ensure_owner(claims, &req.user_id)?;

        let item_id = parse_item_id(document_id)?;
        self.ensure_document_item(&item_id, course_id).await?;

        let percent = document_percent(req.current_page, req.total_pages);
        let completed = percent >= 100.0;

        let key =
            DocumentProgressRecord::key(&req.user_id, course_id, chapter_id, document_id);
        let update = doc! {
            "$set": {
                "user_id": &req.user_id,
                "course_id": course_id,
                "chapter_id": chapter_id,
                "document_id": document_id,
                "current_page": req.current_page,
                "total_pages": req.total_pages,
                "last_accessed": now_bson(),
            },
            // Reading time accumulates across pings; the page cursor does not.
            "$inc": { "time_spent": req.time_spent },
            "$max": {
                "progress_percent": percent,
                "completed": completed,
            },
        };

        let record = self
            .document_progress()
            .find_one_and_update(doc! { "_id": &key }, update)
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .context("Failed to upsert document progress")?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Upsert returned no document")))?;

        PROGRESS_EVENTS_TOTAL
            .with_label_values(&["document"])
            .inc();

        let (course_progress, _, _) = self
            .refresh_course_progress(&req.user_id, course_id)
            .await?;

        Ok(DocumentProgressResponse {
            progress: DocumentProgressView::from_record(&record),
            course_progress,
        })
    }

    pub async fn course_progress(
        &self,
        claims: &JwtClaims,
        course_id: &str,
        user_id: &str,
    ) -> Result<CourseProgressResponse, ApiError> {
        ensure_owner(claims, user_id)?;

        let (percent, total, completed) = self.cached_course_progress(user_id, course_id).await?;

        Ok(CourseProgressResponse {
            course_id: course_id.to_string(),
            course_progress: percent,
            items_total: total,
            items_completed: completed,
        })
    }

    /// Serves the aggregate from the short-lived cache when present; the
    /// cache is best-effort and every miss falls through to a fresh
    /// computation.
    async fn cached_course_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<(i32, usize, usize), ApiError> {
        let cache_key = course_progress_cache_key(user_id, course_id);
        let mut conn = self.redis.clone();

        let cached: Option<String> = redis::cmd("GET")
            .arg(&cache_key)
            .query_async(&mut conn)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("Course progress cache read failed: {}", e);
                None
            });

        if let Some(json) = cached {
            if let Ok(value) = serde_json::from_str::<CachedCourseProgress>(&json) {
                COURSE_PROGRESS_COMPUTATIONS_TOTAL
                    .with_label_values(&["cached"])
                    .inc();
                return Ok((value.percent, value.total, value.completed));
            }
        }

        self.refresh_course_progress(user_id, course_id).await
    }

    /// Recomputes the aggregate and writes it through to the cache.
    async fn refresh_course_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<(i32, usize, usize), ApiError> {
        let result = self.compute_course_progress(user_id, course_id).await?;

        let (percent, total, completed) = result;
        let payload = serde_json::to_string(&CachedCourseProgress {
            percent,
            total,
            completed,
        })
        .context("Failed to serialize course progress cache entry")?;

        let mut conn = self.redis.clone();
        if let Err(e) = redis::cmd("SETEX")
            .arg(course_progress_cache_key(user_id, course_id))
            .arg(COURSE_PROGRESS_CACHE_TTL_SECONDS)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
        {
            tracing::debug!("Course progress cache write failed: {}", e);
        }

        Ok(result)
    }

    /// Aggregates (percent, trackable item count, completed count) for one
    /// user across every video/document item reachable from the course.
    pub async fn compute_course_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<(i32, usize, usize), ApiError> {
        COURSE_PROGRESS_COMPUTATIONS_TOTAL
            .with_label_values(&["computed"])
            .inc();

        let roster = ContentService::new(self.mongo.clone());
        let chapters = roster.list_chapters(course_id).await?;
        let chapter_ids: Vec<ObjectId> = chapters.iter().map(|c| c.id).collect();
        let items: Vec<ContentItem> = roster
            .list_items_for_chapters(&chapter_ids)
            .await?
            .into_iter()
            .filter(|item| item.payload.is_trackable())
            .collect();

        if items.is_empty() {
            return Ok((0, 0, 0));
        }

        let video_map = self.load_video_states(user_id, course_id).await?;
        let document_map = self.load_document_states(user_id, course_id).await?;

        let states: Vec<(bool, f64)> = items
            .iter()
            .map(|item| {
                let key = item.id.to_hex();
                match item.payload {
                    ContentPayload::Video { .. } => {
                        video_map.get(&key).copied().unwrap_or((false, 0.0))
                    }
                    ContentPayload::Document { .. } => {
                        document_map.get(&key).copied().unwrap_or((false, 0.0))
                    }
                    ContentPayload::Assessment { .. } => (false, 0.0),
                }
            })
            .collect();

        let completed = states.iter().filter(|(done, _)| *done).count();
        let percent = course_progress_percent(&states, items.len());

        Ok((percent, items.len(), completed))
    }

    async fn load_video_states(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<HashMap<String, (bool, f64)>, ApiError> {
        let records: Vec<VideoProgressRecord> = self
            .video_progress()
            .find(doc! { "user_id": user_id, "course_id": course_id })
            .await
            .context("Failed to load video progress records")?
            .try_collect()
            .await
            .context("Video progress cursor failed")?;

        Ok(records
            .into_iter()
            .map(|r| (r.video_id.clone(), (r.completed, r.progress_percent)))
            .collect())
    }

    async fn load_document_states(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<HashMap<String, (bool, f64)>, ApiError> {
        let records: Vec<DocumentProgressRecord> = self
            .document_progress()
            .find(doc! { "user_id": user_id, "course_id": course_id })
            .await
            .context("Failed to load document progress records")?
            .try_collect()
            .await
            .context("Document progress cursor failed")?;

        Ok(records
            .into_iter()
            .map(|r| (r.document_id.clone(), (r.completed, r.progress_percent)))
            .collect())
    }

    async fn resolve_video_length(
        &self,
        item_id: &ObjectId,
        course_id: &str,
    ) -> Result<f64, ApiError> {
        let roster = ContentService::new(self.mongo.clone());
        let item = roster
            .find_item(item_id)
            .await?
            .filter(|item| item.course_id == course_id)
            .ok_or_else(|| ApiError::not_found("Video not found"))?;

        match item.payload {
            ContentPayload::Video { length_seconds, .. } => Ok(length_seconds),
            _ => Err(ApiError::not_found("Video not found")),
        }
    }

    async fn ensure_document_item(
        &self,
        item_id: &ObjectId,
        course_id: &str,
    ) -> Result<(), ApiError> {
        let roster = ContentService::new(self.mongo.clone());
        let item = roster
            .find_item(item_id)
            .await?
            .filter(|item| item.course_id == course_id)
            .ok_or_else(|| ApiError::not_found("Document not found"))?;

        match item.payload {
            ContentPayload::Document { .. } => Ok(()),
            _ => Err(ApiError::not_found("Document not found")),
        }
    }

    async fn heal_video_percent(
        &self,
        record: VideoProgressRecord,
        course_id: &str,
    ) -> Result<VideoProgressRecord, ApiError> {
        let Ok(item_id) = ObjectId::parse_str(&record.video_id) else {
            return Ok(record);
        };
        let Ok(length_seconds) = self.resolve_video_length(&item_id, course_id).await else {
            return Ok(record);
        };

        let percent = video_percent(record.current_time, length_seconds, None);
        if percent <= 0.0 {
            return Ok(record);
        }
        let completed = video_completed(percent, None);

        let healed = self
            .video_progress()
            .find_one_and_update(
                doc! { "_id": &record.id },
                doc! { "$max": { "progress_percent": percent, "completed": completed } },
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .context("Failed to heal video progress percent")?;

        tracing::debug!(
            "Healed video progress percent for {} -> {:.1}",
            record.id,
            percent
        );

        Ok(healed.unwrap_or(record))
    }
}

fn course_progress_cache_key(user_id: &str, course_id: &str) -> String {
    format!("course_progress:{}:{}", user_id, course_id)
}

fn ensure_owner(claims: &JwtClaims, user_id: &str) -> Result<(), ApiError> {
    if claims.sub == user_id {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Progress can only be recorded for your own account",
        ))
    }
}

fn parse_item_id(value: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::validation("Invalid content item id"))
}

/// `min(100, current_time / length * 100)` when the length is known; a
/// nominal positive value when it is not but playback has started.
fn video_percent(current_time: f64, length_seconds: f64, supplied: Option<f64>) -> f64 {
    if let Some(percent) = supplied {
        return percent.min(100.0);
    }
    if length_seconds > 0.0 {
        (current_time / length_seconds * 100.0).min(100.0)
    } else if current_time > 0.0 {
        NOMINAL_IN_PROGRESS_PERCENT
    } else {
        0.0
    }
}

/// Completion is forced at the threshold; below it an explicit `true` from
/// the client is honored.
fn video_completed(percent: f64, requested: Option<bool>) -> bool {
    percent >= VIDEO_COMPLETION_THRESHOLD || requested.unwrap_or(false)
}

fn document_percent(current_page: i32, total_pages: i32) -> f64 {
    if total_pages <= 0 {
        return 0.0;
    }
    ((current_page as f64 / total_pages as f64) * 100.0)
        .round()
        .min(100.0)
}

/// Weighted aggregate: full credit for completed items, partial credit in
/// proportion to percent otherwise, clamped so many partials cannot exceed
/// 100.
fn course_progress_percent(states: &[(bool, f64)], total_items: usize) -> i32 {
    if total_items == 0 {
        return 0;
    }
    let sum: f64 = states
        .iter()
        .map(|(completed, percent)| {
            if *completed {
                1.0
            } else if *percent > 0.0 {
                percent / 100.0
            } else {
                0.0
            }
        })
        .sum();
    ((sum / total_items as f64) * 100.0).min(100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_percent_from_length() {
        assert_eq!(video_percent(30.0, 120.0, None), 25.0);
        assert_eq!(video_percent(240.0, 120.0, None), 100.0);
        assert_eq!(video_percent(0.0, 120.0, None), 0.0);
    }

    #[test]
    fn video_percent_unknown_length_is_nominal() {
        assert_eq!(video_percent(42.0, 0.0, None), 1.0);
        assert_eq!(video_percent(0.0, 0.0, None), 0.0);
    }

    #[test]
    fn supplied_percent_wins_but_clamps() {
        assert_eq!(video_percent(10.0, 120.0, Some(80.0)), 80.0);
        assert_eq!(video_percent(10.0, 120.0, Some(250.0)), 100.0);
    }

    #[test]
    fn completion_forced_at_threshold() {
        assert!(video_completed(95.0, None));
        assert!(video_completed(95.0, Some(false)));
        assert!(video_completed(100.0, None));
        assert!(!video_completed(94.9, None));
        assert!(video_completed(10.0, Some(true)));
    }

    #[test]
    fn document_percent_scenarios() {
        assert_eq!(document_percent(10, 10), 100.0);
        assert_eq!(document_percent(5, 10), 50.0);
        assert_eq!(document_percent(7, 0), 0.0);
        assert_eq!(document_percent(15, 10), 100.0);
    }

    #[test]
    fn empty_course_is_zero() {
        assert_eq!(course_progress_percent(&[], 0), 0);
    }

    #[test]
    fn all_completed_is_hundred() {
        let states = vec![(true, 100.0), (true, 95.0), (true, 100.0)];
        assert_eq!(course_progress_percent(&states, 3), 100);
    }

    #[test]
    fn partial_credit_is_weighted() {
        // one done, one half-watched, one untouched
        let states = vec![(true, 100.0), (false, 50.0), (false, 0.0)];
        assert_eq!(course_progress_percent(&states, 3), 50);
    }

    #[test]
    fn aggregate_never_exceeds_hundred() {
        let states = vec![(true, 100.0), (true, 100.0)];
        assert_eq!(course_progress_percent(&states, 2), 100);
    }
}
