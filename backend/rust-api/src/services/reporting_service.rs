use std::collections::HashMap;

use anyhow::Context;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Database,
};

use crate::{
    errors::ApiError,
    models::content::ContentItem,
    models::progress::{DocumentProgressRecord, VideoProgressRecord},
    models::reporting::CourseOverview,
    services::{content_service::ContentService, engagement_service::EngagementService},
};

const ATTEMPTS: &str = "assessment_attempts";

/// Aggregate course statistics for instructors and admins.
pub struct ReportingService {
    mongo: Database,
}

impl ReportingService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn course_overview(&self, course_id: &str) -> Result<CourseOverview, ApiError> {
        let roster = ContentService::new(self.mongo.clone());
        let chapters = roster.list_chapters(course_id).await?;
        let chapter_ids: Vec<ObjectId> = chapters.iter().map(|c| c.id).collect();
        let items: Vec<ContentItem> = roster
            .list_items_for_chapters(&chapter_ids)
            .await?
            .into_iter()
            .filter(|item| item.payload.is_trackable())
            .collect();
        let item_ids: Vec<String> = items.iter().map(|i| i.id.to_hex()).collect();

        // Per-learner (completed, percent) states keyed by item, folded from
        // both progress collections.
        let mut per_user: HashMap<String, HashMap<String, (bool, f64)>> = HashMap::new();

        let video_records: Vec<VideoProgressRecord> = self
            .mongo
            .collection::<VideoProgressRecord>("video_progress")
            .find(doc! { "course_id": course_id })
            .await
            .context("Failed to load video progress")?
            .try_collect()
            .await
            .context("Video progress cursor failed")?;
        for record in video_records {
            per_user
                .entry(record.user_id.clone())
                .or_default()
                .insert(record.video_id, (record.completed, record.progress_percent));
        }

        let document_records: Vec<DocumentProgressRecord> = self
            .mongo
            .collection::<DocumentProgressRecord>("document_progress")
            .find(doc! { "course_id": course_id })
            .await
            .context("Failed to load document progress")?
            .try_collect()
            .await
            .context("Document progress cursor failed")?;
        for record in document_records {
            per_user.entry(record.user_id.clone()).or_default().insert(
                record.document_id,
                (record.completed, record.progress_percent),
            );
        }

        let learners = per_user.len();
        let average_progress = average_course_progress(&per_user, &item_ids);

        let attempts_total = self
            .mongo
            .collection::<mongodb::bson::Document>(ATTEMPTS)
            .count_documents(doc! { "course_id": course_id, "completed": true })
            .await
            .context("Failed to count attempts")?;
        let attempts_passed = self
            .mongo
            .collection::<mongodb::bson::Document>(ATTEMPTS)
            .count_documents(doc! { "course_id": course_id, "completed": true, "passed": true })
            .await
            .context("Failed to count passed attempts")?;
        let pass_rate = if attempts_total == 0 {
            0.0
        } else {
            (attempts_passed as f64 / attempts_total as f64 * 100.0).round()
        };

        let rating = EngagementService::new(self.mongo.clone())
            .course_rating(None, course_id)
            .await?;

        Ok(CourseOverview {
            course_id: course_id.to_string(),
            learners,
            average_progress,
            items_total: items.len(),
            attempts_total,
            attempts_passed,
            pass_rate,
            rating_average: rating.average,
            rating_count: rating.count,
        })
    }
}

/// Mean of per-learner course progress, each computed with the same weighted
/// formula the tracker uses, restricted to items still on the roster.
fn average_course_progress(
    per_user: &HashMap<String, HashMap<String, (bool, f64)>>,
    item_ids: &[String],
) -> f64 {
    if per_user.is_empty() || item_ids.is_empty() {
        return 0.0;
    }

    let total: f64 = per_user
        .values()
        .map(|states| {
            let sum: f64 = item_ids
                .iter()
                .map(|id| match states.get(id) {
                    Some((true, _)) => 1.0,
                    Some((false, percent)) if *percent > 0.0 => percent / 100.0,
                    _ => 0.0,
                })
                .sum();
            (sum / item_ids.len() as f64 * 100.0).min(100.0)
        })
        .sum();

    (total / per_user.len() as f64 * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(entries: &[(&str, bool, f64)]) -> HashMap<String, (bool, f64)> {
        entries
            .iter()
            .map(|(id, done, pct)| (id.to_string(), (*done, *pct)))
            .collect()
    }

    #[test]
    fn average_over_learners() {
        let items = vec!["a".to_string(), "b".to_string()];
        let mut per_user = HashMap::new();
        // learner one finished everything, learner two is halfway through one item
        per_user.insert(
            "u1".to_string(),
            states(&[("a", true, 100.0), ("b", true, 100.0)]),
        );
        per_user.insert("u2".to_string(), states(&[("a", false, 50.0)]));

        let average = average_course_progress(&per_user, &items);
        assert_eq!(average, 62.5);
    }

    #[test]
    fn no_learners_or_items_is_zero() {
        let per_user = HashMap::new();
        assert_eq!(average_course_progress(&per_user, &["a".to_string()]), 0.0);

        let mut per_user = HashMap::new();
        per_user.insert("u1".to_string(), states(&[("a", true, 100.0)]));
        assert_eq!(average_course_progress(&per_user, &[]), 0.0);
    }

    #[test]
    fn records_for_deleted_items_are_ignored() {
        let items = vec!["a".to_string()];
        let mut per_user = HashMap::new();
        per_user.insert(
            "u1".to_string(),
            states(&[("a", true, 100.0), ("ghost", true, 100.0)]),
        );

        assert_eq!(average_course_progress(&per_user, &items), 100.0);
    }
}
