use anyhow::Context;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    options::FindOptions,
    Collection, Database,
};

use crate::{
    errors::ApiError,
    models::content::{
        Chapter, ChapterView, ChapterWithItems, ContentItem, ContentItemView, ContentPayload,
        ContentPayloadInput, CourseContentResponse, CreateChapterRequest, CreateContentItemRequest,
        MoveContentItemRequest, UpdateChapterRequest,
    },
    utils::time::now_bson,
};

const CHAPTERS: &str = "chapters";
const CONTENT_ITEMS: &str = "content_items";
const VIDEO_PROGRESS: &str = "video_progress";
const DOCUMENT_PROGRESS: &str = "document_progress";
const ASSESSMENTS: &str = "assessments";

/// Course content roster: chapters and the content items inside them.
/// Also the denominator feed for course-progress aggregation.
pub struct ContentService {
    mongo: Database,
}

impl ContentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn chapters(&self) -> Collection<Chapter> {
        self.mongo.collection(CHAPTERS)
    }

    fn items(&self) -> Collection<ContentItem> {
        self.mongo.collection(CONTENT_ITEMS)
    }

    pub async fn create_chapter(
        &self,
        course_id: &str,
        req: CreateChapterRequest,
    ) -> Result<ChapterView, ApiError> {
        validator::Validate::validate(&req).map_err(|e| ApiError::validation(e.to_string()))?;

        let order = self.next_chapter_order(course_id).await?;
        let now = now_bson();
        let chapter = Chapter {
            id: ObjectId::new(),
            course_id: course_id.to_string(),
            title: req.title,
            description: req.description,
            order,
            created_at: now,
            updated_at: now,
        };

        self.chapters()
            .insert_one(&chapter)
            .await
            .context("Failed to insert chapter")?;

        tracing::info!(
            "Created chapter {} in course {} at position {}",
            chapter.id.to_hex(),
            course_id,
            order
        );

        Ok(ChapterView::from_doc(&chapter))
    }

    pub async fn update_chapter(
        &self,
        chapter_id: &str,
        req: UpdateChapterRequest,
    ) -> Result<ChapterView, ApiError> {
        let id = parse_chapter_id(chapter_id)?;

        let mut update = doc! {};
        if let Some(title) = req.title {
            if title.is_empty() {
                return Err(ApiError::validation("title must not be empty"));
            }
            update.insert("title", title);
        }
        if let Some(description) = req.description {
            update.insert("description", description);
        }
        update.insert("updated_at", now_bson());

        let updated = self
            .chapters()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": update })
            .with_options(
                mongodb::options::FindOneAndUpdateOptions::builder()
                    .return_document(mongodb::options::ReturnDocument::After)
                    .build(),
            )
            .await
            .context("Failed to update chapter")?
            .ok_or_else(|| ApiError::not_found("Chapter not found"))?;

        Ok(ChapterView::from_doc(&updated))
    }

    /// The whole target list is validated before the first write: one unknown
    /// id fails the operation with nothing reordered.
    pub async fn reorder_chapters(
        &self,
        course_id: &str,
        ordered_ids: &[String],
    ) -> Result<Vec<ChapterView>, ApiError> {
        let existing = self.list_chapters(course_id).await?;
        let target = resolve_reorder_targets(ordered_ids, existing.iter().map(|c| c.id), "Chapter")?;

        let now = now_bson();
        for (id, order) in &target {
            self.chapters()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$set": { "order": order, "updated_at": now } },
                )
                .await
                .context("Failed to write chapter order")?;
        }

        let reordered = self.list_chapters(course_id).await?;
        Ok(reordered.iter().map(ChapterView::from_doc).collect())
    }

    /// Cascades to the chapter's content items and every progress record
    /// referencing them.
    pub async fn delete_chapter(&self, chapter_id: &str) -> Result<(), ApiError> {
        let id = parse_chapter_id(chapter_id)?;
        let chapter = self
            .chapters()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to load chapter")?
            .ok_or_else(|| ApiError::not_found("Chapter not found"))?;

        let items: Vec<ContentItem> = self
            .items()
            .find(doc! { "chapter_id": id })
            .await
            .context("Failed to load chapter items")?
            .try_collect()
            .await
            .context("Chapter items cursor failed")?;

        self.delete_progress_for_items(&items).await?;

        self.items()
            .delete_many(doc! { "chapter_id": id })
            .await
            .context("Failed to delete chapter items")?;

        self.chapters()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete chapter")?;

        tracing::info!(
            "Deleted chapter {} ({} items) from course {}",
            chapter_id,
            items.len(),
            chapter.course_id
        );

        Ok(())
    }

    pub async fn create_content_item(
        &self,
        chapter_id: &str,
        req: CreateContentItemRequest,
    ) -> Result<ContentItemView, ApiError> {
        let id = parse_chapter_id(chapter_id)?;
        let chapter = self
            .chapters()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to load chapter")?
            .ok_or_else(|| ApiError::not_found("Chapter not found"))?;

        let payload = self.resolve_payload(req.payload).await?;
        let order = self.next_item_order(&id).await?;
        let now = now_bson();

        let item = ContentItem {
            id: ObjectId::new(),
            course_id: chapter.course_id.clone(),
            chapter_id: id,
            order,
            payload,
            created_at: now,
            updated_at: now,
        };

        self.items()
            .insert_one(&item)
            .await
            .context("Failed to insert content item")?;

        tracing::info!(
            "Created {} item {} in chapter {}",
            item.payload.content_type(),
            item.id.to_hex(),
            chapter_id
        );

        Ok(ContentItemView::from_doc(&item))
    }

    pub async fn reorder_content_items(
        &self,
        chapter_id: &str,
        ordered_ids: &[String],
    ) -> Result<Vec<ContentItemView>, ApiError> {
        let id = parse_chapter_id(chapter_id)?;
        let existing: Vec<ContentItem> = self
            .items()
            .find(doc! { "chapter_id": id })
            .await
            .context("Failed to load chapter items")?
            .try_collect()
            .await
            .context("Chapter items cursor failed")?;

        let target =
            resolve_reorder_targets(ordered_ids, existing.iter().map(|i| i.id), "Content item")?;

        let now = now_bson();
        for (item_id, order) in &target {
            self.items()
                .update_one(
                    doc! { "_id": item_id },
                    doc! { "$set": { "order": order, "updated_at": now } },
                )
                .await
                .context("Failed to write content item order")?;
        }

        let reordered = self.list_items_for_chapters(&[id]).await?;
        Ok(reordered.iter().map(ContentItemView::from_doc).collect())
    }

    /// Re-parents an item, appending it to the end of the target chapter.
    pub async fn move_content_item(
        &self,
        item_id: &str,
        req: MoveContentItemRequest,
    ) -> Result<ContentItemView, ApiError> {
        let id = parse_item_id(item_id)?;
        let target_chapter_id = parse_chapter_id(&req.chapter_id)?;

        let target_chapter = self
            .chapters()
            .find_one(doc! { "_id": target_chapter_id })
            .await
            .context("Failed to load target chapter")?
            .ok_or_else(|| ApiError::not_found("Target chapter not found"))?;

        let order = self.next_item_order(&target_chapter_id).await?;

        let updated = self
            .items()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": {
                    "chapter_id": target_chapter_id,
                    "course_id": &target_chapter.course_id,
                    "order": order,
                    "updated_at": now_bson(),
                } },
            )
            .with_options(
                mongodb::options::FindOneAndUpdateOptions::builder()
                    .return_document(mongodb::options::ReturnDocument::After)
                    .build(),
            )
            .await
            .context("Failed to move content item")?
            .ok_or_else(|| ApiError::not_found("Content item not found"))?;

        Ok(ContentItemView::from_doc(&updated))
    }

    pub async fn delete_content_item(&self, item_id: &str) -> Result<(), ApiError> {
        let id = parse_item_id(item_id)?;
        let item = self
            .items()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to load content item")?
            .ok_or_else(|| ApiError::not_found("Content item not found"))?;

        self.delete_progress_for_items(std::slice::from_ref(&item))
            .await?;

        self.items()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete content item")?;

        tracing::info!(
            "Deleted {} item {}",
            item.payload.content_type(),
            item_id
        );

        Ok(())
    }

    pub async fn course_content(&self, course_id: &str) -> Result<CourseContentResponse, ApiError> {
        let chapters = self.list_chapters(course_id).await?;
        let chapter_ids: Vec<ObjectId> = chapters.iter().map(|c| c.id).collect();
        let items = self.list_items_for_chapters(&chapter_ids).await?;

        let chapters = chapters
            .iter()
            .map(|chapter| ChapterWithItems {
                chapter: ChapterView::from_doc(chapter),
                items: items
                    .iter()
                    .filter(|item| item.chapter_id == chapter.id)
                    .map(ContentItemView::from_doc)
                    .collect(),
            })
            .collect();

        Ok(CourseContentResponse {
            course_id: course_id.to_string(),
            chapters,
        })
    }

    /// Chapters of a course sorted by order.
    pub async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>, ApiError> {
        let options = FindOptions::builder().sort(doc! { "order": 1 }).build();
        let chapters = self
            .chapters()
            .find(doc! { "course_id": course_id })
            .with_options(options)
            .await
            .context("Failed to load chapters")?
            .try_collect()
            .await
            .context("Chapter cursor failed")?;
        Ok(chapters)
    }

    /// Content items of the given chapters sorted by (chapter, order).
    pub async fn list_items_for_chapters(
        &self,
        chapter_ids: &[ObjectId],
    ) -> Result<Vec<ContentItem>, ApiError> {
        if chapter_ids.is_empty() {
            return Ok(Vec::new());
        }
        let options = FindOptions::builder()
            .sort(doc! { "chapter_id": 1, "order": 1 })
            .build();
        let items: Vec<ContentItem> = self
            .items()
            .find(doc! { "chapter_id": { "$in": chapter_ids } })
            .with_options(options)
            .await
            .context("Failed to load content items")?
            .try_collect()
            .await
            .context("Content item cursor failed")?;
        Ok(items)
    }

    pub async fn find_item(&self, item_id: &ObjectId) -> Result<Option<ContentItem>, ApiError> {
        let item = self
            .items()
            .find_one(doc! { "_id": item_id })
            .await
            .context("Failed to load content item")?;
        Ok(item)
    }

    async fn resolve_payload(
        &self,
        input: ContentPayloadInput,
    ) -> Result<ContentPayload, ApiError> {
        match input {
            ContentPayloadInput::Video {
                title,
                url,
                length_seconds,
            } => {
                if title.is_empty() {
                    return Err(ApiError::validation("video title is required"));
                }
                Ok(ContentPayload::Video {
                    title,
                    url,
                    length_seconds,
                })
            }
            ContentPayloadInput::Document {
                title,
                url,
                total_pages,
            } => {
                if title.is_empty() {
                    return Err(ApiError::validation("document title is required"));
                }
                Ok(ContentPayload::Document {
                    title,
                    url,
                    total_pages,
                })
            }
            ContentPayloadInput::Assessment { assessment_id } => {
                let id = ObjectId::parse_str(&assessment_id)
                    .map_err(|_| ApiError::validation("Invalid assessment_id"))?;
                let count = self
                    .mongo
                    .collection::<mongodb::bson::Document>(ASSESSMENTS)
                    .count_documents(doc! { "_id": id })
                    .await
                    .context("Failed to verify assessment exists")?;
                if count == 0 {
                    return Err(ApiError::not_found("Assessment not found"));
                }
                Ok(ContentPayload::Assessment { assessment_id: id })
            }
        }
    }

    async fn next_chapter_order(&self, course_id: &str) -> Result<i32, ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "order": -1 })
            .limit(1)
            .build();
        let last: Option<Chapter> = self
            .chapters()
            .find(doc! { "course_id": course_id })
            .with_options(options)
            .await
            .context("Failed to query chapter order")?
            .try_next()
            .await
            .context("Chapter order cursor failed")?;
        Ok(last.map(|c| c.order + 1).unwrap_or(1))
    }

    async fn next_item_order(&self, chapter_id: &ObjectId) -> Result<i32, ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "order": -1 })
            .limit(1)
            .build();
        let last: Option<ContentItem> = self
            .items()
            .find(doc! { "chapter_id": chapter_id })
            .with_options(options)
            .await
            .context("Failed to query item order")?
            .try_next()
            .await
            .context("Item order cursor failed")?;
        Ok(last.map(|i| i.order + 1).unwrap_or(1))
    }

    async fn delete_progress_for_items(&self, items: &[ContentItem]) -> Result<(), ApiError> {
        let video_ids: Vec<String> = items
            .iter()
            .filter(|i| matches!(i.payload, ContentPayload::Video { .. }))
            .map(|i| i.id.to_hex())
            .collect();
        let document_ids: Vec<String> = items
            .iter()
            .filter(|i| matches!(i.payload, ContentPayload::Document { .. }))
            .map(|i| i.id.to_hex())
            .collect();

        if !video_ids.is_empty() {
            self.mongo
                .collection::<mongodb::bson::Document>(VIDEO_PROGRESS)
                .delete_many(doc! { "video_id": { "$in": video_ids } })
                .await
                .context("Failed to cascade video progress delete")?;
        }
        if !document_ids.is_empty() {
            self.mongo
                .collection::<mongodb::bson::Document>(DOCUMENT_PROGRESS)
                .delete_many(doc! { "document_id": { "$in": document_ids } })
                .await
                .context("Failed to cascade document progress delete")?;
        }
        Ok(())
    }
}

fn parse_chapter_id(value: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::validation("Invalid chapter id"))
}

fn parse_item_id(value: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::validation("Invalid content item id"))
}

/// Maps every input id to its 1-based position, failing the whole batch with
/// `NotFound` when any id does not resolve against the existing set.
fn resolve_reorder_targets(
    ordered_ids: &[String],
    existing: impl Iterator<Item = ObjectId>,
    entity: &str,
) -> Result<Vec<(ObjectId, i32)>, ApiError> {
    let known: std::collections::HashSet<ObjectId> = existing.collect();

    let mut target = Vec::with_capacity(ordered_ids.len());
    for (position, raw) in ordered_ids.iter().enumerate() {
        let id = ObjectId::parse_str(raw)
            .ok()
            .filter(|id| known.contains(id))
            .ok_or_else(|| ApiError::not_found(format!("{} {} not found", entity, raw)))?;
        target.push((id, position as i32 + 1));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_assigns_one_based_positions() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let c = ObjectId::new();
        let input = vec![c.to_hex(), a.to_hex(), b.to_hex()];

        let target =
            resolve_reorder_targets(&input, [a, b, c].into_iter(), "Chapter").unwrap();

        assert_eq!(target, vec![(c, 1), (a, 2), (b, 3)]);
    }

    #[test]
    fn reorder_rejects_unknown_id_before_any_write() {
        let a = ObjectId::new();
        let unknown = ObjectId::new();
        let input = vec![a.to_hex(), unknown.to_hex()];

        let err = resolve_reorder_targets(&input, [a].into_iter(), "Chapter").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn reorder_rejects_malformed_id() {
        let a = ObjectId::new();
        let input = vec!["not-hex".to_string()];

        let err = resolve_reorder_targets(&input, [a].into_iter(), "Content item").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
