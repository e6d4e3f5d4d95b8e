use anyhow::Context;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    options::FindOptions,
    Collection, Database,
};

use crate::{
    errors::ApiError,
    middlewares::auth::JwtClaims,
    models::engagement::{
        AddCommentRequest, CommentView, CourseComment, CourseRating, CourseRatingSummary,
        RateCourseRequest, WishlistEntry, WishlistView,
    },
    utils::time::now_bson,
};

const RATINGS: &str = "course_ratings";
const WISHLIST: &str = "wishlist";
const COMMENTS: &str = "course_comments";

/// Learner engagement: ratings, wishlists, comments.
pub struct EngagementService {
    mongo: Database,
}

impl EngagementService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn ratings(&self) -> Collection<CourseRating> {
        self.mongo.collection(RATINGS)
    }

    fn wishlist(&self) -> Collection<WishlistEntry> {
        self.mongo.collection(WISHLIST)
    }

    fn comments(&self) -> Collection<CourseComment> {
        self.mongo.collection(COMMENTS)
    }

    /// One rating per (user, course); rating again replaces the old value.
    pub async fn rate_course(
        &self,
        claims: &JwtClaims,
        course_id: &str,
        req: RateCourseRequest,
    ) -> Result<CourseRatingSummary, ApiError> {
        validator::Validate::validate(&req).map_err(|e| ApiError::validation(e.to_string()))?;

        let rating = CourseRating {
            id: CourseRating::key(&claims.sub, course_id),
            user_id: claims.sub.clone(),
            course_id: course_id.to_string(),
            rating: req.rating,
            review: req.review,
            updated_at: now_bson(),
        };

        self.ratings()
            .replace_one(doc! { "_id": &rating.id }, &rating)
            .with_options(mongodb::options::ReplaceOptions::builder().upsert(true).build())
            .await
            .context("Failed to upsert course rating")?;

        tracing::info!(
            "User {} rated course {} as {}",
            claims.sub,
            course_id,
            req.rating
        );

        self.course_rating(Some(claims), course_id).await
    }

    pub async fn course_rating(
        &self,
        claims: Option<&JwtClaims>,
        course_id: &str,
    ) -> Result<CourseRatingSummary, ApiError> {
        let ratings: Vec<CourseRating> = self
            .ratings()
            .find(doc! { "course_id": course_id })
            .await
            .context("Failed to load course ratings")?
            .try_collect()
            .await
            .context("Rating cursor failed")?;

        let count = ratings.len();
        let average = if count == 0 {
            0.0
        } else {
            let sum: i32 = ratings.iter().map(|r| r.rating).sum();
            (sum as f64 / count as f64 * 10.0).round() / 10.0
        };
        let own_rating = claims.and_then(|claims| {
            ratings
                .iter()
                .find(|r| r.user_id == claims.sub)
                .map(|r| r.rating)
        });

        Ok(CourseRatingSummary {
            course_id: course_id.to_string(),
            average,
            count,
            own_rating,
        })
    }

    /// Idempotent: adding a course already on the wishlist is a no-op.
    pub async fn add_to_wishlist(
        &self,
        claims: &JwtClaims,
        course_id: &str,
    ) -> Result<WishlistView, ApiError> {
        let entry = WishlistEntry {
            id: WishlistEntry::key(&claims.sub, course_id),
            user_id: claims.sub.clone(),
            course_id: course_id.to_string(),
            added_at: now_bson(),
        };

        self.wishlist()
            .replace_one(doc! { "_id": &entry.id }, &entry)
            .with_options(mongodb::options::ReplaceOptions::builder().upsert(true).build())
            .await
            .context("Failed to add wishlist entry")?;

        self.list_wishlist(claims).await
    }

    pub async fn remove_from_wishlist(
        &self,
        claims: &JwtClaims,
        course_id: &str,
    ) -> Result<WishlistView, ApiError> {
        self.wishlist()
            .delete_one(doc! { "_id": WishlistEntry::key(&claims.sub, course_id) })
            .await
            .context("Failed to remove wishlist entry")?;

        self.list_wishlist(claims).await
    }

    pub async fn list_wishlist(&self, claims: &JwtClaims) -> Result<WishlistView, ApiError> {
        let options = FindOptions::builder().sort(doc! { "added_at": -1 }).build();
        let entries: Vec<WishlistEntry> = self
            .wishlist()
            .find(doc! { "user_id": &claims.sub })
            .with_options(options)
            .await
            .context("Failed to load wishlist")?
            .try_collect()
            .await
            .context("Wishlist cursor failed")?;

        Ok(WishlistView {
            course_ids: entries.into_iter().map(|e| e.course_id).collect(),
        })
    }

    pub async fn add_comment(
        &self,
        claims: &JwtClaims,
        course_id: &str,
        req: AddCommentRequest,
    ) -> Result<CommentView, ApiError> {
        validator::Validate::validate(&req).map_err(|e| ApiError::validation(e.to_string()))?;

        let comment = CourseComment {
            id: ObjectId::new(),
            user_id: claims.sub.clone(),
            course_id: course_id.to_string(),
            text: req.text,
            created_at: now_bson(),
        };

        self.comments()
            .insert_one(&comment)
            .await
            .context("Failed to insert comment")?;

        Ok(CommentView::from_doc(&comment))
    }

    pub async fn list_comments(&self, course_id: &str) -> Result<Vec<CommentView>, ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let comments: Vec<CourseComment> = self
            .comments()
            .find(doc! { "course_id": course_id })
            .with_options(options)
            .await
            .context("Failed to load comments")?
            .try_collect()
            .await
            .context("Comment cursor failed")?;

        Ok(comments.iter().map(CommentView::from_doc).collect())
    }

    /// Comment owner or an admin; everyone else is `Forbidden`.
    pub async fn delete_comment(
        &self,
        claims: &JwtClaims,
        comment_id: &str,
    ) -> Result<(), ApiError> {
        let id = ObjectId::parse_str(comment_id)
            .map_err(|_| ApiError::validation("Invalid comment id"))?;

        let comment = self
            .comments()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to load comment")?
            .ok_or_else(|| ApiError::not_found("Comment not found"))?;

        if comment.user_id != claims.sub && !claims.is_admin() {
            return Err(ApiError::forbidden("Comment belongs to another user"));
        }

        self.comments()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete comment")?;

        Ok(())
    }
}
