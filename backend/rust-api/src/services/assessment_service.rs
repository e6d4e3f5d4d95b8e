use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Context;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson},
    options::FindOptions,
    Collection, Database,
};

use crate::{
    errors::ApiError,
    metrics::{ATTEMPTS_STARTED_TOTAL, ATTEMPTS_SUBMITTED_TOTAL},
    middlewares::auth::JwtClaims,
    models::assessment::{
        Assessment, AssessmentAttempt, AssessmentSummary, AssessmentView, AttemptAnswer,
        AttemptAnswerInput, AttemptView, CreateAssessmentRequest, ListAttemptsQuery, Question,
        QuestionInput, QuestionOption, StartAttemptRequest, SubmitAttemptRequest,
        UpdateAssessmentRequest, UserAttemptsResponse, DEFAULT_MAX_ATTEMPTS,
        DEFAULT_PASSING_SCORE, DEFAULT_TIME_LIMIT_SECONDS,
    },
    utils::time::now_bson,
};

const ASSESSMENTS: &str = "assessments";
const ATTEMPTS: &str = "assessment_attempts";

pub struct AssessmentService {
    mongo: Database,
}

impl AssessmentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn assessments(&self) -> Collection<Assessment> {
        self.mongo.collection(ASSESSMENTS)
    }

    fn attempts(&self) -> Collection<AssessmentAttempt> {
        self.mongo.collection(ATTEMPTS)
    }

    pub async fn create_assessment(
        &self,
        req: CreateAssessmentRequest,
    ) -> Result<Assessment, ApiError> {
        let title = require_text(req.title, "title")?;
        let description = require_text(req.description, "description")?;
        // Zero questions is a valid draft.
        let questions = build_questions(req.questions)?;

        let now = now_bson();
        let assessment = Assessment {
            id: ObjectId::new(),
            title,
            description,
            questions,
            passing_score: coerce_passing_score(req.passing_score),
            time_limit: req
                .time_limit
                .map(|v| v.round() as i64)
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_TIME_LIMIT_SECONDS),
            max_attempts: req
                .max_attempts
                .map(|v| v.round() as i32)
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            is_published: req.is_published.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };

        self.assessments()
            .insert_one(&assessment)
            .await
            .context("Failed to insert assessment")?;

        tracing::info!(
            "Created assessment {} with {} questions",
            assessment.id.to_hex(),
            assessment.questions.len()
        );

        Ok(assessment)
    }

    pub async fn get_assessment(&self, assessment_id: &str) -> Result<Assessment, ApiError> {
        let id = parse_assessment_id(assessment_id)?;
        self.assessments()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to load assessment")?
            .ok_or_else(|| ApiError::not_found("Assessment not found"))
    }

    /// PUT and PATCH share this path: scalars fall back to the stored value
    /// when missing, the question set is replaced only when the key is
    /// present.
    pub async fn update_assessment(
        &self,
        assessment_id: &str,
        req: UpdateAssessmentRequest,
    ) -> Result<Assessment, ApiError> {
        let current = self.get_assessment(assessment_id).await?;

        let questions = match req.questions {
            Some(inputs) => build_questions(inputs)?,
            None => current.questions,
        };

        let updated = Assessment {
            id: current.id,
            title: match req.title {
                Some(title) if !title.trim().is_empty() => title,
                Some(_) => return Err(ApiError::validation("title must not be empty")),
                None => current.title,
            },
            description: req.description.unwrap_or(current.description),
            questions,
            passing_score: req
                .passing_score
                .map(|v| (v.round() as i32).clamp(0, 100))
                .unwrap_or(current.passing_score),
            time_limit: req
                .time_limit
                .map(|v| v.round() as i64)
                .filter(|v| *v > 0)
                .unwrap_or(current.time_limit),
            max_attempts: req
                .max_attempts
                .map(|v| v.round() as i32)
                .filter(|v| *v > 0)
                .unwrap_or(current.max_attempts),
            is_published: req.is_published.unwrap_or(current.is_published),
            created_at: current.created_at,
            updated_at: now_bson(),
        };

        self.assessments()
            .replace_one(doc! { "_id": updated.id }, &updated)
            .await
            .context("Failed to update assessment")?;

        Ok(updated)
    }

    /// Rewrites the embedded question list as a single document update, so
    /// the reorder is atomic: it either fully applies or not at all.
    pub async fn reorder_questions(
        &self,
        assessment_id: &str,
        ordered_ids: &[String],
    ) -> Result<Assessment, ApiError> {
        let mut assessment = self.get_assessment(assessment_id).await?;

        assessment.questions = reorder_question_list(assessment.questions, ordered_ids)?;
        assessment.updated_at = now_bson();

        let questions_bson =
            to_bson(&assessment.questions).context("Failed to encode question list")?;
        self.assessments()
            .update_one(
                doc! { "_id": assessment.id },
                doc! { "$set": { "questions": questions_bson, "updated_at": assessment.updated_at } },
            )
            .await
            .context("Failed to write question order")?;

        Ok(assessment)
    }

    pub async fn delete_assessment(&self, assessment_id: &str) -> Result<(), ApiError> {
        let id = parse_assessment_id(assessment_id)?;
        let deleted = self
            .assessments()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete assessment")?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::not_found("Assessment not found"));
        }
        Ok(())
    }

    /// Idempotent resume: an existing incomplete attempt is returned
    /// unchanged instead of creating a duplicate.
    pub async fn start_attempt(
        &self,
        claims: &JwtClaims,
        assessment_id: &str,
        req: StartAttemptRequest,
    ) -> Result<AttemptView, ApiError> {
        ensure_owner(claims, &req.user_id)?;

        let assessment = self.get_assessment(assessment_id).await?;
        if !assessment.is_published {
            return Err(ApiError::forbidden("Assessment is not available"));
        }

        let chapter_id = ObjectId::parse_str(&req.chapter_id)
            .map_err(|_| ApiError::validation("Invalid chapter id"))?;

        let key_filter = doc! {
            "user_id": &req.user_id,
            "assessment_id": assessment.id,
            "course_id": &req.course_id,
            "chapter_id": chapter_id,
        };

        let mut completed_filter = key_filter.clone();
        completed_filter.insert("completed", true);
        let completed_count = self
            .attempts()
            .count_documents(completed_filter)
            .await
            .context("Failed to count completed attempts")? as i64;

        ensure_attempts_left(completed_count, assessment.max_attempts)?;

        let mut incomplete_filter = key_filter.clone();
        incomplete_filter.insert("completed", false);
        if let Some(existing) = self
            .attempts()
            .find_one(incomplete_filter)
            .await
            .context("Failed to look up open attempt")?
        {
            ATTEMPTS_STARTED_TOTAL.with_label_values(&["true"]).inc();
            tracing::info!(
                "Resuming attempt {} for user {}",
                existing.id.to_hex(),
                req.user_id
            );
            return Ok(AttemptView::from_doc(&existing));
        }

        let attempt = AssessmentAttempt {
            id: ObjectId::new(),
            user_id: req.user_id.clone(),
            assessment_id: assessment.id,
            course_id: req.course_id.clone(),
            chapter_id,
            attempt_number: completed_count as i32 + 1,
            attempts_remaining: assessment.max_attempts - completed_count as i32 - 1,
            answers: Vec::new(),
            score: 0,
            passed: false,
            completed: false,
            time_taken: 0.0,
            date_completed: None,
            created_at: now_bson(),
        };

        self.attempts()
            .insert_one(&attempt)
            .await
            .context("Failed to insert attempt")?;

        ATTEMPTS_STARTED_TOTAL.with_label_values(&["false"]).inc();
        tracing::info!(
            "Started attempt {} ({}/{}) for user {}",
            attempt.id.to_hex(),
            attempt.attempt_number,
            assessment.max_attempts,
            req.user_id
        );

        Ok(AttemptView::from_doc(&attempt))
    }

    /// One-shot grading: the incomplete -> completed transition happens
    /// exactly once; resubmission is a `Conflict`.
    pub async fn submit_attempt(
        &self,
        claims: &JwtClaims,
        attempt_id: &str,
        req: SubmitAttemptRequest,
    ) -> Result<AttemptView, ApiError> {
        let id = ObjectId::parse_str(attempt_id)
            .map_err(|_| ApiError::validation("Invalid attempt id"))?;

        let attempt = self
            .attempts()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to load attempt")?
            .ok_or_else(|| ApiError::not_found("Attempt not found"))?;

        if attempt.user_id != claims.sub {
            return Err(ApiError::forbidden("Attempt belongs to another user"));
        }
        if attempt.completed {
            return Err(ApiError::conflict("Attempt has already been submitted"));
        }

        let assessment = self
            .assessments()
            .find_one(doc! { "_id": attempt.assessment_id })
            .await
            .context("Failed to load assessment for grading")?
            .ok_or_else(|| ApiError::not_found("Assessment no longer exists"))?;

        let (answers, earned, total) = grade_attempt(&assessment.questions, &req.answers);
        let score = compute_score(earned, total);
        let passed = score >= assessment.passing_score;

        let answers_bson = to_bson(&answers).context("Failed to encode graded answers")?;
        let date_completed = now_bson();
        let update_result = self
            .attempts()
            .update_one(
                doc! { "_id": id, "completed": false },
                doc! { "$set": {
                    "answers": answers_bson,
                    "score": score,
                    "passed": passed,
                    "completed": true,
                    "time_taken": req.time_taken,
                    "date_completed": date_completed,
                } },
            )
            .await
            .context("Failed to finalize attempt")?;

        // A concurrent submit can win the completed=false filter race.
        if update_result.modified_count == 0 {
            return Err(ApiError::conflict("Attempt has already been submitted"));
        }

        ATTEMPTS_SUBMITTED_TOTAL
            .with_label_values(&[if passed { "true" } else { "false" }])
            .inc();

        tracing::info!(
            "Graded attempt {}: score={} passed={} ({} of {} points)",
            attempt_id,
            score,
            passed,
            earned,
            total
        );

        let graded = AssessmentAttempt {
            answers,
            score,
            passed,
            completed: true,
            time_taken: req.time_taken,
            date_completed: Some(date_completed),
            ..attempt
        };

        Ok(AttemptView::from_doc(&graded))
    }

    pub async fn get_user_attempts(
        &self,
        claims: &JwtClaims,
        assessment_id: &str,
        query: ListAttemptsQuery,
    ) -> Result<UserAttemptsResponse, ApiError> {
        if claims.sub != query.user_id && !claims.is_instructor() {
            return Err(ApiError::forbidden(
                "Attempts can only be listed for your own account",
            ));
        }

        let assessment = self.get_assessment(assessment_id).await?;
        let chapter_id = ObjectId::parse_str(&query.chapter_id)
            .map_err(|_| ApiError::validation("Invalid chapter id"))?;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let attempts: Vec<AssessmentAttempt> = self
            .attempts()
            .find(doc! {
                "user_id": &query.user_id,
                "assessment_id": assessment.id,
                "course_id": &query.course_id,
                "chapter_id": chapter_id,
            })
            .with_options(options)
            .await
            .context("Failed to load attempts")?
            .try_collect()
            .await
            .context("Attempt cursor failed")?;

        Ok(UserAttemptsResponse {
            assessment: AssessmentSummary {
                id: assessment.id.to_hex(),
                title: assessment.title.clone(),
                max_attempts: assessment.max_attempts,
                passing_score: assessment.passing_score,
            },
            attempts: attempts.iter().map(AttemptView::from_doc).collect(),
        })
    }

    pub fn view(&self, assessment: &Assessment, claims: &JwtClaims) -> AssessmentView {
        AssessmentView::from_doc(assessment, claims.is_instructor())
    }
}

fn parse_assessment_id(value: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::validation("Invalid assessment id"))
}

fn ensure_owner(claims: &JwtClaims, user_id: &str) -> Result<(), ApiError> {
    if claims.sub == user_id {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Attempts can only be started for your own account",
        ))
    }
}

fn require_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::validation(format!("{} is required", field)))
}

/// Validates and normalizes the question set. `order` is always derived from
/// array position; validation failures name the 1-based question index.
fn build_questions(inputs: Vec<QuestionInput>) -> Result<Vec<Question>, ApiError> {
    let mut questions = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let number = index + 1;

        let text = input
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ApiError::validation(format!("Question {}: text is required", number))
            })?;

        let options = input.options.unwrap_or_default();
        if options.is_empty() {
            return Err(ApiError::validation(format!(
                "Question {}: at least one option is required",
                number
            )));
        }
        if !options.iter().any(|o| o.is_correct) {
            return Err(ApiError::validation(format!(
                "Question {}: at least one option must be marked correct",
                number
            )));
        }

        let id = input
            .id
            .as_deref()
            .and_then(|raw| ObjectId::parse_str(raw).ok())
            .unwrap_or_else(ObjectId::new);

        questions.push(Question {
            id,
            text,
            options: options
                .into_iter()
                .map(|o| QuestionOption {
                    text: o.text,
                    is_correct: o.is_correct,
                })
                .collect(),
            points: input
                .points
                .map(|p| p.round() as i32)
                .filter(|p| *p > 0)
                .unwrap_or(1),
            order: number as i32,
        });
    }
    Ok(questions)
}

fn coerce_passing_score(value: Option<f64>) -> i32 {
    value
        .map(|v| (v.round() as i32).clamp(0, 100))
        .unwrap_or(DEFAULT_PASSING_SCORE)
}

fn ensure_attempts_left(completed_count: i64, max_attempts: i32) -> Result<(), ApiError> {
    if completed_count >= max_attempts as i64 {
        Err(ApiError::limit_exceeded(format!(
            "Maximum of {} attempts reached",
            max_attempts
        )))
    } else {
        Ok(())
    }
}

/// Listed questions take the 1-based position of their index in the input;
/// any id that does not resolve fails the whole reorder. Questions missing
/// from the input keep their relative order after the listed ones, so the
/// sequence stays contiguous 1..N.
fn reorder_question_list(
    questions: Vec<Question>,
    ordered_ids: &[String],
) -> Result<Vec<Question>, ApiError> {
    let mut by_id: HashMap<ObjectId, Question> =
        questions.iter().map(|q| (q.id, q.clone())).collect();

    let mut seen = HashSet::new();
    let mut reordered = Vec::with_capacity(questions.len());
    for raw in ordered_ids {
        let id = ObjectId::parse_str(raw)
            .ok()
            .filter(|id| by_id.contains_key(id))
            .ok_or_else(|| ApiError::not_found(format!("Question {} not found", raw)))?;
        if !seen.insert(id) {
            return Err(ApiError::validation(format!(
                "Question {} listed more than once",
                raw
            )));
        }
        reordered.push(by_id.remove(&id).expect("id checked above"));
    }

    let mut remaining: Vec<Question> = questions
        .iter()
        .filter(|q| by_id.contains_key(&q.id))
        .cloned()
        .collect();
    reordered.append(&mut remaining);

    for (index, question) in reordered.iter_mut().enumerate() {
        question.order = index as i32 + 1;
    }
    Ok(reordered)
}

/// All-or-nothing per question: an answer is correct iff the selected index
/// set equals the correct index set exactly. Answers referencing questions
/// that no longer exist are skipped and contribute nothing.
fn grade_attempt(
    questions: &[Question],
    answers: &[AttemptAnswerInput],
) -> (Vec<AttemptAnswer>, i32, i32) {
    let by_id: HashMap<String, &Question> =
        questions.iter().map(|q| (q.id.to_hex(), q)).collect();

    let total: i32 = questions.iter().map(|q| q.points).sum();
    let mut earned = 0;
    let mut graded = Vec::with_capacity(answers.len());

    for answer in answers {
        let Some(question) = by_id.get(&answer.question_id) else {
            continue;
        };

        let selected: BTreeSet<usize> = answer.selected_option_indices.iter().copied().collect();
        let correct: BTreeSet<usize> = question.correct_indices().into_iter().collect();
        let is_correct = !correct.is_empty() && selected == correct;

        if is_correct {
            earned += question.points;
        }

        graded.push(AttemptAnswer {
            question_id: question.id,
            question_order: question.order,
            selected_option_indices: selected.into_iter().map(|i| i as i32).collect(),
            is_correct,
        });
    }

    (graded, earned, total)
}

fn compute_score(earned: i32, total: i32) -> i32 {
    if total == 0 {
        return 0;
    }
    ((earned as f64 / total as f64) * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, correct: &[usize], option_count: usize, points: i32, order: i32) -> Question {
        Question {
            id: ObjectId::new(),
            text: text.to_string(),
            options: (0..option_count)
                .map(|i| QuestionOption {
                    text: format!("option {}", i),
                    is_correct: correct.contains(&i),
                })
                .collect(),
            points,
            order,
        }
    }

    fn answer(question: &Question, selected: &[usize]) -> AttemptAnswerInput {
        AttemptAnswerInput {
            question_id: question.id.to_hex(),
            selected_option_indices: selected.to_vec(),
        }
    }

    #[test]
    fn grading_is_all_or_nothing_per_question() {
        let q = question("pick all", &[0, 1, 2], 4, 1, 1);
        let (graded, earned, total) = grade_attempt(&[q.clone()], &[answer(&q, &[0, 2])]);

        assert_eq!(total, 1);
        assert_eq!(earned, 0);
        assert!(!graded[0].is_correct);
    }

    #[test]
    fn exact_set_match_scores_full_points() {
        let q = question("pick all", &[1, 2], 3, 2, 1);
        // order of selection does not matter
        let (graded, earned, _) = grade_attempt(&[q.clone()], &[answer(&q, &[2, 1])]);

        assert_eq!(earned, 2);
        assert!(graded[0].is_correct);
        assert_eq!(graded[0].selected_option_indices, vec![1, 2]);
    }

    #[test]
    fn two_question_scoring_scenario() {
        let q1 = question("q1", &[0], 2, 1, 1);
        let q2 = question("q2", &[1, 2], 3, 2, 2);
        let questions = vec![q1.clone(), q2.clone()];

        let (_, earned, total) =
            grade_attempt(&questions, &[answer(&q1, &[0]), answer(&q2, &[1, 2])]);
        assert_eq!((earned, total), (3, 3));
        assert_eq!(compute_score(earned, total), 100);

        let (_, earned, total) =
            grade_attempt(&questions, &[answer(&q1, &[0]), answer(&q2, &[1])]);
        assert_eq!((earned, total), (1, 3));
        assert_eq!(compute_score(earned, total), 33);
    }

    #[test]
    fn unknown_question_is_skipped_silently() {
        let q = question("kept", &[0], 2, 1, 1);
        let ghost = AttemptAnswerInput {
            question_id: ObjectId::new().to_hex(),
            selected_option_indices: vec![0],
        };

        let (graded, earned, total) = grade_attempt(&[q.clone()], &[ghost, answer(&q, &[0])]);

        assert_eq!(graded.len(), 1);
        assert_eq!((earned, total), (1, 1));
    }

    #[test]
    fn empty_question_set_scores_zero() {
        let (graded, earned, total) = grade_attempt(&[], &[]);
        assert!(graded.is_empty());
        assert_eq!(compute_score(earned, total), 0);
    }

    #[test]
    fn attempt_limit_enforced() {
        assert!(ensure_attempts_left(0, 1).is_ok());
        assert!(matches!(
            ensure_attempts_left(1, 1),
            Err(ApiError::LimitExceeded(_))
        ));
        assert!(ensure_attempts_left(2, 3).is_ok());
        assert!(matches!(
            ensure_attempts_left(3, 3),
            Err(ApiError::LimitExceeded(_))
        ));
    }

    #[test]
    fn build_questions_validates_with_index() {
        let inputs = vec![
            QuestionInput {
                id: None,
                text: Some("ok".to_string()),
                options: Some(vec![crate::models::assessment::OptionInput {
                    text: "a".to_string(),
                    is_correct: true,
                }]),
                points: None,
            },
            QuestionInput {
                id: None,
                text: Some("no correct option".to_string()),
                options: Some(vec![crate::models::assessment::OptionInput {
                    text: "a".to_string(),
                    is_correct: false,
                }]),
                points: None,
            },
        ];

        let err = build_questions(inputs).unwrap_err();
        match err {
            ApiError::Validation(msg) => assert!(msg.starts_with("Question 2:"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn build_questions_renumbers_from_position() {
        let inputs = vec![
            QuestionInput {
                id: None,
                text: Some("first".to_string()),
                options: Some(vec![crate::models::assessment::OptionInput {
                    text: "a".to_string(),
                    is_correct: true,
                }]),
                points: Some(3.0),
            },
            QuestionInput {
                id: None,
                text: Some("second".to_string()),
                options: Some(vec![crate::models::assessment::OptionInput {
                    text: "b".to_string(),
                    is_correct: true,
                }]),
                points: None,
            },
        ];

        let questions = build_questions(inputs).unwrap();
        assert_eq!(questions[0].order, 1);
        assert_eq!(questions[0].points, 3);
        assert_eq!(questions[1].order, 2);
        assert_eq!(questions[1].points, 1);
    }

    #[test]
    fn reorder_moves_listed_questions_to_front() {
        let a = question("a", &[0], 1, 1, 1);
        let b = question("b", &[0], 1, 1, 2);
        let c = question("c", &[0], 1, 1, 3);
        let input = vec![c.id.to_hex(), a.id.to_hex(), b.id.to_hex()];

        let reordered = reorder_question_list(vec![a.clone(), b.clone(), c.clone()], &input).unwrap();

        assert_eq!(reordered[0].id, c.id);
        assert_eq!(reordered[1].id, a.id);
        assert_eq!(reordered[2].id, b.id);
        assert_eq!(
            reordered.iter().map(|q| q.order).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn reorder_rejects_unknown_question() {
        let a = question("a", &[0], 1, 1, 1);
        let input = vec![ObjectId::new().to_hex()];

        let err = reorder_question_list(vec![a], &input).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn passing_score_clamps_to_percent_range() {
        assert_eq!(coerce_passing_score(None), DEFAULT_PASSING_SCORE);
        assert_eq!(coerce_passing_score(Some(150.0)), 100);
        assert_eq!(coerce_passing_score(Some(42.4)), 42);
    }
}
