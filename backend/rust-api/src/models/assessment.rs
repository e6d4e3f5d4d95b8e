use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::time::bson_to_rfc3339;

pub const DEFAULT_PASSING_SCORE: i32 = 70;
pub const DEFAULT_TIME_LIMIT_SECONDS: i64 = 1800;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: ObjectId,
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub points: i32,
    pub order: i32,
}

impl Question {
    /// Indices of the options flagged correct, in ascending order.
    pub fn correct_indices(&self) -> Vec<usize> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, option)| option.is_correct)
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub passing_score: i32,
    pub time_limit: i64,
    pub max_attempts: i32,
    #[serde(default)]
    pub is_published: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Graded answer stored on the attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptAnswer {
    pub question_id: ObjectId,
    pub question_order: i32,
    pub selected_option_indices: Vec<i32>,
    pub is_correct: bool,
}

/// One learner pass through an assessment. `NONE -> IN_PROGRESS -> COMPLETED`,
/// where `completed = true` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentAttempt {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    pub assessment_id: ObjectId,
    pub course_id: String,
    pub chapter_id: ObjectId,
    pub attempt_number: i32,
    pub attempts_remaining: i32,
    #[serde(default)]
    pub answers: Vec<AttemptAnswer>,
    pub score: i32,
    pub passed: bool,
    pub completed: bool,
    pub time_taken: f64,
    pub date_completed: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
}

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OptionInput {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// The legacy API accepted both `text` and `question` for the question text;
/// the alias keeps old clients working.
#[derive(Debug, Deserialize)]
pub struct QuestionInput {
    pub id: Option<String>,
    #[serde(alias = "question")]
    pub text: Option<String>,
    pub options: Option<Vec<OptionInput>>,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub points: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAssessmentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub passing_score: Option<f64>,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub time_limit: Option<f64>,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub max_attempts: Option<f64>,
    pub is_published: Option<bool>,
}

/// Shared by PUT (merge-on-missing scalars, full question replace when the
/// key is present) and PATCH (set only what is present); the two differ in
/// route semantics, not payload shape.
#[derive(Debug, Deserialize)]
pub struct UpdateAssessmentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub questions: Option<Vec<QuestionInput>>,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub passing_score: Option<f64>,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub time_limit: Option<f64>,
    #[serde(default, deserialize_with = "super::coerce_opt_f64")]
    pub max_attempts: Option<f64>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub user_id: String,
    pub course_id: String,
    pub chapter_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AttemptAnswerInput {
    pub question_id: String,
    #[serde(default)]
    pub selected_option_indices: Vec<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    #[serde(default)]
    pub answers: Vec<AttemptAnswerInput>,
    #[serde(default, deserialize_with = "super::coerce_f64")]
    pub time_taken: f64,
}

#[derive(Debug, Deserialize)]
pub struct ListAttemptsQuery {
    pub user_id: String,
    pub course_id: String,
    pub chapter_id: String,
}

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub options: Vec<OptionView>,
    pub points: i32,
    pub order: i32,
}

#[derive(Debug, Serialize)]
pub struct AssessmentView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub questions: Vec<QuestionView>,
    pub passing_score: i32,
    pub time_limit: i64,
    pub max_attempts: i32,
    pub is_published: bool,
    pub updated_at: String,
}

impl AssessmentView {
    /// Learner-facing views never expose the answer key.
    pub fn from_doc(assessment: &Assessment, include_answers: bool) -> Self {
        let questions = assessment
            .questions
            .iter()
            .map(|q| QuestionView {
                id: q.id.to_hex(),
                text: q.text.clone(),
                options: q
                    .options
                    .iter()
                    .map(|o| OptionView {
                        text: o.text.clone(),
                        is_correct: include_answers.then_some(o.is_correct),
                    })
                    .collect(),
                points: q.points,
                order: q.order,
            })
            .collect();

        Self {
            id: assessment.id.to_hex(),
            title: assessment.title.clone(),
            description: assessment.description.clone(),
            questions,
            passing_score: assessment.passing_score,
            time_limit: assessment.time_limit,
            max_attempts: assessment.max_attempts,
            is_published: assessment.is_published,
            updated_at: bson_to_rfc3339(assessment.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptView {
    pub id: String,
    pub assessment_id: String,
    pub attempt_number: i32,
    pub attempts_remaining: i32,
    pub answers: Vec<AttemptAnswerView>,
    pub score: i32,
    pub passed: bool,
    pub completed: bool,
    pub time_taken: f64,
    pub date_completed: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct AttemptAnswerView {
    pub question_id: String,
    pub question_order: i32,
    pub selected_option_indices: Vec<i32>,
    pub is_correct: bool,
}

impl AttemptView {
    pub fn from_doc(attempt: &AssessmentAttempt) -> Self {
        Self {
            id: attempt.id.to_hex(),
            assessment_id: attempt.assessment_id.to_hex(),
            attempt_number: attempt.attempt_number,
            attempts_remaining: attempt.attempts_remaining,
            answers: attempt
                .answers
                .iter()
                .map(|a| AttemptAnswerView {
                    question_id: a.question_id.to_hex(),
                    question_order: a.question_order,
                    selected_option_indices: a.selected_option_indices.clone(),
                    is_correct: a.is_correct,
                })
                .collect(),
            score: attempt.score,
            passed: attempt.passed,
            completed: attempt.completed,
            time_taken: attempt.time_taken,
            date_completed: attempt.date_completed.map(bson_to_rfc3339),
            created_at: bson_to_rfc3339(attempt.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssessmentSummary {
    pub id: String,
    pub title: String,
    pub max_attempts: i32,
    pub passing_score: i32,
}

#[derive(Debug, Serialize)]
pub struct UserAttemptsResponse {
    pub assessment: AssessmentSummary,
    pub attempts: Vec<AttemptView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::now_bson;

    fn sample_assessment() -> Assessment {
        Assessment {
            id: ObjectId::new(),
            title: "Checkpoint".to_string(),
            description: "End of chapter".to_string(),
            questions: vec![Question {
                id: ObjectId::new(),
                text: "2 + 2?".to_string(),
                options: vec![
                    QuestionOption {
                        text: "3".to_string(),
                        is_correct: false,
                    },
                    QuestionOption {
                        text: "4".to_string(),
                        is_correct: true,
                    },
                ],
                points: 1,
                order: 1,
            }],
            passing_score: DEFAULT_PASSING_SCORE,
            time_limit: DEFAULT_TIME_LIMIT_SECONDS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            is_published: true,
            created_at: now_bson(),
            updated_at: now_bson(),
        }
    }

    #[test]
    fn learner_view_never_contains_answer_key() {
        let view = AssessmentView::from_doc(&sample_assessment(), false);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("is_correct"));
    }

    #[test]
    fn instructor_view_contains_answer_key() {
        let view = AssessmentView::from_doc(&sample_assessment(), true);
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains(r#""is_correct":true"#));
    }

    #[test]
    fn question_text_accepts_legacy_alias() {
        let q: QuestionInput =
            serde_json::from_str(r#"{"question": "What is Rust?", "options": []}"#).unwrap();
        assert_eq!(q.text.as_deref(), Some("What is Rust?"));
    }

    #[test]
    fn correct_indices_are_sorted() {
        let question = Question {
            id: ObjectId::new(),
            text: "pick".to_string(),
            options: vec![
                QuestionOption {
                    text: "a".to_string(),
                    is_correct: true,
                },
                QuestionOption {
                    text: "b".to_string(),
                    is_correct: false,
                },
                QuestionOption {
                    text: "c".to_string(),
                    is_correct: true,
                },
            ],
            points: 2,
            order: 1,
        };
        assert_eq!(question.correct_indices(), vec![0, 2]);
    }
}
