use serde::Serialize;

/// Aggregate per-course snapshot for instructors/admins.
#[derive(Debug, Serialize)]
pub struct CourseOverview {
    pub course_id: String,
    pub learners: usize,
    pub average_progress: f64,
    pub items_total: usize,
    pub attempts_total: u64,
    pub attempts_passed: u64,
    pub pass_rate: f64,
    pub rating_average: f64,
    pub rating_count: usize,
}
