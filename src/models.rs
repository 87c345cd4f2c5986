use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_full: i64, // minor currency units
    pub price_monthly: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Section {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub number: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub section_id: Uuid,
    pub title: String,
    pub description: String,
    pub importance: i16, // 0 = free preview, 2 = paid only
    pub number: i32,
    pub theory_title: Option<String>,
    pub theory_ref: Option<String>, // relative to DATA_DIR, served under /media
    pub practice_title: Option<String>,
    pub practice_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Test {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub learner_id: String,
    pub tier: String, // 'full' | 'monthly'
    pub expires_at: Option<DateTime<Utc>>, // NULL for the full tier
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct TestAttempt {
    pub id: Uuid,
    pub test_id: Uuid,
    pub learner_id: String,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct CoursePreview {
    pub id: Uuid,
    pub title: String,
    pub price_full: i64,
    pub price_monthly: i64,
    pub section_count: i64,
    pub lesson_count: i64,
}

// --- request shapes ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_full: i64,
    pub price_monthly: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddSectionReq {
    pub course_id: Uuid,
    pub title: String,
    pub number: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddLessonReq {
    pub section_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub importance: i16,
    pub number: i32,
    pub theory_title: Option<String>,
    pub theory_ref: Option<String>,
    pub practice_title: Option<String>,
    pub practice_ref: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddTestReq {
    pub lesson_id: Uuid,
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateTestReq {
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitAttemptReq {
    pub test_id: Uuid,
    pub learner_id: String,
    pub score: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompleteLessonReq {
    pub learner_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatisticsReq {
    pub lesson_ids: Vec<Uuid>,
    pub top_percent: f64,
}

/// Query string of `GET /api/courses/:id`.
#[derive(Deserialize, Debug, Clone)]
pub struct LessonQuery {
    pub learner_id: Option<String>,
    pub max_importance: Option<i16>,
    pub only_uncompleted: Option<bool>,
    pub search_term: Option<String>,
}
