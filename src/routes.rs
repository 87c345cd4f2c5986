use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::{access, db::Db, models::*, stats};

pub fn router(db: Db) -> Router {
    let media_dir = std::env::var("DATA_DIR").unwrap_or("./data".into());
    Router::new()
        // catalog + delivery
        .route("/api/courses", get(list_courses).post(add_course))
        .route(
            "/api/courses/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/api/courses/:id/preview", get(course_preview))
        // course structure
        .route("/api/sections", post(add_section))
        .route("/api/lessons", post(add_lesson))
        .route("/api/lessons/:id", delete(delete_lesson))
        .route("/api/lessons/:id/complete", post(complete_lesson))
        // tests + grading
        .route("/api/tests", post(add_test))
        .route("/api/tests/:id", put(update_test).delete(delete_test))
        .route("/api/tests/lesson/:lesson_id", get(tests_of_lesson))
        .route("/api/tests/statistics", post(tests_statistics))
        .route("/api/attempts", post(submit_attempt))
        // stored lesson media (theory/practice refs point in here)
        .nest_service("/media", ServeDir::new(media_dir))
        .with_state(db)
}

/// Course shell plus the filtered section/lesson views one learner may see.
#[derive(serde::Serialize, Debug)]
pub struct CourseView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_full: i64,
    pub price_monthly: i64,
    pub access: access::AccessLevel,
    /// Total lessons in the course, gated ones included.
    pub lesson_count: usize,
    pub sections: Vec<access::SectionView>,
}

// --- catalog ---

async fn list_courses(
    State(db): State<Db>,
) -> Result<Json<Vec<CoursePreview>>, (StatusCode, String)> {
    let rows = sqlx::query_as::<_, CoursePreview>(
        r#"
        SELECT c.id, c.title, c.price_full, c.price_monthly,
               (SELECT COUNT(*) FROM sections s WHERE s.course_id = c.id) AS section_count,
               (SELECT COUNT(*) FROM lessons l
                  JOIN sections s ON s.id = l.section_id
                 WHERE s.course_id = c.id) AS lesson_count
          FROM courses c
         ORDER BY c.created_at
        "#,
    )
    .fetch_all(&db)
    .await
    .map_err(e500)?;

    Ok(Json(rows))
}

async fn course_preview(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<CoursePreview>, (StatusCode, String)> {
    let row = sqlx::query_as::<_, CoursePreview>(
        r#"
        SELECT c.id, c.title, c.price_full, c.price_monthly,
               (SELECT COUNT(*) FROM sections s WHERE s.course_id = c.id) AS section_count,
               (SELECT COUNT(*) FROM lessons l
                  JOIN sections s ON s.id = l.section_id
                 WHERE s.course_id = c.id) AS lesson_count
          FROM courses c
         WHERE c.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&db)
    .await
    .map_err(e500)?
    .ok_or_else(|| e404("course not found"))?;

    Ok(Json(row))
}

async fn get_course(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Query(q): Query<LessonQuery>,
) -> Result<Json<CourseView>, (StatusCode, String)> {
    let max_importance = q.max_importance.unwrap_or(2);
    if !(0..=2).contains(&max_importance) {
        return Err(e400("Importance must be only 0, 1 or 2"));
    }

    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(id)
        .fetch_optional(&db)
        .await
        .map_err(e500)?
        .ok_or_else(|| e404("course not found"))?;

    let content = load_content(&db, id).await?;
    let learner = q.learner_id.as_deref().filter(|l| !l.is_empty());

    let enrollment = match learner {
        Some(l) => sqlx::query_as::<_, Enrollment>(
            r#"SELECT * FROM enrollments
                WHERE learner_id = $1 AND course_id = $2
                ORDER BY created_at DESC LIMIT 1"#,
        )
        .bind(l)
        .bind(id)
        .fetch_optional(&db)
        .await
        .map_err(e500)?,
        None => None,
    };

    let completed: HashSet<Uuid> = match learner {
        Some(l) => sqlx::query_scalar::<_, Uuid>(
            r#"SELECT lc.lesson_id FROM lesson_completions lc
                 JOIN lessons l ON l.id = lc.lesson_id
                 JOIN sections s ON s.id = l.section_id
                WHERE lc.learner_id = $1 AND s.course_id = $2"#,
        )
        .bind(l)
        .bind(id)
        .fetch_all(&db)
        .await
        .map_err(e500)?
        .into_iter()
        .collect(),
        None => HashSet::new(),
    };

    let level = access::resolve_access_level(learner, enrollment.as_ref(), Utc::now());
    let filter = access::LessonFilter {
        max_importance,
        only_uncompleted: q.only_uncompleted.unwrap_or(false),
        search_term: q.search_term.clone(),
    };
    let lesson_count = content.lessons.len();
    let sections = access::filter_lessons(&content, level, &filter, &completed);

    Ok(Json(CourseView {
        id: course.id,
        title: course.title,
        description: course.description,
        price_full: course.price_full,
        price_monthly: course.price_monthly,
        access: level,
        lesson_count,
        sections,
    }))
}

/// Hydrates a course snapshot in stable section/number order.
async fn load_content(db: &Db, course_id: Uuid) -> Result<access::CourseContent, (StatusCode, String)> {
    let sections = sqlx::query_as::<_, Section>(
        "SELECT * FROM sections WHERE course_id = $1 ORDER BY number, created_at",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
    .map_err(e500)?;

    let lessons = sqlx::query_as::<_, Lesson>(
        r#"SELECT l.* FROM lessons l
             JOIN sections s ON s.id = l.section_id
            WHERE s.course_id = $1
            ORDER BY l.number, l.created_at"#,
    )
    .bind(course_id)
    .fetch_all(db)
    .await
    .map_err(e500)?;

    let test_rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        r#"SELECT t.lesson_id, t.id FROM tests t
             JOIN lessons l ON l.id = t.lesson_id
             JOIN sections s ON s.id = l.section_id
            WHERE s.course_id = $1
            ORDER BY t.created_at"#,
    )
    .bind(course_id)
    .fetch_all(db)
    .await
    .map_err(e500)?;

    let mut test_ids: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (lesson_id, test_id) in test_rows {
        test_ids.entry(lesson_id).or_default().push(test_id);
    }

    let sections = sections
        .into_iter()
        .map(|section| access::SectionContent {
            lesson_ids: lessons
                .iter()
                .filter(|l| l.section_id == section.id)
                .map(|l| l.id)
                .collect(),
            section,
        })
        .collect();

    Ok(access::CourseContent { sections, lessons, test_ids })
}

// --- course management ---

async fn add_course(
    State(db): State<Db>,
    Json(req): Json<CourseReq>,
) -> Result<Json<Course>, (StatusCode, String)> {
    if req.price_full <= 0 || req.price_monthly <= 0 {
        return Err(e400("Full price and monthly price must be greater than zero."));
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (id, title, description, price_full, price_monthly)
        VALUES ($1,$2,$3,$4,$5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.price_full)
    .bind(req.price_monthly)
    .fetch_one(&db)
    .await
    .map_err(e500)?;

    Ok(Json(course))
}

async fn update_course(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(req): Json<CourseReq>,
) -> Result<Json<Course>, (StatusCode, String)> {
    if req.price_full <= 0 || req.price_monthly <= 0 {
        return Err(e400("Full price and monthly price must be greater than zero."));
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses
           SET title = $2, description = $3, price_full = $4, price_monthly = $5
         WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.price_full)
    .bind(req.price_monthly)
    .fetch_optional(&db)
    .await
    .map_err(e500)?
    .ok_or_else(|| e404("course not found"))?;

    Ok(Json(course))
}

async fn delete_course(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let res = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await
        .map_err(e500)?;
    if res.rows_affected() == 0 {
        return Err(e404("course not found"));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

// --- structure management ---

async fn add_section(
    State(db): State<Db>,
    Json(req): Json<AddSectionReq>,
) -> Result<Json<Section>, (StatusCode, String)> {
    ensure_exists(&db, "courses", req.course_id, "course not found").await?;

    let section = sqlx::query_as::<_, Section>(
        r#"
        INSERT INTO sections (id, course_id, title, number)
        VALUES ($1,$2,$3,$4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.course_id)
    .bind(&req.title)
    .bind(req.number)
    .fetch_one(&db)
    .await
    .map_err(e500)?;

    Ok(Json(section))
}

async fn add_lesson(
    State(db): State<Db>,
    Json(req): Json<AddLessonReq>,
) -> Result<Json<Lesson>, (StatusCode, String)> {
    if !(0..=2).contains(&req.importance) {
        return Err(e400("Importance must be only 0, 1 or 2"));
    }
    ensure_exists(&db, "sections", req.section_id, "section not found").await?;

    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (id, section_id, title, description, importance, number,
                             theory_title, theory_ref, practice_title, practice_ref)
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.section_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.importance)
    .bind(req.number)
    .bind(&req.theory_title)
    .bind(&req.theory_ref)
    .bind(&req.practice_title)
    .bind(&req.practice_ref)
    .fetch_one(&db)
    .await
    .map_err(e500)?;

    Ok(Json(lesson))
}

async fn delete_lesson(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let res = sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await
        .map_err(e500)?;
    if res.rows_affected() == 0 {
        return Err(e404("lesson not found"));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn complete_lesson(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteLessonReq>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    ensure_exists(&db, "lessons", id, "lesson not found").await?;

    // re-completing is a no-op, the first record wins
    sqlx::query(
        r#"
        INSERT INTO lesson_completions (lesson_id, learner_id)
        VALUES ($1,$2)
        ON CONFLICT (lesson_id, learner_id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&req.learner_id)
    .execute(&db)
    .await
    .map_err(e500)?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

// --- tests + grading ---

async fn tests_of_lesson(
    State(db): State<Db>,
    Path(lesson_id): Path<Uuid>,
) -> Result<Json<Vec<Test>>, (StatusCode, String)> {
    ensure_exists(&db, "lessons", lesson_id, "lesson not found").await?;

    let tests = sqlx::query_as::<_, Test>(
        "SELECT * FROM tests WHERE lesson_id = $1 ORDER BY created_at",
    )
    .bind(lesson_id)
    .fetch_all(&db)
    .await
    .map_err(e500)?;

    Ok(Json(tests))
}

async fn add_test(
    State(db): State<Db>,
    Json(req): Json<AddTestReq>,
) -> Result<Json<Test>, (StatusCode, String)> {
    ensure_exists(&db, "lessons", req.lesson_id, "lesson not found").await?;

    let test = sqlx::query_as::<_, Test>(
        r#"
        INSERT INTO tests (id, lesson_id, title)
        VALUES ($1,$2,$3)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.lesson_id)
    .bind(&req.title)
    .fetch_one(&db)
    .await
    .map_err(e500)?;

    Ok(Json(test))
}

async fn update_test(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTestReq>,
) -> Result<Json<Test>, (StatusCode, String)> {
    let test = sqlx::query_as::<_, Test>(
        "UPDATE tests SET title = $2 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.title)
    .fetch_optional(&db)
    .await
    .map_err(e500)?
    .ok_or_else(|| e404("test not found"))?;

    Ok(Json(test))
}

async fn delete_test(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let res = sqlx::query("DELETE FROM tests WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await
        .map_err(e500)?;
    if res.rows_affected() == 0 {
        return Err(e404("test not found"));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn submit_attempt(
    State(db): State<Db>,
    Json(req): Json<SubmitAttemptReq>,
) -> Result<Json<TestAttempt>, (StatusCode, String)> {
    if !(0..=100).contains(&req.score) {
        return Err(e400("Score must be a number between 0 and 100."));
    }
    ensure_exists(&db, "tests", req.test_id, "test not found").await?;

    let attempt = sqlx::query_as::<_, TestAttempt>(
        r#"
        INSERT INTO test_attempts (id, test_id, learner_id, score)
        VALUES ($1,$2,$3,$4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.test_id)
    .bind(&req.learner_id)
    .bind(req.score)
    .fetch_one(&db)
    .await
    .map_err(e500)?;

    Ok(Json(attempt))
}

async fn tests_statistics(
    State(db): State<Db>,
    Json(req): Json<StatisticsReq>,
) -> Result<Json<stats::TestsStatistic>, (StatusCode, String)> {
    if !(0.0..=100.0).contains(&req.top_percent) {
        return Err(e400("Top Percent must be a number between 0 and 100."));
    }

    let rows: Vec<(Uuid, String, i32)> = sqlx::query_as(
        r#"SELECT t.lesson_id, a.learner_id, a.score
             FROM test_attempts a
             JOIN tests t ON t.id = a.test_id
            WHERE t.lesson_id = ANY($1)"#,
    )
    .bind(&req.lesson_ids)
    .fetch_all(&db)
    .await
    .map_err(e500)?;

    let attempts: Vec<stats::LessonAttempt> = rows
        .into_iter()
        .map(|(lesson_id, learner_id, score)| stats::LessonAttempt { lesson_id, learner_id, score })
        .collect();

    let result = stats::compute_statistics(&req.lesson_ids, &attempts, req.top_percent)
        .map_err(|e| e400(e.to_string()))?;

    Ok(Json(result))
}

// --- helpers ---

async fn ensure_exists(
    db: &Db,
    table: &str,
    id: Uuid,
    msg: &str,
) -> Result<(), (StatusCode, String)> {
    let sql = format!("SELECT id FROM {} WHERE id = $1", table);
    let found: Option<Uuid> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(e500)?;
    if found.is_none() {
        return Err(e404(msg));
    }
    Ok(())
}

fn e400<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn e404<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}

fn e500<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    tracing::error!(error=%e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
