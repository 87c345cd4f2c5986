// Lesson visibility: entitlement resolution + per-request filtering.
// Pure functions over a hydrated course snapshot; all I/O stays in routes.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Enrollment, Lesson, Section};

/// One identity's resolved entitlement for one course.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// No identity supplied with the request.
    None,
    /// Known identity without a currently valid enrollment.
    Preview,
    Full,
}

impl AccessLevel {
    /// Highest lesson importance this level is allowed to see.
    pub fn importance_ceiling(self) -> i16 {
        match self {
            AccessLevel::None | AccessLevel::Preview => 0,
            AccessLevel::Full => 2,
        }
    }
}

/// A missing identity or enrollment row always resolves to the lowest
/// privilege, never an error. Both tiers grant full access while valid;
/// only the monthly tier carries an expiry.
pub fn resolve_access_level(
    identity: Option<&str>,
    enrollment: Option<&Enrollment>,
    now: DateTime<Utc>,
) -> AccessLevel {
    if identity.is_none() {
        return AccessLevel::None;
    }
    match enrollment {
        Some(e) if e.expires_at.map_or(true, |t| t > now) => AccessLevel::Full,
        _ => AccessLevel::Preview,
    }
}

/// One course's sections and lessons, hydrated in stable order.
///
/// Sections reference lessons by id; `lessons` owns the rows. A dangling id
/// (lesson deleted between loads) is skipped rather than surfaced.
pub struct CourseContent {
    pub sections: Vec<SectionContent>,
    pub lessons: Vec<Lesson>,
    /// lesson id -> ids of its tests
    pub test_ids: HashMap<Uuid, Vec<Uuid>>,
}

pub struct SectionContent {
    pub section: Section,
    /// Ordered by lesson number within the section.
    pub lesson_ids: Vec<Uuid>,
}

pub struct LessonFilter {
    pub max_importance: i16,
    pub only_uncompleted: bool,
    /// Case-insensitive substring over title or description; empty matches all.
    pub search_term: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct LessonView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub importance: i16,
    pub number: i32,
    pub theory_title: Option<String>,
    pub theory_ref: Option<String>,
    pub practice_title: Option<String>,
    pub practice_ref: Option<String>,
    pub test_ids: Vec<Uuid>,
    /// Always false today: gated lessons are omitted from the response, not
    /// returned as locked placeholders. Kept for a future show-locked mode.
    pub locked: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct SectionView {
    pub id: Uuid,
    pub title: String,
    pub number: i32,
    pub lessons: Vec<LessonView>,
}

/// Filters a course snapshot down to what `access` may see.
///
/// Filters only subtract: the section/number ordering of the input survives
/// untouched. Lessons above the importance ceiling are omitted entirely.
/// Sections are kept even when all their lessons are filtered away, so the
/// course's shape stays visible without leaking per-lesson metadata.
pub fn filter_lessons(
    content: &CourseContent,
    access: AccessLevel,
    filter: &LessonFilter,
    completed: &HashSet<Uuid>,
) -> Vec<SectionView> {
    let by_id: HashMap<Uuid, &Lesson> = content.lessons.iter().map(|l| (l.id, l)).collect();
    let ceiling = filter.max_importance.min(access.importance_ceiling());
    let needle = filter
        .search_term
        .as_deref()
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty());

    content
        .sections
        .iter()
        .map(|sc| SectionView {
            id: sc.section.id,
            title: sc.section.title.clone(),
            number: sc.section.number,
            lessons: sc
                .lesson_ids
                .iter()
                .filter_map(|id| by_id.get(id).copied())
                .filter(|l| l.importance <= ceiling)
                .filter(|l| !(filter.only_uncompleted && completed.contains(&l.id)))
                .filter(|l| matches_search(l, needle.as_deref()))
                .map(|l| lesson_view(l, &content.test_ids))
                .collect(),
        })
        .collect()
}

fn matches_search(lesson: &Lesson, needle: Option<&str>) -> bool {
    match needle {
        None => true,
        Some(n) => {
            lesson.title.to_lowercase().contains(n)
                || lesson.description.to_lowercase().contains(n)
        }
    }
}

fn lesson_view(lesson: &Lesson, test_ids: &HashMap<Uuid, Vec<Uuid>>) -> LessonView {
    LessonView {
        id: lesson.id,
        title: lesson.title.clone(),
        description: lesson.description.clone(),
        importance: lesson.importance,
        number: lesson.number,
        theory_title: lesson.theory_title.clone(),
        theory_ref: lesson.theory_ref.clone(),
        practice_title: lesson.practice_title.clone(),
        practice_ref: lesson.practice_ref.clone(),
        test_ids: test_ids.get(&lesson.id).cloned().unwrap_or_default(),
        locked: false,
    }
}
