// Test-attempt aggregation: per-lesson score statistics with a top-percent
// band. Pure reduction over immutable attempt rows; never mutates input.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    #[error("top percent must be a number between 0 and 100, got {0}")]
    InvalidTopPercent(f64),
}

/// One graded attempt, already joined to its lesson.
#[derive(Debug, Clone)]
pub struct LessonAttempt {
    pub lesson_id: Uuid,
    pub learner_id: String,
    pub score: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LessonTestStats {
    /// Distinct learners who attempted. Each learner contributes their best
    /// score, not their latest.
    pub attempt_count: usize,
    pub mean_score: Option<f64>,
    /// Score at the top-percent rank. The band is tie-inclusive: every score
    /// >= the cutoff counts, so it may exceed the nominal percentage.
    pub top_cutoff_score: Option<i32>,
    pub top_band_size: usize,
}

/// `combined_mean` is the unweighted mean of per-lesson means, not a pooled
/// mean over all raw scores: a high-volume test does not dominate it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TestsStatistic {
    pub per_lesson: HashMap<Uuid, LessonTestStats>,
    pub combined_mean: Option<f64>,
}

/// Aggregates `attempts` per requested lesson id.
///
/// Every requested id gets an entry, zero-attempt lessons included, so a
/// caller can tell "no attempts" from "not requested". Attempts for lessons
/// outside `lesson_ids` are ignored. An out-of-range `top_percent` is a
/// caller bug and fails fast instead of being clamped.
pub fn compute_statistics(
    lesson_ids: &[Uuid],
    attempts: &[LessonAttempt],
    top_percent: f64,
) -> Result<TestsStatistic, StatsError> {
    if !(0.0..=100.0).contains(&top_percent) {
        return Err(StatsError::InvalidTopPercent(top_percent));
    }

    // best score per learner within each requested lesson
    let mut best: HashMap<Uuid, HashMap<&str, i32>> =
        lesson_ids.iter().map(|id| (*id, HashMap::new())).collect();
    for a in attempts {
        if let Some(scores) = best.get_mut(&a.lesson_id) {
            let s = scores.entry(a.learner_id.as_str()).or_insert(a.score);
            *s = (*s).max(a.score);
        }
    }

    let mut per_lesson = HashMap::with_capacity(lesson_ids.len());
    let mut means = Vec::new();
    for id in lesson_ids {
        let scores: Vec<i32> = best[id].values().copied().collect();
        let entry = lesson_stats(scores, top_percent);
        if let Some(m) = entry.mean_score {
            means.push(m);
        }
        per_lesson.insert(*id, entry);
    }

    let combined_mean =
        (!means.is_empty()).then(|| means.iter().sum::<f64>() / means.len() as f64);

    Ok(TestsStatistic { per_lesson, combined_mean })
}

fn lesson_stats(mut scores: Vec<i32>, top_percent: f64) -> LessonTestStats {
    let count = scores.len();
    if count == 0 {
        return LessonTestStats {
            attempt_count: 0,
            mean_score: None,
            top_cutoff_score: None,
            top_band_size: 0,
        };
    }

    scores.sort_unstable_by(|a, b| b.cmp(a));
    let mean = scores.iter().map(|s| *s as f64).sum::<f64>() / count as f64;

    // 1-indexed rank of the cutoff score; a band is never empty
    let rank = ((count as f64 * top_percent / 100.0).ceil() as usize).clamp(1, count);
    let cutoff = scores[rank - 1];
    let band = scores.iter().filter(|s| **s >= cutoff).count();

    LessonTestStats {
        attempt_count: count,
        mean_score: Some(mean),
        top_cutoff_score: Some(cutoff),
        top_band_size: band,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(lesson_id: Uuid, learner: &str, score: i32) -> LessonAttempt {
        LessonAttempt { lesson_id, learner_id: learner.into(), score }
    }

    fn one_each(lesson_id: Uuid, scores: &[i32]) -> Vec<LessonAttempt> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| attempt(lesson_id, &format!("learner-{i}"), *s))
            .collect()
    }

    #[test]
    fn tie_inclusive_top_band() {
        // five learners, top 40% -> rank ceil(2.0) = 2 -> cutoff 90, both 90s in the band
        let id = Uuid::new_v4();
        let attempts = one_each(id, &[90, 90, 80, 70, 60]);
        let result = compute_statistics(&[id], &attempts, 40.0).unwrap();
        let entry = &result.per_lesson[&id];
        assert_eq!(entry.attempt_count, 5);
        assert_eq!(entry.mean_score, Some(78.0));
        assert_eq!(entry.top_cutoff_score, Some(90));
        assert_eq!(entry.top_band_size, 2);
    }

    #[test]
    fn top_hundred_percent_covers_everyone() {
        let id = Uuid::new_v4();
        let attempts = one_each(id, &[10, 50, 99]);
        let entry = &compute_statistics(&[id], &attempts, 100.0).unwrap().per_lesson[&id];
        assert_eq!(entry.top_cutoff_score, Some(10));
        assert_eq!(entry.top_band_size, 3);
    }

    #[test]
    fn top_zero_percent_still_yields_a_band() {
        let id = Uuid::new_v4();
        let attempts = one_each(id, &[10, 50, 99]);
        let entry = &compute_statistics(&[id], &attempts, 0.0).unwrap().per_lesson[&id];
        assert_eq!(entry.top_cutoff_score, Some(99));
        assert_eq!(entry.top_band_size, 1);
    }

    #[test]
    fn best_attempt_counts_per_learner() {
        let id = Uuid::new_v4();
        let attempts = vec![
            attempt(id, "sam", 40),
            attempt(id, "sam", 90),
            attempt(id, "sam", 70),
            attempt(id, "kim", 60),
        ];
        let entry = &compute_statistics(&[id], &attempts, 100.0).unwrap().per_lesson[&id];
        assert_eq!(entry.attempt_count, 2);
        assert_eq!(entry.mean_score, Some(75.0));
    }

    #[test]
    fn zero_attempt_lessons_still_appear() {
        let with = Uuid::new_v4();
        let without = Uuid::new_v4();
        let attempts = one_each(with, &[80]);
        let result = compute_statistics(&[with, without], &attempts, 50.0).unwrap();
        let empty = &result.per_lesson[&without];
        assert_eq!(empty.attempt_count, 0);
        assert_eq!(empty.mean_score, None);
        assert_eq!(empty.top_cutoff_score, None);
        assert_eq!(empty.top_band_size, 0);
        assert_eq!(result.per_lesson.len(), 2);
    }

    #[test]
    fn empty_request_is_not_an_error() {
        let result = compute_statistics(&[], &[], 50.0).unwrap();
        assert!(result.per_lesson.is_empty());
        assert_eq!(result.combined_mean, None);
    }

    #[test]
    fn attempts_for_unrequested_lessons_are_ignored() {
        let requested = Uuid::new_v4();
        let mut attempts = one_each(requested, &[70]);
        attempts.extend(one_each(Uuid::new_v4(), &[100, 100]));
        let result = compute_statistics(&[requested], &attempts, 50.0).unwrap();
        assert_eq!(result.per_lesson.len(), 1);
        assert_eq!(result.combined_mean, Some(70.0));
    }

    #[test]
    fn combined_mean_is_unweighted_across_lessons() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut attempts = one_each(a, &[100, 100, 100]);
        attempts.extend(one_each(b, &[50]));
        let result = compute_statistics(&[a, b], &attempts, 50.0).unwrap();
        // pooled would be 87.5; per-lesson means weigh equally
        assert_eq!(result.combined_mean, Some(75.0));
    }

    #[test]
    fn out_of_range_top_percent_fails_fast() {
        assert!(compute_statistics(&[], &[], -0.1).is_err());
        assert!(compute_statistics(&[], &[], 100.1).is_err());
        assert!(compute_statistics(&[], &[], f64::NAN).is_err());
    }

    #[test]
    fn same_input_same_output() {
        let id = Uuid::new_v4();
        let attempts = one_each(id, &[90, 90, 80, 70, 60]);
        let first = compute_statistics(&[id], &attempts, 40.0).unwrap();
        let second = compute_statistics(&[id], &attempts, 40.0).unwrap();
        assert_eq!(first, second);
    }
}
