use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SkillMetrics, SkillTier};

/// Stage time (seconds) considered a full-length stage for the difficulty rating.
const MAX_REASONABLE_STAGE_TIME: f32 = 60.0;

/// Attempt record for a single puzzle within a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleRecord {
    pub puzzle_id: String,
    pub attempts: u32,
    /// Set by the first successful attempt; never cleared afterwards.
    pub success: bool,
    pub first_interaction: DateTime<Utc>,
}

/// Statistics collected while a stage is being played.
///
/// Created by stage start, mutated by puzzle attempts and player actions,
/// and frozen once the stage completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMetrics {
    #[serde(rename = "stageNumber")]
    pub stage_id: String,
    pub total_stage_time: f32,
    pub total_stage_attempts: u32,
    pub puzzles: Vec<PuzzleRecord>,
    /// Computed on completion, `None` while the stage is active.
    pub difficulty_rating: Option<f32>,
    pub player_actions: Vec<String>,
    #[serde(skip)]
    pub(crate) started_at: Option<DateTime<Utc>>,
}

impl StageMetrics {
    #[must_use]
    pub fn new(stage_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            stage_id: stage_id.into(),
            total_stage_time: 0.0,
            total_stage_attempts: 0,
            puzzles: vec![],
            difficulty_rating: None,
            player_actions: vec![],
            started_at: Some(started_at),
        }
    }

    /// Records one attempt on `puzzle_id`.
    ///
    /// Returns `true` if this attempt solved the puzzle for the first time.
    pub fn record_attempt(&mut self, puzzle_id: &str, success: bool, now: DateTime<Utc>) -> bool {
        let index = match self.puzzles.iter().position(|p| p.puzzle_id == puzzle_id) {
            Some(index) => index,
            None => {
                self.puzzles.push(PuzzleRecord {
                    puzzle_id: puzzle_id.to_owned(),
                    attempts: 0,
                    success: false,
                    first_interaction: now,
                });
                self.puzzles.len() - 1
            }
        };
        let puzzle = &mut self.puzzles[index];
        puzzle.attempts += 1;
        self.total_stage_attempts += 1;

        let newly_solved = success && !puzzle.success;
        if newly_solved {
            puzzle.success = true;
        }
        newly_solved
    }

    #[must_use]
    pub fn puzzle(&self, puzzle_id: &str) -> Option<&PuzzleRecord> {
        self.puzzles.iter().find(|p| p.puzzle_id == puzzle_id)
    }

    #[must_use]
    pub fn solved_count(&self) -> usize {
        self.puzzles.iter().filter(|p| p.success).count()
    }

    /// Seconds since the stage was started, measured at `now`.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f32 {
        self.started_at
            .map_or(0.0, |start| (now - start).num_milliseconds().max(0) as f32 / 1000.0)
    }

    /// Stamps the final time and computes the difficulty rating.
    ///
    /// The rating is `min(1, time / 60 * (1 + min(1, failed / puzzles)))`,
    /// where `failed` counts attempts that did not solve a puzzle.
    #[expect(clippy::cast_precision_loss)]
    pub(crate) fn finalize(&mut self, total_stage_time: f32) {
        self.total_stage_time = total_stage_time.max(0.0);
        let puzzles = self.puzzles.len();
        let failed = (self.total_stage_attempts as usize).saturating_sub(self.solved_count());
        let failure_ratio = if puzzles == 0 {
            0.0
        } else {
            f32::min(1.0, failed as f32 / puzzles as f32)
        };
        let rating = self.total_stage_time / MAX_REASONABLE_STAGE_TIME * (1.0 + failure_ratio);
        self.difficulty_rating = Some(rating.min(1.0));
    }
}

/// Running totals over all completed stages of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeMetrics {
    pub total_time: f32,
    pub total_attempts: u32,
    pub stages_completed: u32,
    pub total_puzzles: u32,
    pub total_successes: u32,
}

impl CumulativeMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_time: 0.0,
            total_attempts: 0,
            stages_completed: 0,
            total_puzzles: 0,
            total_successes: 0,
        }
    }

    /// Folds a finalized stage into the totals.
    #[expect(clippy::cast_possible_truncation)]
    pub fn add_stage(&mut self, stage: &StageMetrics) {
        self.total_time += stage.total_stage_time;
        self.total_attempts += stage.total_stage_attempts;
        self.stages_completed += 1;
        self.total_puzzles += stage.puzzles.len() as u32;
        self.total_successes += stage.solved_count() as u32;
    }

    /// Derives the classifier input from the totals.
    ///
    /// Any component whose denominator is still zero falls back to
    /// [`SkillMetrics::DEFAULT`] instead of producing NaN.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn skill_metrics(&self) -> SkillMetrics {
        let defaults = SkillMetrics::DEFAULT;
        let avg_time_per_stage = if self.stages_completed == 0 {
            defaults.avg_time_per_stage
        } else {
            self.total_time / self.stages_completed as f32
        };
        let (avg_attempts_per_puzzle, overall_success_rate) = if self.total_puzzles == 0 {
            (
                defaults.avg_attempts_per_puzzle,
                defaults.overall_success_rate,
            )
        } else {
            let puzzles = self.total_puzzles as f32;
            (
                self.total_attempts as f32 / puzzles,
                self.total_successes as f32 / puzzles,
            )
        };
        SkillMetrics {
            avg_time_per_stage,
            avg_attempts_per_puzzle,
            overall_success_rate,
        }
    }
}

/// One classification outcome, appended to the session's skill history.
///
/// Also the payload of the `skillLevelUpdated` output event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillResult {
    pub skill_level: SkillTier,
    pub timestamp: DateTime<Utc>,
    pub level_id: String,
}

/// Cumulative totals plus derived averages, in the shape the metrics store expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeSnapshot {
    pub total_time: f32,
    pub total_attempts: u32,
    pub stages_completed: u32,
    pub average_time_per_stage: f32,
    pub average_attempts_per_puzzle: f32,
    pub overall_success_rate: f32,
}

impl From<&CumulativeMetrics> for CumulativeSnapshot {
    #[expect(clippy::cast_precision_loss)]
    fn from(c: &CumulativeMetrics) -> Self {
        let ratio = |num: f32, den: u32| if den == 0 { 0.0 } else { num / den as f32 };
        Self {
            total_time: c.total_time,
            total_attempts: c.total_attempts,
            stages_completed: c.stages_completed,
            average_time_per_stage: ratio(c.total_time, c.stages_completed),
            average_attempts_per_puzzle: ratio(c.total_attempts as f32, c.total_puzzles),
            overall_success_rate: ratio(c.total_successes as f32, c.total_puzzles),
        }
    }
}

/// Full session state handed to a [`MetricsSink`](crate::MetricsSink) after each stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub cumulative_metrics: CumulativeSnapshot,
    pub stage_metrics: Vec<StageMetrics>,
    pub skill_history: Vec<SkillResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_success_marks_puzzle_once() {
        let now = Utc::now();
        let mut stage = StageMetrics::new("s1", now);
        assert!(!stage.record_attempt("p1", false, now));
        assert!(stage.record_attempt("p1", true, now));
        assert!(!stage.record_attempt("p1", true, now));

        let puzzle = stage.puzzle("p1").unwrap();
        assert_eq!(puzzle.attempts, 3);
        assert!(puzzle.success);
        assert_eq!(stage.total_stage_attempts, 3);
        assert_eq!(stage.solved_count(), 1);
    }

    #[test]
    fn test_difficulty_rating_is_capped() {
        let now = Utc::now();
        let mut stage = StageMetrics::new("s1", now);
        for _ in 0..4 {
            stage.record_attempt("p1", false, now);
        }
        stage.finalize(45.0);
        // 45/60 * (1 + min(1, 4/1)) = 1.5, capped
        assert_eq!(stage.difficulty_rating, Some(1.0));

        let mut easy = StageMetrics::new("s2", now);
        easy.record_attempt("p1", true, now);
        easy.finalize(30.0);
        assert_eq!(easy.difficulty_rating, Some(0.5));
    }

    #[test]
    fn test_difficulty_rating_without_puzzles() {
        let mut stage = StageMetrics::new("empty", Utc::now());
        stage.finalize(15.0);
        assert_eq!(stage.difficulty_rating, Some(0.25));
    }

    #[test]
    fn test_skill_metrics_defaults_on_empty_totals() {
        let metrics = CumulativeMetrics::new().skill_metrics();
        assert_eq!(metrics, SkillMetrics::DEFAULT);
    }

    #[test]
    fn test_skill_metrics_defaults_when_no_puzzles_seen() {
        let mut totals = CumulativeMetrics::new();
        let mut stage = StageMetrics::new("s1", Utc::now());
        stage.finalize(30.0);
        totals.add_stage(&stage);

        let metrics = totals.skill_metrics();
        assert!((metrics.avg_time_per_stage - 30.0).abs() < f32::EPSILON);
        assert!((metrics.avg_attempts_per_puzzle - 2.5).abs() < f32::EPSILON);
        assert!((metrics.overall_success_rate - 0.5).abs() < f32::EPSILON);
        assert!(!metrics.avg_attempts_per_puzzle.is_nan());
    }

    #[test]
    fn test_snapshot_serializes_store_shape() {
        let mut totals = CumulativeMetrics::new();
        let now = Utc::now();
        let mut stage = StageMetrics::new("room", now);
        stage.record_attempt("key", true, now);
        stage.finalize(20.0);
        totals.add_stage(&stage);

        let snapshot = SessionSnapshot {
            session_id: "abc".to_owned(),
            cumulative_metrics: CumulativeSnapshot::from(&totals),
            stage_metrics: vec![stage],
            skill_history: vec![],
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["sessionId"], "abc");
        assert_eq!(value["cumulativeMetrics"]["stagesCompleted"], 1);
        assert_eq!(value["cumulativeMetrics"]["averageTimePerStage"], 20.0);
        assert_eq!(value["stageMetrics"][0]["stageNumber"], "room");
        assert_eq!(value["stageMetrics"][0]["puzzles"][0]["puzzleId"], "key");
    }
}
