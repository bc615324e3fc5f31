use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::{Normalization, SkillMetrics, SkillState, SkillTier};

use super::{
    event::{GameEvent, SkillLevelUpdated},
    sink::{MetricsSink, NullSink},
    stage::{CumulativeMetrics, CumulativeSnapshot, SessionSnapshot, SkillResult, StageMetrics},
};

/// Level id reported by [`MetricsAggregator::latest_skill_result`] before any classification.
pub const INITIAL_LEVEL_ID: &str = "initial";

/// Maps aggregate player metrics to a skill tier.
///
/// Implemented by the difficulty agent; closures work too, which keeps tests
/// free of any model.
pub trait SkillPredictor {
    fn predict_skill_level(&self, metrics: &SkillMetrics) -> SkillTier;
}

impl<F> SkillPredictor for F
where
    F: Fn(&SkillMetrics) -> SkillTier,
{
    fn predict_skill_level(&self, metrics: &SkillMetrics) -> SkillTier {
        self(metrics)
    }
}

/// Outcome of a successful stage completion.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCompletion {
    /// The finalized stage, including its difficulty rating.
    pub stage: StageMetrics,
    /// Raw features derived from the cumulative totals.
    pub metrics: SkillMetrics,
    /// Normalized features handed to the classifier.
    pub state: SkillState,
    /// The classification appended to the skill history.
    pub result: SkillResult,
}

/// Accumulates gameplay events into per-stage and cumulative statistics.
///
/// The aggregator is the only producer of classifier features. It owns the
/// session's metrics but not the predictor, which is passed into every call
/// that may trigger a classification.
pub struct MetricsAggregator {
    session_id: String,
    normalization: Normalization,
    current_stage: Option<StageMetrics>,
    completed_ids: HashSet<String>,
    completed_stages: Vec<StageMetrics>,
    cumulative: CumulativeMetrics,
    skill_history: Vec<SkillResult>,
    sink: Box<dyn MetricsSink>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(NullSink)
    }
}

impl MetricsAggregator {
    pub fn new<S>(sink: S) -> Self
    where
        S: MetricsSink + 'static,
    {
        Self {
            session_id: new_session_id(),
            normalization: Normalization::DEFAULT,
            current_stage: None,
            completed_ids: HashSet::new(),
            completed_stages: vec![],
            cumulative: CumulativeMetrics::new(),
            skill_history: vec![],
            sink: Box::new(sink),
        }
    }

    #[must_use]
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<&StageMetrics> {
        self.current_stage.as_ref()
    }

    #[must_use]
    pub fn completed_stages(&self) -> &[StageMetrics] {
        &self.completed_stages
    }

    #[must_use]
    pub fn cumulative(&self) -> &CumulativeMetrics {
        &self.cumulative
    }

    #[must_use]
    pub fn skill_history(&self) -> &[SkillResult] {
        &self.skill_history
    }

    /// Opens a new stage.
    ///
    /// An active stage that was never completed is force-completed first,
    /// using the wall-clock time since it started.
    pub fn start_stage(&mut self, stage_id: &str, predictor: &dyn SkillPredictor) {
        if let Some(stage) = &self.current_stage {
            let now = Utc::now();
            let pending_id = stage.stage_id.clone();
            let elapsed = stage.elapsed_secs(now);
            tracing::warn!(
                pending = %pending_id,
                next = %stage_id,
                elapsed,
                "stage started while another was active, force-completing it"
            );
            self.complete_stage(&pending_id, Some(elapsed), predictor);
        }
        tracing::debug!(stage_id, "stage started");
        self.current_stage = Some(StageMetrics::new(stage_id, Utc::now()));
    }

    /// Records one attempt on a puzzle of the active stage.
    pub fn track_puzzle_attempt(&mut self, puzzle_id: &str, success: bool) {
        let Some(stage) = &mut self.current_stage else {
            tracing::debug!(puzzle_id, "puzzle attempt ignored: no active stage");
            return;
        };
        let newly_solved = stage.record_attempt(puzzle_id, success, Utc::now());
        tracing::debug!(
            stage_id = %stage.stage_id,
            puzzle_id,
            success,
            newly_solved,
            "puzzle attempt recorded"
        );
    }

    /// Records an informational interaction; it never affects classification.
    pub fn track_player_action(&mut self, object_id: &str, kind: &str) {
        let Some(stage) = &mut self.current_stage else {
            tracing::debug!(object_id, kind, "player action ignored: no active stage");
            return;
        };
        stage.player_actions.push(format!("{kind}:{object_id}"));
    }

    /// Finalizes the active stage, classifies the player and persists a snapshot.
    ///
    /// Returns `None` without side effects when no stage is active or when
    /// `stage_id` was already completed in this session. `elapsed_secs` is the
    /// stage timer reading; `None` falls back to wall-clock time since the
    /// stage started.
    pub fn complete_stage(
        &mut self,
        stage_id: &str,
        elapsed_secs: Option<f32>,
        predictor: &dyn SkillPredictor,
    ) -> Option<StageCompletion> {
        if self.completed_ids.contains(stage_id) {
            tracing::debug!(stage_id, "duplicate stage completion ignored");
            self.current_stage = None;
            return None;
        }
        let Some(mut stage) = self.current_stage.take() else {
            tracing::debug!(stage_id, "stage completion ignored: no active stage");
            return None;
        };
        if stage.stage_id != stage_id {
            tracing::warn!(
                active = %stage.stage_id,
                requested = %stage_id,
                "completion id does not match the active stage"
            );
        }

        let now = Utc::now();
        let elapsed = elapsed_secs.unwrap_or_else(|| stage.elapsed_secs(now));
        stage.finalize(elapsed);
        self.cumulative.add_stage(&stage);
        self.completed_ids.insert(stage_id.to_owned());
        self.completed_ids.insert(stage.stage_id.clone());

        let metrics = self.cumulative.skill_metrics();
        let state = SkillState::from_metrics(&metrics, &self.normalization);
        let tier = predictor.predict_skill_level(&metrics);
        let result = SkillResult {
            skill_level: tier,
            timestamp: now,
            level_id: stage_id.to_owned(),
        };
        tracing::info!(
            stage_id,
            time = stage.total_stage_time,
            attempts = stage.total_stage_attempts,
            difficulty = stage.difficulty_rating,
            %tier,
            "stage completed"
        );

        self.completed_stages.push(stage.clone());
        self.skill_history.push(result.clone());

        if let Err(e) = self.sink.save(&self.snapshot()) {
            tracing::warn!(session_id = %self.session_id, error = %e, "failed to save metrics");
        }

        Some(StageCompletion {
            stage,
            metrics,
            state,
            result,
        })
    }

    /// Most recent classification, or `Beginner` tagged [`INITIAL_LEVEL_ID`] if none yet.
    #[must_use]
    pub fn latest_skill_result(&self) -> SkillResult {
        self.skill_history
            .last()
            .cloned()
            .unwrap_or_else(|| SkillResult {
                skill_level: SkillTier::Beginner,
                timestamp: Utc::now(),
                level_id: INITIAL_LEVEL_ID.to_owned(),
            })
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            cumulative_metrics: CumulativeSnapshot::from(&self.cumulative),
            stage_metrics: self.completed_stages.clone(),
            skill_history: self.skill_history.clone(),
        }
    }

    /// Discards all session state and starts over under a new session id.
    pub fn reset(&mut self) {
        tracing::info!(old_session_id = %self.session_id, "metrics reset");
        self.session_id = new_session_id();
        self.current_stage = None;
        self.completed_ids.clear();
        self.completed_stages.clear();
        self.cumulative = CumulativeMetrics::new();
        self.skill_history.clear();
    }

    /// Dispatches one gameplay event.
    ///
    /// Returns the output event when the event completed a stage.
    pub fn handle_event(
        &mut self,
        event: &GameEvent,
        predictor: &dyn SkillPredictor,
    ) -> Option<SkillLevelUpdated> {
        match event {
            GameEvent::StageStarted { stage_id } => {
                self.start_stage(stage_id, predictor);
                None
            }
            GameEvent::PuzzleInteracted { id, success } => {
                self.track_puzzle_attempt(id, *success);
                None
            }
            GameEvent::StageCompleted {
                stage_id,
                elapsed_secs,
            } => self
                .complete_stage(stage_id, *elapsed_secs, predictor)
                .map(|completion| SkillLevelUpdated(completion.result)),
            GameEvent::ObjectInteraction { id, kind } => {
                self.track_player_action(id, kind);
                None
            }
            GameEvent::Restart => {
                self.reset();
                None
            }
        }
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;

    fn fixed(tier: SkillTier) -> impl Fn(&SkillMetrics) -> SkillTier {
        move |_: &SkillMetrics| tier
    }

    #[test]
    fn test_stage_with_retries_end_to_end() {
        let sink = MemorySink::new();
        let mut aggregator = MetricsAggregator::new(sink.clone());
        let predictor = fixed(SkillTier::Intermediate);

        aggregator.start_stage("s1", &predictor);
        for _ in 0..3 {
            aggregator.track_puzzle_attempt("p1", false);
        }
        aggregator.track_puzzle_attempt("p1", true);
        let before = aggregator.cumulative().total_attempts;
        let completion = aggregator
            .complete_stage("s1", Some(30.0), &predictor)
            .unwrap();

        assert_eq!(aggregator.cumulative().total_attempts - before, 4);
        assert_eq!(aggregator.cumulative().total_successes, 1);
        let puzzle = completion.stage.puzzle("p1").unwrap();
        assert!(puzzle.success);
        assert_eq!(puzzle.attempts, 4);
        assert_eq!(aggregator.skill_history().len(), 1);
        assert_eq!(completion.result.level_id, "s1");

        // 30s, 4 attempts on 1 puzzle, all solved
        assert!((completion.metrics.avg_time_per_stage - 30.0).abs() < 1e-6);
        assert!((completion.metrics.avg_attempts_per_puzzle - 4.0).abs() < 1e-6);
        assert!((completion.metrics.overall_success_rate - 1.0).abs() < 1e-6);
        assert!((completion.state.time() - 0.2).abs() < 1e-6);
        assert_eq!(sink.snapshots().len(), 1);
    }

    #[test]
    fn test_complete_stage_is_at_most_once() {
        let sink = MemorySink::new();
        let mut aggregator = MetricsAggregator::new(sink.clone());
        let predictor = fixed(SkillTier::Expert);

        aggregator.start_stage("s1", &predictor);
        aggregator.track_puzzle_attempt("p1", true);
        assert!(aggregator.complete_stage("s1", Some(10.0), &predictor).is_some());
        assert!(aggregator.complete_stage("s1", Some(10.0), &predictor).is_none());

        // replaying the same stage id does not count twice either
        aggregator.start_stage("s1", &predictor);
        aggregator.track_puzzle_attempt("p1", true);
        assert!(aggregator.complete_stage("s1", Some(10.0), &predictor).is_none());
        assert!(aggregator.current_stage().is_none());

        assert_eq!(aggregator.skill_history().len(), 1);
        assert_eq!(aggregator.cumulative().stages_completed, 1);
        assert_eq!(sink.snapshots().len(), 1);
    }

    #[test]
    fn test_events_without_active_stage_are_ignored() {
        let mut aggregator = MetricsAggregator::default();
        let predictor = fixed(SkillTier::Expert);

        aggregator.track_puzzle_attempt("p1", true);
        aggregator.track_player_action("door", "inspect");
        assert!(aggregator.complete_stage("s1", None, &predictor).is_none());
        assert_eq!(aggregator.cumulative(), &CumulativeMetrics::new());
        assert!(aggregator.skill_history().is_empty());
    }

    #[test]
    fn test_start_stage_force_completes_pending_stage() {
        let mut aggregator = MetricsAggregator::default();
        let predictor = fixed(SkillTier::Beginner);

        aggregator.start_stage("room", &predictor);
        aggregator.track_puzzle_attempt("lock", false);
        aggregator.start_stage("scholarsLibrary", &predictor);

        assert_eq!(aggregator.cumulative().stages_completed, 1);
        assert_eq!(aggregator.cumulative().total_attempts, 1);
        assert_eq!(aggregator.completed_stages()[0].stage_id, "room");
        assert_eq!(
            aggregator.current_stage().map(|s| s.stage_id.as_str()),
            Some("scholarsLibrary")
        );
        assert_eq!(aggregator.latest_skill_result().level_id, "room");
    }

    #[test]
    fn test_latest_skill_result_defaults_to_beginner() {
        let aggregator = MetricsAggregator::default();
        let latest = aggregator.latest_skill_result();
        assert_eq!(latest.skill_level, SkillTier::Beginner);
        assert_eq!(latest.level_id, INITIAL_LEVEL_ID);
    }

    #[test]
    fn test_player_actions_do_not_affect_features() {
        let mut aggregator = MetricsAggregator::default();
        let predictor = fixed(SkillTier::Intermediate);

        aggregator.start_stage("s1", &predictor);
        aggregator.track_player_action("bookshelf", "inspect");
        aggregator.track_player_action("candle", "pickup");
        let completion = aggregator
            .complete_stage("s1", Some(40.0), &predictor)
            .unwrap();

        assert_eq!(completion.stage.player_actions.len(), 2);
        assert_eq!(completion.stage.total_stage_attempts, 0);
        assert!((completion.metrics.avg_attempts_per_puzzle - 2.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_handle_event_emits_skill_update_and_restart_resets() {
        let mut aggregator = MetricsAggregator::default();
        let predictor = |m: &SkillMetrics| {
            if m.avg_time_per_stage < 20.0 {
                SkillTier::Expert
            } else {
                SkillTier::Intermediate
            }
        };
        let events = [
            GameEvent::StageStarted {
                stage_id: "room".to_owned(),
            },
            GameEvent::PuzzleInteracted {
                id: "lever".to_owned(),
                success: true,
            },
            GameEvent::StageCompleted {
                stage_id: "room".to_owned(),
                elapsed_secs: Some(12.0),
            },
        ];
        let updates: Vec<_> = events
            .iter()
            .filter_map(|e| aggregator.handle_event(e, &predictor))
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0.skill_level, SkillTier::Expert);

        let session_id = aggregator.session_id().to_owned();
        assert!(aggregator.handle_event(&GameEvent::Restart, &predictor).is_none());
        assert_ne!(aggregator.session_id(), session_id);
        assert!(aggregator.skill_history().is_empty());
        assert_eq!(aggregator.cumulative().stages_completed, 0);
    }
}
