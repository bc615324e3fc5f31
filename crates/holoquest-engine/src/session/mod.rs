//! Session-scoped metrics collection.
//!
//! - [`MetricsAggregator`] - Folds gameplay events into stage and cumulative statistics
//! - [`StageMetrics`] / [`CumulativeMetrics`] - Per-stage and running totals
//! - [`GameEvent`] - Typed ingestion events, with [`SkillLevelUpdated`] as the output event
//! - [`MetricsSink`] - Best-effort store for [`SessionSnapshot`]s
//!
//! # Example
//!
//! ```
//! use holoquest_engine::{MemorySink, MetricsAggregator, SkillMetrics, SkillTier};
//!
//! let sink = MemorySink::new();
//! let mut aggregator = MetricsAggregator::new(sink.clone());
//! let predictor = |_: &SkillMetrics| SkillTier::Intermediate;
//!
//! aggregator.start_stage("room", &predictor);
//! aggregator.track_puzzle_attempt("lever", false);
//! aggregator.track_puzzle_attempt("lever", true);
//! let completion = aggregator.complete_stage("room", Some(35.0), &predictor).unwrap();
//!
//! assert_eq!(completion.result.skill_level, SkillTier::Intermediate);
//! assert_eq!(sink.snapshots().len(), 1);
//! ```

pub use self::{aggregator::*, event::*, sink::*, stage::*};

mod aggregator;
mod event;
mod sink;
mod stage;
