//! Skill model and metrics pipeline for the `HoloQuest` adaptive difficulty engine.
//!
//! The crate is split in two layers:
//!
//! - [`core`] - The skill data model ([`SkillTier`], [`SkillMetrics`], [`SkillState`],
//!   [`Normalization`]) and the level catalog ([`Level`], [`select_next_level`])
//! - [`session`] - The [`MetricsAggregator`] that turns gameplay events into classifier
//!   features, and the [`MetricsSink`]s that persist session snapshots
//!
//! Classification itself lives behind the [`SkillPredictor`] trait so that this crate
//! stays independent of any model.
//!
//! # Data Flow
//!
//! ```text
//! GameEvent -> MetricsAggregator -> SkillMetrics -> SkillPredictor -> SkillTier
//!                    |                                                  |
//!                    v                                                  v
//!              MetricsSink                                   select_next_level
//! ```

pub use self::{core::*, session::*};

pub mod core;
pub mod session;
