//! Skill-tier scoring for the `HoloQuest` adaptive difficulty engine.
//!
//! This crate holds everything needed to turn a [`SkillState`](holoquest_engine::SkillState)
//! into a tier at inference time:
//!
//! 1. **Q-network** ([`q_network`]) - A small dense MLP scoring the three tiers, trained
//!    with mean squared error and the [`optimizer::Adam`] optimizer.
//!
//! 2. **Rule layer** ([`rules`]) - Deterministic fast paths and a beginner override that
//!    take precedence over the network.
//!
//! 3. **Persistence** ([`persistence`]) - A versioned topology document plus a flat
//!    little-endian weight buffer.
//!
//! # Architecture
//!
//! ```text
//! SkillMetrics
//!     ↓
//! RuleBasedClassifier ── fast path ──→ SkillTier
//!     ↓ otherwise
//! QNetwork::predict → QValues::argmax → beginner override ──→ SkillTier
//! ```
//!
//! Training (experience replay, target network, exploration) lives in
//! `holoquest-training`; this crate only provides the pieces it drives.

pub use self::{
    optimizer::{Adam, AdamConfig},
    q_network::{QNetwork, QValues},
    rules::{Classification, ClassificationReason, RuleBasedClassifier, RuleThresholds},
};

pub mod optimizer;
pub mod persistence;
pub mod q_network;
pub mod rules;
