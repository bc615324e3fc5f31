//! Offline training of the skill-tier Q-network.
//!
//! The [`QLearningAgent`] learns to label normalized skill states by acting on an
//! [`Environment`]. Training combines:
//!
//! - prioritized experience replay ([`ReplayBuffer`]) with one memory per action,
//! - a target network synced every few replays,
//! - ε-greedy exploration ([`ExplorationSchedule`]),
//! - demonstrations and a per-tier curriculum ([`curriculum`]) against class imbalance.
//!
//! Progress is measured on a fixed table of reference states ([`validation`]); the result is
//! diagnostic and never feeds back into training.
//!
//! ```no_run
//! use holoquest_training::{AgentConfig, ClassificationEnvironment, QLearningAgent, SimulationParams};
//!
//! let mut env = ClassificationEnvironment::new(SimulationParams::default(), 42);
//! let mut agent = QLearningAgent::trainable(AgentConfig::default(), 42);
//! let report = agent.train(&mut env, 1000)?;
//! println!("final epsilon: {}", report.final_epsilon);
//! agent.save_model("model".as_ref())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use self::{
    agent::{AgentError, AgentMode, QLearningAgent, ReplaySource, TrainingReport},
    config::AgentConfig,
    environment::{
        ClassificationEnvironment, Environment, SimulatedEnvironment, SimulationParams, Step,
    },
    exploration::ExplorationSchedule,
    replay::{Experience, ReplayBuffer},
    validation::ValidationReport,
};

pub mod agent;
pub mod config;
pub mod curriculum;
pub mod environment;
pub mod exploration;
pub mod replay;
pub mod validation;
