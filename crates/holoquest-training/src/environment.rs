//! Synthetic players for offline training.
//!
//! Both environments stand in for real telemetry and are deliberately simple:
//!
//! - [`SimulatedEnvironment`] - A Markov process over aggregate metrics. Each difficulty
//!   nudges time, attempts and success rate by fixed ratios; the reward favors a balanced
//!   experience (20-40s stages, moderate attempts, decent success).
//! - [`ClassificationEnvironment`] - Rewards labelling the current metrics with the tier
//!   they fall into, and penalizes the two severe mislabellings (expert as beginner and
//!   beginner as expert) harder than the rest.
//!
//! Every environment owns a [`Pcg32`] seeded at construction, so a run is fully
//! reproducible from its seed.

use holoquest_engine::{Normalization, SkillMetrics, SkillState, SkillTier};
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

/// Result of one environment transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub next_state: SkillState,
    pub reward: f32,
    pub done: bool,
}

pub trait Environment {
    /// Starts a new episode and returns its initial state.
    fn reset(&mut self) -> SkillState;

    /// Applies a difficulty choice and advances the simulated player.
    fn step(&mut self, action: SkillTier) -> Step;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationParams {
    /// Episode length of [`SimulatedEnvironment`].
    pub stages_per_episode: u32,
    /// Relative spread of each nudge in [`SimulatedEnvironment`]; `0` is deterministic.
    pub jitter: f32,
    /// Puzzles per stage in [`ClassificationEnvironment`].
    pub puzzles_per_stage: u32,
    pub normalization: Normalization,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            stages_per_episode: 10,
            jitter: 0.1,
            puzzles_per_stage: 3,
            normalization: Normalization::DEFAULT,
        }
    }
}

/// Markov player model driven by the chosen difficulty.
#[derive(Debug, Clone)]
pub struct SimulatedEnvironment {
    params: SimulationParams,
    metrics: SkillMetrics,
    steps: u32,
    rng: Pcg32,
}

impl SimulatedEnvironment {
    #[must_use]
    pub fn new(params: SimulationParams, seed: u64) -> Self {
        Self {
            params,
            metrics: SkillMetrics::DEFAULT,
            steps: 0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Current raw metrics of the simulated player.
    #[must_use]
    pub fn metrics(&self) -> &SkillMetrics {
        &self.metrics
    }

    fn state(&self) -> SkillState {
        SkillState::from_metrics(&self.metrics, &self.params.normalization)
    }

    fn jitter_factor(&mut self) -> f32 {
        let jitter = self.params.jitter.clamp(0.0, 1.0);
        if jitter <= 0.0 {
            1.0
        } else {
            self.rng.random_range(1.0 - jitter..=1.0 + jitter)
        }
    }

    fn transition(&mut self, action: SkillTier) {
        let m = self.metrics;
        self.metrics = match action {
            SkillTier::Beginner => SkillMetrics {
                avg_time_per_stage: f32::max(
                    10.0,
                    m.avg_time_per_stage * (1.0 - 0.2 * self.jitter_factor()),
                ),
                avg_attempts_per_puzzle: f32::max(
                    1.0,
                    m.avg_attempts_per_puzzle * (1.0 - 0.3 * self.jitter_factor()),
                ),
                overall_success_rate: f32::min(
                    1.0,
                    m.overall_success_rate + 0.2 * self.jitter_factor(),
                ),
            },
            SkillTier::Intermediate => m,
            SkillTier::Expert => SkillMetrics {
                avg_time_per_stage: m.avg_time_per_stage * (1.0 + 0.2 * self.jitter_factor()),
                avg_attempts_per_puzzle: m.avg_attempts_per_puzzle
                    * (1.0 + 0.3 * self.jitter_factor()),
                overall_success_rate: f32::max(
                    0.0,
                    m.overall_success_rate - 0.1 * self.jitter_factor(),
                ),
            },
        };
    }
}

/// Blend of three step functions, each in `[0.5, 1]`, averaged equally.
#[must_use]
pub fn balance_reward(metrics: &SkillMetrics) -> f32 {
    let time = metrics.avg_time_per_stage;
    let time_reward = if time < 20.0 {
        0.5
    } else if time <= 40.0 {
        1.0
    } else {
        0.7
    };
    let attempts = metrics.avg_attempts_per_puzzle;
    let attempts_reward = if attempts < 1.5 {
        1.0
    } else if attempts <= 2.5 {
        0.8
    } else {
        0.6
    };
    let success = metrics.overall_success_rate;
    let success_reward = if success > 0.8 {
        1.0
    } else if success >= 0.5 {
        0.8
    } else {
        0.6
    };
    (time_reward + attempts_reward + success_reward) / 3.0
}

impl Environment for SimulatedEnvironment {
    fn reset(&mut self) -> SkillState {
        self.metrics = SkillMetrics::DEFAULT;
        self.steps = 0;
        self.state()
    }

    fn step(&mut self, action: SkillTier) -> Step {
        self.transition(action);
        self.steps += 1;
        Step {
            next_state: self.state(),
            reward: balance_reward(&self.metrics),
            done: self.steps >= self.params.stages_per_episode,
        }
    }
}

const CORRECT_REWARD: f32 = 20.0;
const SEVERE_PENALTY: f32 = -20.0;
const MISLABEL_PENALTY: f32 = -5.0;

/// Rewards choosing the tier whose band contains the current state.
///
/// The player is simulated as behaving like the chosen tier: each step adds one
/// puzzle's worth of time, attempts and a possible success drawn from that tier's
/// profile. The episode ends once as many puzzles were solved as the stage holds.
#[derive(Debug, Clone)]
pub struct ClassificationEnvironment {
    params: SimulationParams,
    total_time: f32,
    total_attempts: u32,
    successes: u32,
    rng: Pcg32,
}

impl ClassificationEnvironment {
    #[must_use]
    pub fn new(params: SimulationParams, seed: u64) -> Self {
        Self {
            params,
            total_time: 0.0,
            total_attempts: 0,
            successes: 0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn state(&self) -> SkillState {
        let puzzles = self.params.puzzles_per_stage.max(1) as f32;
        let metrics = SkillMetrics {
            avg_time_per_stage: self.total_time / puzzles,
            avg_attempts_per_puzzle: self.total_attempts as f32 / puzzles,
            overall_success_rate: self.successes as f32 / puzzles,
        };
        SkillState::from_metrics(&metrics, &self.params.normalization)
    }

    /// Reward for labelling `state` as `action`.
    #[must_use]
    pub fn reward(state: &SkillState, action: SkillTier) -> f32 {
        let (time, attempts, success) = (state.time(), state.attempts(), state.success_rate());
        match action {
            SkillTier::Beginner => {
                if time > 0.5 && attempts > 0.5 {
                    CORRECT_REWARD
                } else if time < 0.2 && attempts < 0.2 {
                    SEVERE_PENALTY
                } else {
                    MISLABEL_PENALTY
                }
            }
            SkillTier::Intermediate => {
                if (0.2..=0.6).contains(&time) && (0.2..=0.6).contains(&attempts) {
                    CORRECT_REWARD
                } else {
                    MISLABEL_PENALTY
                }
            }
            SkillTier::Expert => {
                if time < 0.2 && attempts < 0.2 && success > 0.7 {
                    CORRECT_REWARD
                } else if time > 0.5 || attempts > 0.5 {
                    SEVERE_PENALTY
                } else {
                    MISLABEL_PENALTY
                }
            }
        }
    }
}

impl Environment for ClassificationEnvironment {
    fn reset(&mut self) -> SkillState {
        self.total_time = 0.0;
        self.total_attempts = 0;
        self.successes = 0;
        self.state()
    }

    fn step(&mut self, action: SkillTier) -> Step {
        let reward = Self::reward(&self.state(), action);

        let (time, attempts, success_chance) = match action {
            SkillTier::Beginner => (
                self.rng.random_range(80.0..120.0),
                self.rng.random_range(4..=5),
                0.3,
            ),
            SkillTier::Intermediate => (self.rng.random_range(40.0..60.0), 2, 0.7),
            SkillTier::Expert => (self.rng.random_range(5.0..15.0), 1, 0.9),
        };
        self.total_time += time;
        self.total_attempts += attempts;
        if self.rng.random_bool(success_chance) {
            self.successes += 1;
        }

        Step {
            next_state: self.state(),
            reward,
            done: self.successes >= self.params.puzzles_per_stage,
        }
    }
}
