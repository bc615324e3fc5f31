use holoquest_engine::Normalization;
use holoquest_evaluator::{RuleThresholds, q_network::DEFAULT_HIDDEN_LAYERS};
use serde::{Deserialize, Serialize};

/// Hyperparameters of the Q-learning agent.
///
/// Every field has a default, so a JSON config only needs the fields it overrides:
///
/// ```
/// use holoquest_training::AgentConfig;
///
/// let config: AgentConfig = serde_json::from_str(r#"{"batchSize": 32}"#).unwrap();
/// assert_eq!(config.batch_size, 32);
/// assert_eq!(config.memory_capacity, 20_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Discount factor of the TD target.
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    /// Multiplicative ε decay applied once per episode.
    pub epsilon_decay: f32,
    pub batch_size: usize,
    pub memory_capacity: usize,
    pub learning_rate: f32,
    /// Number of replays between target network syncs.
    pub update_frequency: u64,
    /// Hidden layer widths; zero entries are skipped.
    pub hidden_layers: Vec<usize>,
    /// Copies of each demonstration stored before training.
    pub demo_repeats: usize,
    /// Replays over the demonstrations before the first episode.
    pub pretrain_passes: usize,
    /// Maximum length of the free rollout in each episode.
    pub exploration_steps: usize,
    /// Validation interval in episodes; `0` only validates after the last episode.
    pub validate_every: usize,
    /// Progress log interval in episodes; `0` disables periodic progress logs.
    pub log_every: usize,
    /// Replays of fewer experiences are skipped.
    pub min_replay_samples: usize,
    /// A replay over the whole memory runs when the replay count is a multiple of this.
    pub full_replay_every: u64,
    pub demo_priority: f32,
    pub curriculum_priority: f32,
    pub exploration_priority: f32,
    /// Apply the rule layer at inference; when off the network answers alone.
    pub rule_overrides: bool,
    pub rules: RuleThresholds,
    pub normalization: Normalization,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            epsilon_start: 1.0,
            epsilon_min: 0.1,
            epsilon_decay: 0.998,
            batch_size: 64,
            memory_capacity: 20_000,
            learning_rate: 1e-4,
            update_frequency: 5,
            hidden_layers: DEFAULT_HIDDEN_LAYERS.to_vec(),
            demo_repeats: 30,
            pretrain_passes: 10,
            exploration_steps: 3,
            validate_every: 100,
            log_every: 50,
            min_replay_samples: 10,
            full_replay_every: 10,
            demo_priority: 3.0,
            curriculum_priority: 2.0,
            exploration_priority: 1.0,
            rule_overrides: true,
            rules: RuleThresholds::default(),
            normalization: Normalization::DEFAULT,
        }
    }
}
