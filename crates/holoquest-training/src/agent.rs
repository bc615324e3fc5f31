//! Deep Q-learning agent that classifies players into skill tiers.
//!
//! A single [`QLearningAgent`] type serves both inference and training, selected by
//! [`AgentMode`]. Training-only state (target network, replay memories, exploration
//! schedule, optimizer) exists only in [`AgentMode::Trainable`].
//!
//! # Training Loop
//!
//! ```text
//! demonstrations (15 states × demo_repeats, priority 3) → pretrain_passes replays
//! for each episode:
//!     curriculum: random state from the band of tier (episode % 3), forced action (priority 2)
//!     rollout:    up to exploration_steps ε-greedy steps from env.reset() (priority 1)
//!     ε ← max(ε_min, ε · decay)
//!     periodic progress log and validation (diagnostic only)
//! ```
//!
//! Every observed experience lands in the shared memory and in the memory of its
//! action. Once the shared memory holds a batch, each observation triggers one replay
//! per action memory plus, every `full_replay_every` replays, one over everything.
//!
//! # Inference
//!
//! [`QLearningAgent::predict_skill_level`] applies the rule layer first and only then
//! consults the network. An agent that was neither trained nor successfully loaded has
//! no model and answers [`SkillTier::Intermediate`] wherever the network would decide.

use std::path::Path;

use holoquest_engine::{SkillMetrics, SkillPredictor, SkillState, SkillTier};
use holoquest_evaluator::{
    Adam, Classification, ClassificationReason, QNetwork, QValues, RuleBasedClassifier,
    persistence::{self, ModelLoadError, ModelSaveError},
};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::{
    config::AgentConfig,
    curriculum::{DEMONSTRATIONS, TierBand, focus_tier},
    environment::{Environment, Step},
    exploration::ExplorationSchedule,
    replay::{Experience, ReplayBuffer},
    validation::ValidationReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum AgentMode {
    #[display("inference")]
    Inference,
    #[display("trainable")]
    Trainable,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum AgentError {
    #[display("agent is in inference mode and cannot be trained")]
    NotTrainable,
}

/// Which memory a replay samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaySource {
    All,
    Action(SkillTier),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
    pub episodes: usize,
    pub demonstrations: usize,
    pub replays: u64,
    pub final_epsilon: f32,
    /// Actions taken during curriculum and rollout steps, indexed by tier.
    pub action_counts: [u64; SkillTier::LEN],
    /// Mean total reward of the free rollouts.
    pub mean_rollout_reward: f32,
    pub validations: Vec<ValidationReport>,
}

#[derive(Debug, Clone)]
struct Trainer {
    target: QNetwork,
    optimizer: Adam,
    memory: ReplayBuffer,
    action_memories: [ReplayBuffer; SkillTier::LEN],
    exploration: ExplorationSchedule,
    replay_count: u64,
    action_counts: [u64; SkillTier::LEN],
}

impl Trainer {
    fn new(config: &AgentConfig, online: &QNetwork) -> Self {
        Self {
            target: online.clone(),
            optimizer: Adam::new(config.learning_rate),
            memory: ReplayBuffer::with_capacity(config.memory_capacity),
            action_memories: std::array::from_fn(|_| {
                ReplayBuffer::with_capacity(config.memory_capacity)
            }),
            exploration: ExplorationSchedule::new(
                config.epsilon_start,
                config.epsilon_min,
                config.epsilon_decay,
            ),
            replay_count: 0,
            action_counts: [0; SkillTier::LEN],
        }
    }
}

#[derive(Debug, Clone)]
pub struct QLearningAgent {
    mode: AgentMode,
    config: AgentConfig,
    online: QNetwork,
    has_model: bool,
    classifier: RuleBasedClassifier,
    rng: Pcg32,
    trainer: Option<Trainer>,
}

impl QLearningAgent {
    /// Creates an agent with a freshly initialized network and no model.
    #[must_use]
    pub fn new(mode: AgentMode, config: AgentConfig, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let online = QNetwork::new(&config.hidden_layers, &mut rng);
        let trainer = match mode {
            AgentMode::Trainable => Some(Trainer::new(&config, &online)),
            AgentMode::Inference => None,
        };
        let classifier =
            RuleBasedClassifier::new(config.rules).with_normalization(config.normalization);
        Self {
            mode,
            config,
            online,
            has_model: false,
            classifier,
            rng,
            trainer,
        }
    }

    #[must_use]
    pub fn inference(config: AgentConfig, seed: u64) -> Self {
        Self::new(AgentMode::Inference, config, seed)
    }

    #[must_use]
    pub fn trainable(config: AgentConfig, seed: u64) -> Self {
        Self::new(AgentMode::Trainable, config, seed)
    }

    /// Creates an inference agent from a saved model directory.
    ///
    /// A missing or corrupt model is logged and the agent starts without a model.
    #[must_use]
    pub fn from_model_dir(config: AgentConfig, seed: u64, dir: &Path) -> Self {
        let mut agent = Self::inference(config, seed);
        agent.load_model_or_default(dir);
        agent
    }

    #[must_use]
    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Whether the network was trained or loaded, as opposed to freshly initialized.
    #[must_use]
    pub fn has_model(&self) -> bool {
        self.has_model
    }

    #[must_use]
    pub fn network(&self) -> &QNetwork {
        &self.online
    }

    /// Current exploration rate; `None` in inference mode.
    #[must_use]
    pub fn epsilon(&self) -> Option<f32> {
        self.trainer.as_ref().map(|t| t.exploration.epsilon())
    }

    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.trainer.as_ref().map_or(0, |t| t.memory.len())
    }

    #[must_use]
    pub fn replay_count(&self) -> u64 {
        self.trainer.as_ref().map_or(0, |t| t.replay_count)
    }

    fn trainer_mut(&mut self) -> Result<&mut Trainer, AgentError> {
        self.trainer.as_mut().ok_or(AgentError::NotTrainable)
    }

    /// Greedy action of the online network.
    #[must_use]
    pub fn greedy_action(&self, state: &SkillState) -> SkillTier {
        self.online.predict(state).argmax()
    }

    /// ε-greedy in trainable mode, greedy in inference mode.
    pub fn select_action(&mut self, state: &SkillState) -> SkillTier {
        if let Some(trainer) = &self.trainer
            && trainer.exploration.should_explore(&mut self.rng)
        {
            return SkillTier::ALL[self.rng.random_range(0..SkillTier::LEN)];
        }
        self.greedy_action(state)
    }

    /// Stores an experience and, once a batch is available, runs a balanced training step.
    pub fn observe(&mut self, experience: Experience) -> Result<(), AgentError> {
        let batch_size = self.config.batch_size;
        let trainer = self.trainer_mut()?;
        trainer.memory.push(experience);
        trainer.action_memories[experience.action.index()].push(experience);
        if trainer.memory.len() >= batch_size {
            self.train_balanced();
        }
        Ok(())
    }

    fn train_balanced(&mut self) {
        for tier in SkillTier::ALL {
            self.replay(ReplaySource::Action(tier));
        }
        let every = self.config.full_replay_every.max(1);
        if self.replay_count() % every == 0 {
            self.replay(ReplaySource::All);
        }
    }

    /// One prioritized replay step. Returns the batch loss, or `None` if skipped
    /// (inference mode, or fewer than `min_replay_samples` experiences).
    pub fn replay(&mut self, source: ReplaySource) -> Option<f32> {
        let trainer = self.trainer.as_mut()?;
        let pool = match source {
            ReplaySource::All => &trainer.memory,
            ReplaySource::Action(tier) => &trainer.action_memories[tier.index()],
        };
        if pool.len() < self.config.min_replay_samples {
            return None;
        }
        let batch = pool.sample(self.config.batch_size.min(pool.len()), &mut self.rng);

        let gamma = self.config.gamma;
        let mut states = Vec::with_capacity(batch.len());
        let mut targets = Vec::with_capacity(batch.len());
        for experience in &batch {
            let QValues(mut target) = self.online.predict(&experience.state);
            target[experience.action.index()] = if experience.done {
                experience.reward
            } else {
                experience.reward + gamma * trainer.target.predict(&experience.next_state).max()
            };
            states.push(experience.state);
            targets.push(QValues(target));
        }

        let loss = self
            .online
            .train_batch(&states, &targets, &mut trainer.optimizer);
        if !loss.is_finite() {
            tracing::warn!(?source, loss, "non-finite training loss");
        }

        trainer.replay_count += 1;
        if trainer.replay_count % self.config.update_frequency.max(1) == 0 {
            trainer.target.copy_weights_from(&self.online);
            tracing::trace!(replays = trainer.replay_count, "target network synced");
        }
        Some(loss)
    }

    /// Runs a full training session against `env`.
    pub fn train<E>(&mut self, env: &mut E, episodes: usize) -> Result<TrainingReport, AgentError>
    where
        E: Environment + ?Sized,
    {
        self.trainer_mut()?;
        tracing::info!(episodes, "training started");

        let mut needs_reset = true;
        let demonstrations = self.prefill_demonstrations(env, &mut needs_reset)?;

        let mut validations = vec![];
        let mut rollout_reward = 0.0;
        for episode in 0..episodes {
            let tier = focus_tier(episode);
            let state = TierBand::of(tier).sample(&mut self.rng);
            let step = forced_step(env, tier, &mut needs_reset);
            self.count_action(tier);
            self.observe(Experience {
                state,
                action: tier,
                reward: step.reward,
                next_state: step.next_state,
                done: step.done,
                priority: self.config.curriculum_priority,
            })?;

            let mut state = env.reset();
            let mut episode_reward = 0.0;
            for _ in 0..self.config.exploration_steps {
                let action = self.select_action(&state);
                self.count_action(action);
                let step = env.step(action);
                needs_reset = step.done;
                episode_reward += step.reward;
                self.observe(Experience {
                    state,
                    action,
                    reward: step.reward,
                    next_state: step.next_state,
                    done: step.done,
                    priority: self.config.exploration_priority,
                })?;
                state = step.next_state;
                if step.done {
                    break;
                }
            }
            rollout_reward += episode_reward;

            let epsilon = self.trainer_mut()?.exploration.decay_step();

            let log_every = self.config.log_every;
            if episode < 5 || (log_every != 0 && (episode + 1) % log_every == 0) {
                self.log_progress(episode + 1, episodes, episode_reward, epsilon);
            }

            let validate_every = self.config.validate_every;
            if episode + 1 == episodes
                || (validate_every != 0 && (episode + 1) % validate_every == 0)
            {
                let report = ValidationReport::run(&self.online, Some(episode + 1));
                report.log();
                validations.push(report);
            }
        }

        self.has_model = true;
        let trainer = self.trainer_mut()?;
        #[expect(clippy::cast_precision_loss)]
        let mean_rollout_reward = if episodes == 0 {
            0.0
        } else {
            rollout_reward / episodes as f32
        };
        let report = TrainingReport {
            episodes,
            demonstrations,
            replays: trainer.replay_count,
            final_epsilon: trainer.exploration.epsilon(),
            action_counts: trainer.action_counts,
            mean_rollout_reward,
            validations,
        };
        tracing::info!(
            episodes,
            replays = report.replays,
            epsilon = report.final_epsilon,
            "training finished"
        );
        Ok(report)
    }

    fn prefill_demonstrations<E>(
        &mut self,
        env: &mut E,
        needs_reset: &mut bool,
    ) -> Result<usize, AgentError>
    where
        E: Environment + ?Sized,
    {
        let repeats = self.config.demo_repeats;
        let priority = self.config.demo_priority;
        let trainer = self.trainer_mut()?;
        let mut stored = 0;
        for demo in &DEMONSTRATIONS {
            let state = SkillState::from(demo.state);
            for _ in 0..repeats {
                let step = forced_step(env, demo.tier, needs_reset);
                trainer.memory.push(Experience {
                    state,
                    action: demo.tier,
                    reward: step.reward,
                    next_state: step.next_state,
                    done: step.done,
                    priority,
                });
                stored += 1;
            }
        }
        for _ in 0..self.config.pretrain_passes {
            self.replay(ReplaySource::All);
        }
        tracing::info!(
            stored,
            passes = self.config.pretrain_passes,
            "pretrained on demonstrations"
        );
        Ok(stored)
    }

    fn count_action(&mut self, action: SkillTier) {
        if let Some(trainer) = &mut self.trainer {
            trainer.action_counts[action.index()] += 1;
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn log_progress(&self, episode: usize, episodes: usize, reward: f32, epsilon: f32) {
        let Some(trainer) = &self.trainer else {
            return;
        };
        let total = trainer.action_counts.iter().sum::<u64>().max(1) as f32;
        let [beginner, intermediate, expert] =
            trainer.action_counts.map(|count| count as f32 / total * 100.0);
        tracing::info!(
            "episode {episode}/{episodes}, reward {reward:.2}, epsilon {epsilon:.2}, \
             actions: Beginner={beginner:.1}% Intermediate={intermediate:.1}% Expert={expert:.1}%"
        );
    }

    /// Runs the fixed validation table through the online network.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        ValidationReport::run(&self.online, None)
    }

    /// Full classification with the reason it was reached.
    #[must_use]
    pub fn classify(&self, metrics: &SkillMetrics) -> Classification {
        let network = self.has_model.then_some(&self.online);
        if self.config.rule_overrides {
            return self.classifier.classify(metrics, network);
        }
        match network {
            Some(network) => {
                let state = SkillState::from_metrics(metrics, &self.config.normalization);
                let q_values = network.predict(&state);
                Classification {
                    tier: q_values.argmax(),
                    reason: ClassificationReason::Network,
                    q_values: Some(q_values),
                }
            }
            None => Classification::without_network(
                SkillTier::default(),
                ClassificationReason::NoModel,
            ),
        }
    }

    /// Inference entry point: raw metrics in, tier out. Never fails.
    #[must_use]
    pub fn predict_skill_level(&self, metrics: &SkillMetrics) -> SkillTier {
        let classification = self.classify(metrics);
        tracing::debug!(
            time = metrics.avg_time_per_stage,
            attempts = metrics.avg_attempts_per_puzzle,
            success = metrics.overall_success_rate,
            tier = %classification.tier,
            reason = %classification.reason,
            "skill level predicted"
        );
        classification.tier
    }

    /// Replaces the online network (and the target network, when training) with a saved model.
    pub fn load_model(&mut self, dir: &Path) -> Result<(), ModelLoadError> {
        let network = persistence::load_model_dir(dir)?;
        self.online = network;
        if let Some(trainer) = &mut self.trainer {
            trainer.target.copy_weights_from(&self.online);
            trainer.optimizer = Adam::new(self.config.learning_rate);
        }
        self.has_model = true;
        Ok(())
    }

    /// Like [`load_model`](Self::load_model), but a failure is only logged and leaves the
    /// agent unchanged. Returns whether a model was loaded.
    pub fn load_model_or_default(&mut self, dir: &Path) -> bool {
        match self.load_model(dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %e,
                    "failed to load model, falling back to default tier"
                );
                false
            }
        }
    }

    pub fn save_model(&self, dir: &Path) -> Result<(), ModelSaveError> {
        persistence::save_model_dir(&self.online, dir)
    }
}

impl SkillPredictor for QLearningAgent {
    fn predict_skill_level(&self, metrics: &SkillMetrics) -> SkillTier {
        QLearningAgent::predict_skill_level(self, metrics)
    }
}

/// Steps `env` with a fixed action, resetting it first if the last step ended an episode.
fn forced_step<E>(env: &mut E, action: SkillTier, needs_reset: &mut bool) -> Step
where
    E: Environment + ?Sized,
{
    if std::mem::take(needs_reset) {
        env.reset();
    }
    let step = env.step(action);
    *needs_reset = step.done;
    step
}
