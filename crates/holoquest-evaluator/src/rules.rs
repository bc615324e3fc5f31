//! Deterministic guardrails applied around Q-network inference.
//!
//! The learned policy tends to over-predict the middle tier. The rule layer
//! counters that with a fixed precedence, first match wins:
//!
//! 1. **Expert fast path**: very fast, few attempts, high success rate.
//! 2. **Beginner fast path**: very slow, or many attempts while moderately slow.
//! 3. **Network**: the greedy action of the Q-network. If it says `Intermediate`
//!    while time or attempts lean toward `Beginner` and the beginner score is close
//!    enough to the intermediate score, the answer becomes `Beginner`.
//!
//! The fast paths read raw metrics and never touch the network, so they hold even
//! when no model is available. Only step 3 needs a network; without one the result
//! is the default tier, [`SkillTier::Intermediate`].
//!
//! All thresholds come from manual tuning and live in [`RuleThresholds`].

use holoquest_engine::{Normalization, SkillMetrics, SkillState, SkillTier};
use serde::{Deserialize, Serialize};

use crate::q_network::{QNetwork, QValues};

/// Named thresholds for the rule layer. Times are seconds, attempts per puzzle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleThresholds {
    /// Expert requires `time < expert_max_time`.
    pub expert_max_time: f32,
    /// Expert requires `attempts <= expert_max_attempts`.
    pub expert_max_attempts: f32,
    /// Expert requires `success >= expert_min_success`.
    pub expert_min_success: f32,
    /// Beginner if `time > beginner_min_time`.
    pub beginner_min_time: f32,
    /// Beginner if `attempts >= beginner_min_attempts` and `time > beginner_slow_time`.
    pub beginner_min_attempts: f32,
    pub beginner_slow_time: f32,
    /// An `Intermediate` prediction leans toward Beginner if `time > lean_time`
    /// or `attempts >= lean_attempts`.
    pub lean_time: f32,
    pub lean_attempts: f32,
    /// The beginner Q-value must exceed this to override.
    pub beginner_score_floor: f32,
    /// The beginner Q-value must exceed `closeness_ratio * intermediate Q-value`.
    pub closeness_ratio: f32,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            expert_max_time: 20.0,
            expert_max_attempts: 1.5,
            expert_min_success: 0.8,
            beginner_min_time: 80.0,
            beginner_min_attempts: 4.0,
            beginner_slow_time: 60.0,
            lean_time: 60.0,
            lean_attempts: 3.5,
            beginner_score_floor: 15.0,
            closeness_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum ClassificationReason {
    #[display("expert fast path")]
    ExpertFastPath,
    #[display("beginner fast path")]
    BeginnerFastPath,
    #[display("beginner override")]
    BeginnerOverride,
    #[display("network")]
    Network,
    #[display("no model")]
    NoModel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub tier: SkillTier,
    pub reason: ClassificationReason,
    /// Network scores, when the network was consulted.
    pub q_values: Option<QValues>,
}

impl Classification {
    #[must_use]
    pub const fn without_network(tier: SkillTier, reason: ClassificationReason) -> Self {
        Self {
            tier,
            reason,
            q_values: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleBasedClassifier {
    thresholds: RuleThresholds,
    normalization: Normalization,
}

impl RuleBasedClassifier {
    #[must_use]
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self {
            thresholds,
            normalization: Normalization::DEFAULT,
        }
    }

    #[must_use]
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    #[must_use]
    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    /// Returns the fast-path decision, if one applies.
    #[must_use]
    pub fn fast_path(&self, metrics: &SkillMetrics) -> Option<Classification> {
        let t = &self.thresholds;
        let time = metrics.avg_time_per_stage;
        let attempts = metrics.avg_attempts_per_puzzle;
        let success = metrics.overall_success_rate;

        if time < t.expert_max_time
            && attempts <= t.expert_max_attempts
            && success >= t.expert_min_success
        {
            return Some(Classification::without_network(
                SkillTier::Expert,
                ClassificationReason::ExpertFastPath,
            ));
        }
        if time > t.beginner_min_time
            || (attempts >= t.beginner_min_attempts && time > t.beginner_slow_time)
        {
            return Some(Classification::without_network(
                SkillTier::Beginner,
                ClassificationReason::BeginnerFastPath,
            ));
        }
        None
    }

    /// Classifies `metrics` with the full rule precedence.
    ///
    /// `network` is `None` when no trained or loaded model is available.
    #[must_use]
    pub fn classify(&self, metrics: &SkillMetrics, network: Option<&QNetwork>) -> Classification {
        if let Some(decision) = self.fast_path(metrics) {
            return decision;
        }
        let Some(network) = network else {
            return Classification::without_network(
                SkillTier::default(),
                ClassificationReason::NoModel,
            );
        };

        let state = SkillState::from_metrics(metrics, &self.normalization);
        let q_values = network.predict(&state);
        let predicted = q_values.argmax();
        let tier = if predicted == SkillTier::Intermediate && self.leans_beginner(metrics, &q_values)
        {
            SkillTier::Beginner
        } else {
            predicted
        };
        let reason = if tier == predicted {
            ClassificationReason::Network
        } else {
            ClassificationReason::BeginnerOverride
        };
        Classification {
            tier,
            reason,
            q_values: Some(q_values),
        }
    }

    fn leans_beginner(&self, metrics: &SkillMetrics, q_values: &QValues) -> bool {
        let t = &self.thresholds;
        let leaning = metrics.avg_time_per_stage > t.lean_time
            || metrics.avg_attempts_per_puzzle >= t.lean_attempts;
        let beginner = q_values.get(SkillTier::Beginner);
        let intermediate = q_values.get(SkillTier::Intermediate);
        leaning && beginner > t.beginner_score_floor && beginner > intermediate * t.closeness_ratio
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::q_network::{Activation, DenseLayer};

    /// Single linear layer that ignores its input and returns `bias`.
    fn constant_network(bias: [f32; 3]) -> QNetwork {
        let layer =
            DenseLayer::from_parts(3, 3, Activation::Linear, vec![0.0; 9], bias.to_vec()).unwrap();
        QNetwork::from_layers(vec![layer]).unwrap()
    }

    fn random_network(seed: u64) -> QNetwork {
        let mut rng = Pcg32::seed_from_u64(seed);
        QNetwork::new(&[32, 32], &mut rng)
    }

    #[test]
    fn test_expert_fast_path_ignores_network() {
        let classifier = RuleBasedClassifier::default();
        let metrics = SkillMetrics::new(10.0, 1.0, 0.95);
        for network in [
            None,
            Some(random_network(0)),
            Some(constant_network([100.0, 0.0, -100.0])),
        ] {
            let result = classifier.classify(&metrics, network.as_ref());
            assert_eq!(result.tier, SkillTier::Expert);
            assert_eq!(result.reason, ClassificationReason::ExpertFastPath);
        }
    }

    #[test]
    fn test_beginner_fast_path() {
        let classifier = RuleBasedClassifier::default();
        let metrics = SkillMetrics::new(90.0, 4.5, 0.2);
        let result = classifier.classify(&metrics, Some(&constant_network([0.0, 0.0, 50.0])));
        assert_eq!(result.tier, SkillTier::Beginner);
        assert_eq!(result.reason, ClassificationReason::BeginnerFastPath);

        // many attempts and moderately slow
        let metrics = SkillMetrics::new(65.0, 4.0, 0.6);
        assert_eq!(
            classifier.classify(&metrics, None).reason,
            ClassificationReason::BeginnerFastPath
        );
    }

    #[test]
    fn test_no_model_defaults_to_intermediate() {
        let classifier = RuleBasedClassifier::default();
        let result = classifier.classify(&SkillMetrics::new(45.0, 2.0, 0.7), None);
        assert_eq!(result.tier, SkillTier::Intermediate);
        assert_eq!(result.reason, ClassificationReason::NoModel);
        assert!(result.q_values.is_none());
    }

    #[test]
    fn test_intermediate_overridden_when_leaning_beginner() {
        let classifier = RuleBasedClassifier::default();
        let network = constant_network([18.0, 20.0, 5.0]);

        let leaning = SkillMetrics::new(70.0, 3.0, 0.5);
        let result = classifier.classify(&leaning, Some(&network));
        assert_eq!(result.tier, SkillTier::Beginner);
        assert_eq!(result.reason, ClassificationReason::BeginnerOverride);

        let not_leaning = SkillMetrics::new(45.0, 2.0, 0.5);
        let result = classifier.classify(&not_leaning, Some(&network));
        assert_eq!(result.tier, SkillTier::Intermediate);
        assert_eq!(result.reason, ClassificationReason::Network);
    }

    #[test]
    fn test_override_needs_close_beginner_score() {
        let classifier = RuleBasedClassifier::default();
        let leaning = SkillMetrics::new(70.0, 3.6, 0.5);
        // below the floor
        let result = classifier.classify(&leaning, Some(&constant_network([10.0, 12.0, 0.0])));
        assert_eq!(result.tier, SkillTier::Intermediate);
        // not close enough
        let result = classifier.classify(&leaning, Some(&constant_network([16.0, 40.0, 0.0])));
        assert_eq!(result.tier, SkillTier::Intermediate);
    }

    #[test]
    fn test_custom_thresholds() {
        let classifier = RuleBasedClassifier::new(RuleThresholds {
            expert_max_time: 30.0,
            ..RuleThresholds::default()
        });
        let metrics = SkillMetrics::new(25.0, 1.0, 0.9);
        assert_eq!(classifier.classify(&metrics, None).tier, SkillTier::Expert);
    }

    #[test]
    fn test_thresholds_deserialize_partial() {
        let thresholds: RuleThresholds =
            serde_json::from_str(r#"{"beginnerMinTime": 100.0}"#).unwrap();
        assert!((thresholds.beginner_min_time - 100.0).abs() < f32::EPSILON);
        assert!((thresholds.closeness_ratio - 0.7).abs() < f32::EPSILON);
    }
}
