use holoquest_engine::{SkillState, SkillTier};
use holoquest_evaluator::{QNetwork, QValues};
use serde::Serialize;

/// A hand-labelled reference state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationCase {
    pub label: &'static str,
    pub state: [f32; SkillState::LEN],
    pub expected: SkillTier,
}

const fn case(
    label: &'static str,
    state: [f32; SkillState::LEN],
    expected: SkillTier,
) -> ValidationCase {
    ValidationCase {
        label,
        state,
        expected,
    }
}

/// Three core cases followed by two edge cases per tier.
pub const VALIDATION_CASES: [ValidationCase; 9] = [
    case("Expert", [0.067, 0.167, 0.950], SkillTier::Expert),
    case("Intermediate", [0.333, 0.333, 0.600], SkillTier::Intermediate),
    case("Beginner", [0.667, 0.667, 0.300], SkillTier::Beginner),
    case("Expert+", [0.100, 0.167, 0.900], SkillTier::Expert),
    case("Expert-", [0.250, 0.250, 0.700], SkillTier::Expert),
    case("Intermediate+", [0.400, 0.417, 0.500], SkillTier::Intermediate),
    case("Intermediate-", [0.500, 0.500, 0.400], SkillTier::Intermediate),
    case("Beginner+", [0.800, 0.750, 0.200], SkillTier::Beginner),
    case("Beginner-", [0.600, 0.600, 0.400], SkillTier::Beginner),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseOutcome {
    pub label: String,
    pub state: [f32; SkillState::LEN],
    pub q_values: [f32; SkillTier::LEN],
    pub predicted: SkillTier,
    pub expected: SkillTier,
}

impl CaseOutcome {
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.predicted == self.expected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Episode count at which the report was taken, if during training.
    pub episode: Option<usize>,
    pub cases: Vec<CaseOutcome>,
}

impl ValidationReport {
    /// Runs every case of [`VALIDATION_CASES`] through the network greedily.
    #[must_use]
    pub fn run(network: &QNetwork, episode: Option<usize>) -> Self {
        let cases = VALIDATION_CASES
            .iter()
            .map(|case| {
                let state = SkillState::from(case.state);
                let QValues(q_values) = network.predict(&state);
                CaseOutcome {
                    label: case.label.to_owned(),
                    state: case.state,
                    q_values,
                    predicted: QValues(q_values).argmax(),
                    expected: case.expected,
                }
            })
            .collect();
        Self { episode, cases }
    }

    #[must_use]
    pub fn correct(&self) -> usize {
        self.cases.iter().filter(|c| c.is_correct()).count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f32 {
        if self.cases.is_empty() {
            0.0
        } else {
            self.correct() as f32 / self.total() as f32
        }
    }

    /// Logs one line per case and the overall accuracy.
    pub fn log(&self) {
        for c in &self.cases {
            tracing::debug!(
                label = %c.label,
                state = ?c.state,
                q = ?c.q_values,
                predicted = %c.predicted,
                expected = %c.expected,
                ok = c.is_correct(),
                "validation case"
            );
        }
        tracing::info!(
            episode = self.episode,
            correct = self.correct(),
            total = self.total(),
            "validation accuracy {:.1}%",
            self.accuracy() * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use holoquest_evaluator::q_network::{Activation, DenseLayer};

    use super::*;

    #[test]
    fn test_case_table_is_balanced() {
        for tier in SkillTier::ALL {
            assert_eq!(VALIDATION_CASES.iter().filter(|c| c.expected == tier).count(), 3);
        }
    }

    #[test]
    fn test_accuracy_of_constant_network() {
        // always Expert
        let layer =
            DenseLayer::from_parts(3, 3, Activation::Linear, vec![0.0; 9], vec![0.0, 0.0, 1.0])
                .unwrap();
        let network = QNetwork::from_layers(vec![layer]).unwrap();
        let report = ValidationReport::run(&network, Some(100));
        assert_eq!(report.correct(), 3);
        assert_eq!(report.total(), 9);
        assert!((report.accuracy() - 1.0 / 3.0).abs() < 1e-6);
        assert!(report.cases[0].is_correct());
        assert!(!report.cases[1].is_correct());
    }

    #[test]
    fn test_report_serializes() {
        let layer =
            DenseLayer::from_parts(3, 3, Activation::Linear, vec![0.0; 9], vec![1.0, 0.0, 0.0])
                .unwrap();
        let network = QNetwork::from_layers(vec![layer]).unwrap();
        let value = serde_json::to_value(ValidationReport::run(&network, None)).unwrap();
        assert_eq!(value["cases"][2]["label"], "Beginner");
        assert_eq!(value["cases"][2]["predicted"], "Beginner");
        assert!(value["episode"].is_null());
    }
}
