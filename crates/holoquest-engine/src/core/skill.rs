use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Player skill tier, also the action space of the difficulty agent.
///
/// Tiers are totally ordered by intended difficulty: `Beginner < Intermediate < Expert`.
/// The numeric index (0, 1, 2) is the action id used by the Q-network output layer.
///
/// # Example
///
/// ```
/// use holoquest_engine::SkillTier;
///
/// assert_eq!(SkillTier::from_index(2), Some(SkillTier::Expert));
/// assert_eq!("Beginner".parse::<SkillTier>().unwrap(), SkillTier::Beginner);
/// assert!(SkillTier::Beginner < SkillTier::Expert);
/// ```
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum SkillTier {
    Beginner,
    #[default]
    Intermediate,
    Expert,
}

impl SkillTier {
    /// Number of tiers (size of the action space).
    pub const LEN: usize = 3;

    /// All tiers in action-id order.
    pub const ALL: [Self; Self::LEN] = [Self::Beginner, Self::Intermediate, Self::Expert];

    /// Returns the action id of this tier.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Beginner => 0,
            Self::Intermediate => 1,
            Self::Expert => 2,
        }
    }

    /// Returns the tier for an action id, or `None` if out of range.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Beginner),
            1 => Some(Self::Intermediate),
            2 => Some(Self::Expert),
            _ => None,
        }
    }

    /// Human-readable tier name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Expert => "Expert",
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("unknown skill tier: {name:?}")]
pub struct ParseSkillTierError {
    #[error(not(source))]
    name: String,
}

impl FromStr for SkillTier {
    type Err = ParseSkillTierError;

    /// Parses a tier name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseSkillTierError { name: s.to_owned() })
    }
}

/// Aggregate player performance in raw (un-normalized) units.
///
/// This is the input of skill classification. The rule layer reads the raw values
/// directly; the network reads them through [`SkillState::from_metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillMetrics {
    /// Average stage completion time in seconds.
    pub avg_time_per_stage: f32,
    /// Average number of attempts per puzzle seen.
    pub avg_attempts_per_puzzle: f32,
    /// Fraction of seen puzzles that were solved.
    pub overall_success_rate: f32,
}

impl Default for SkillMetrics {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl SkillMetrics {
    /// Fallback values used when a feature has no data yet (zero denominator).
    pub const DEFAULT: Self = Self {
        avg_time_per_stage: 40.0,
        avg_attempts_per_puzzle: 2.5,
        overall_success_rate: 0.5,
    };

    #[must_use]
    pub const fn new(
        avg_time_per_stage: f32,
        avg_attempts_per_puzzle: f32,
        overall_success_rate: f32,
    ) -> Self {
        Self {
            avg_time_per_stage,
            avg_attempts_per_puzzle,
            overall_success_rate,
        }
    }
}

/// Fixed caps used to map raw metrics onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Normalization {
    /// Seconds per stage that map to `1.0`.
    pub time_cap: f32,
    /// Attempts per puzzle that map to `1.0`.
    pub attempts_cap: f32,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Normalization {
    pub const DEFAULT: Self = Self {
        time_cap: 150.0,
        attempts_cap: 6.0,
    };

    /// Inverse of normalization for the time and attempts components.
    ///
    /// Success rate is already a ratio and passes through unchanged.
    #[must_use]
    pub fn denormalize(&self, state: &SkillState) -> SkillMetrics {
        SkillMetrics {
            avg_time_per_stage: state.time() * self.time_cap,
            avg_attempts_per_puzzle: state.attempts() * self.attempts_cap,
            overall_success_rate: state.success_rate(),
        }
    }
}

/// Normalized feature vector fed to the Q-network.
///
/// Components are `[time, attempts, success_rate]`, each guaranteed to lie in `[0, 1]`:
/// all constructors clamp, and NaN inputs collapse to `0.0`. Deserialization goes
/// through the same clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]")]
pub struct SkillState([f32; SkillState::LEN]);

impl SkillState {
    /// Number of features.
    pub const LEN: usize = 3;

    /// Builds a state from already-normalized components, clamping each into `[0, 1]`.
    #[must_use]
    pub fn new(time: f32, attempts: f32, success_rate: f32) -> Self {
        Self([unit(time), unit(attempts), unit(success_rate)])
    }

    /// Normalizes raw metrics with the given caps.
    ///
    /// # Example
    ///
    /// ```
    /// use holoquest_engine::{Normalization, SkillMetrics, SkillState};
    ///
    /// let metrics = SkillMetrics::new(300.0, 3.0, 1.4);
    /// let state = SkillState::from_metrics(&metrics, &Normalization::DEFAULT);
    /// assert_eq!(state.as_array(), &[1.0, 0.5, 1.0]);
    /// ```
    #[must_use]
    pub fn from_metrics(metrics: &SkillMetrics, normalization: &Normalization) -> Self {
        Self::new(
            metrics.avg_time_per_stage / normalization.time_cap,
            metrics.avg_attempts_per_puzzle / normalization.attempts_cap,
            metrics.overall_success_rate,
        )
    }

    #[must_use]
    pub const fn time(&self) -> f32 {
        self.0[0]
    }

    #[must_use]
    pub const fn attempts(&self) -> f32 {
        self.0[1]
    }

    #[must_use]
    pub const fn success_rate(&self) -> f32 {
        self.0[2]
    }

    #[must_use]
    pub const fn as_array(&self) -> &[f32; Self::LEN] {
        &self.0
    }
}

impl From<[f32; SkillState::LEN]> for SkillState {
    fn from([time, attempts, success_rate]: [f32; SkillState::LEN]) -> Self {
        Self::new(time, attempts, success_rate)
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_index_roundtrip() {
        for tier in SkillTier::ALL {
            assert_eq!(SkillTier::from_index(tier.index()), Some(tier));
        }
        assert_eq!(SkillTier::from_index(3), None);
    }

    #[test]
    fn test_tier_parse_is_case_insensitive() {
        assert_eq!("expert".parse::<SkillTier>().unwrap(), SkillTier::Expert);
        assert_eq!(
            " INTERMEDIATE ".parse::<SkillTier>().unwrap(),
            SkillTier::Intermediate
        );
        assert!("master".parse::<SkillTier>().is_err());
    }

    #[test]
    fn test_tier_order_follows_difficulty() {
        let mut tiers = vec![SkillTier::Expert, SkillTier::Beginner, SkillTier::Intermediate];
        tiers.sort();
        assert_eq!(tiers, SkillTier::ALL);
    }

    #[test]
    fn test_state_clamps_out_of_range_inputs() {
        let extremes = [
            SkillMetrics::new(10_000.0, 500.0, 7.0),
            SkillMetrics::new(-50.0, -3.0, -0.5),
            SkillMetrics::new(f32::INFINITY, f32::NEG_INFINITY, f32::NAN),
            SkillMetrics::new(f32::NAN, f32::NAN, f32::INFINITY),
        ];
        for metrics in extremes {
            let state = SkillState::from_metrics(&metrics, &Normalization::DEFAULT);
            for &v in state.as_array() {
                assert!((0.0..=1.0).contains(&v), "{metrics:?} -> {state:?}");
            }
        }
    }

    #[test]
    fn test_state_normalizes_with_caps() {
        let norm = Normalization {
            time_cap: 100.0,
            attempts_cap: 5.0,
        };
        let state = SkillState::from_metrics(&SkillMetrics::new(40.0, 2.5, 0.5), &norm);
        assert!((state.time() - 0.4).abs() < 1e-6);
        assert!((state.attempts() - 0.5).abs() < 1e-6);
        assert!((state.success_rate() - 0.5).abs() < 1e-6);

        let back = norm.denormalize(&state);
        assert!((back.avg_time_per_stage - 40.0).abs() < 1e-4);
        assert!((back.avg_attempts_per_puzzle - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_tier_serializes_by_name() {
        let json = serde_json::to_string(&SkillTier::Expert).unwrap();
        assert_eq!(json, "\"Expert\"");
        for tier in SkillTier::ALL {
            assert_eq!(tier.to_string(), tier.name());
        }
    }

    #[test]
    fn test_deserialized_state_is_clamped() {
        let state: SkillState = serde_json::from_str("[1.5, -0.25, 0.5]").unwrap();
        assert_eq!(state.as_array(), &[1.0, 0.0, 0.5]);
        assert_eq!(serde_json::to_string(&state).unwrap(), "[1.0,0.0,0.5]");
    }
}
