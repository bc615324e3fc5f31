//! Hand-authored training material that counteracts class imbalance.
//!
//! - [`DEMONSTRATIONS`] - Canonical normalized states per tier, replayed many times with
//!   elevated priority before the first episode
//! - [`TierBand`] - The region of state space each tier occupies; curriculum episodes
//!   draw a random state from the band of the tier they focus on
//!
//! The focus tier cycles `Beginner, Intermediate, Expert` with the episode index,
//! so every tier gets the same exposure.

use holoquest_engine::{SkillState, SkillTier};
use rand::Rng;

/// A normalized state paired with the tier it should be classified as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Demonstration {
    pub state: [f32; SkillState::LEN],
    pub tier: SkillTier,
}

const fn demo(state: [f32; SkillState::LEN], tier: SkillTier) -> Demonstration {
    Demonstration { state, tier }
}

pub const DEMONSTRATIONS: [Demonstration; 15] = [
    demo([0.7, 0.7, 0.2], SkillTier::Beginner),
    demo([0.8, 0.8, 0.3], SkillTier::Beginner),
    demo([0.9, 0.7, 0.3], SkillTier::Beginner),
    demo([0.75, 0.8, 0.2], SkillTier::Beginner),
    demo([0.8, 0.75, 0.25], SkillTier::Beginner),
    demo([0.3, 0.3, 0.6], SkillTier::Intermediate),
    demo([0.4, 0.4, 0.5], SkillTier::Intermediate),
    demo([0.35, 0.45, 0.6], SkillTier::Intermediate),
    demo([0.45, 0.35, 0.55], SkillTier::Intermediate),
    demo([0.5, 0.4, 0.5], SkillTier::Intermediate),
    demo([0.05, 0.15, 0.9], SkillTier::Expert),
    demo([0.1, 0.1, 0.95], SkillTier::Expert),
    demo([0.07, 0.12, 0.9], SkillTier::Expert),
    demo([0.12, 0.08, 0.95], SkillTier::Expert),
    demo([0.1, 0.15, 0.85], SkillTier::Expert),
];

/// Per-component `[low, low + width)` ranges of a tier's region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierBand {
    pub time: (f32, f32),
    pub attempts: (f32, f32),
    pub success_rate: (f32, f32),
}

impl TierBand {
    #[must_use]
    pub const fn of(tier: SkillTier) -> Self {
        match tier {
            SkillTier::Beginner => Self {
                time: (0.6, 0.3),
                attempts: (0.6, 0.3),
                success_rate: (0.1, 0.3),
            },
            SkillTier::Intermediate => Self {
                time: (0.3, 0.3),
                attempts: (0.3, 0.3),
                success_rate: (0.4, 0.3),
            },
            SkillTier::Expert => Self {
                time: (0.05, 0.15),
                attempts: (0.05, 0.15),
                success_rate: (0.7, 0.3),
            },
        }
    }

    pub fn sample<R>(&self, rng: &mut R) -> SkillState
    where
        R: Rng + ?Sized,
    {
        let mut draw = |(low, width): (f32, f32)| low + rng.random::<f32>() * width;
        let time = draw(self.time);
        let attempts = draw(self.attempts);
        let success_rate = draw(self.success_rate);
        SkillState::new(time, attempts, success_rate)
    }
}

/// Tier that curriculum episode `episode` focuses on.
#[must_use]
pub fn focus_tier(episode: usize) -> SkillTier {
    SkillTier::ALL[episode % SkillTier::LEN]
}
