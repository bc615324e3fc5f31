use std::collections::VecDeque;

use holoquest_engine::{SkillState, SkillTier};
use rand::Rng;

/// One recorded transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Experience {
    pub state: SkillState,
    pub action: SkillTier,
    pub reward: f32,
    pub next_state: SkillState,
    pub done: bool,
    /// Relative sampling weight, never negative.
    pub priority: f32,
}

/// Bounded experience store with strict oldest-first eviction.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    capacity: usize,
    buf: VecDeque<Experience>,
}

impl ReplayBuffer {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, mut experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        if experience.priority.is_nan() || experience.priority < 0.0 {
            experience.priority = 0.0;
        }
        self.buf.push_back(experience);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buf.iter()
    }

    /// Draws `count` experiences with replacement, each picked with probability
    /// proportional to its priority.
    ///
    /// Falls back to uniform sampling when every priority is zero. Returns an
    /// empty vector for an empty buffer.
    pub fn sample<R>(&self, count: usize, rng: &mut R) -> Vec<Experience>
    where
        R: Rng + ?Sized,
    {
        if self.buf.is_empty() {
            return vec![];
        }

        let mut cumulative = Vec::with_capacity(self.buf.len());
        let mut total = 0.0_f64;
        for experience in &self.buf {
            total += f64::from(experience.priority);
            cumulative.push(total);
        }

        (0..count)
            .map(|_| {
                let index = if total > 0.0 {
                    let value = rng.random::<f64>() * total;
                    cumulative
                        .partition_point(|&c| c <= value)
                        .min(self.buf.len() - 1)
                } else {
                    rng.random_range(0..self.buf.len())
                };
                self.buf[index]
            })
            .collect()
    }
}
