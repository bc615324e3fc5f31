use rand::Rng;

/// Smallest floor accepted; keeps the agent from ever becoming fully greedy while training.
const MIN_FLOOR: f32 = 1e-3;

/// Geometric ε-greedy exploration schedule.
///
/// ε starts at `start`, is multiplied by `decay` on every [`decay_step`](Self::decay_step)
/// and never drops below `floor`. The sequence is monotonically non-increasing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplorationSchedule {
    epsilon: f32,
    floor: f32,
    decay: f32,
}

impl ExplorationSchedule {
    /// Builds a schedule, clamping arguments into a valid range:
    /// `floor` into `[1e-3, 1]`, `start` into `[floor, 1]`, `decay` into `[0, 1]`.
    #[must_use]
    pub fn new(start: f32, floor: f32, decay: f32) -> Self {
        let floor = floor.clamp(MIN_FLOOR, 1.0);
        Self {
            epsilon: start.clamp(floor, 1.0),
            floor,
            decay: decay.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    #[must_use]
    pub fn floor(&self) -> f32 {
        self.floor
    }

    /// Applies one decay step and returns the new ε.
    pub fn decay_step(&mut self) -> f32 {
        self.epsilon = f32::max(self.floor, self.epsilon * self.decay);
        self.epsilon
    }

    /// Draws whether the next action should be exploratory.
    pub fn should_explore<R>(&self, rng: &mut R) -> bool
    where
        R: Rng + ?Sized,
    {
        rng.random::<f32>() < self.epsilon
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    #[test]
    fn test_decay_is_monotone_and_floored() {
        let mut schedule = ExplorationSchedule::new(1.0, 0.1, 0.998);
        let mut previous = schedule.epsilon();
        for _ in 0..5000 {
            let epsilon = schedule.decay_step();
            assert!(epsilon <= previous);
            assert!(epsilon >= 0.1);
            previous = epsilon;
        }
        assert!((schedule.epsilon() - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_geometric_decay() {
        let mut schedule = ExplorationSchedule::new(1.0, 0.01, 0.5);
        assert!((schedule.decay_step() - 0.5).abs() < f32::EPSILON);
        assert!((schedule.decay_step() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_floor_is_never_zero() {
        let mut schedule = ExplorationSchedule::new(1.0, 0.0, 0.0);
        assert!(schedule.decay_step() > 0.0);
    }

    #[test]
    fn test_should_explore_rate() {
        let schedule = ExplorationSchedule::new(0.25, 0.1, 1.0);
        let mut rng = Pcg32::seed_from_u64(3);
        let explored = (0..4000).filter(|_| schedule.should_explore(&mut rng)).count();
        assert!((800..1200).contains(&explored), "explored = {explored}");
    }
}
