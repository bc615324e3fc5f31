use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Adam optimizer over a fixed sequence of parameter tensors.
///
/// Moment estimates are kept per tensor, in the order the tensors are passed to
/// [`step`](Self::step). The order must stay the same from one step to the next;
/// a tensor whose length changes has its moments reset.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    step_count: i32,
    moments: Vec<Moments>,
}

#[derive(Debug, Clone)]
struct Moments {
    first: Vec<f32>,
    second: Vec<f32>,
}

impl Moments {
    fn zeros(len: usize) -> Self {
        Self {
            first: vec![0.0; len],
            second: vec![0.0; len],
        }
    }
}

impl Adam {
    #[must_use]
    pub fn new(learning_rate: f32) -> Self {
        Self::with_config(AdamConfig {
            learning_rate,
            ..AdamConfig::default()
        })
    }

    #[must_use]
    pub fn with_config(config: AdamConfig) -> Self {
        Self {
            config,
            step_count: 0,
            moments: vec![],
        }
    }

    #[must_use]
    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Applies one update to every `(parameters, gradients)` pair.
    pub fn step<'a, I>(&mut self, tensors: I)
    where
        I: IntoIterator<Item = (&'a mut [f32], &'a [f32])>,
    {
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        self.step_count = self.step_count.saturating_add(1);
        let lr = learning_rate * (1.0 - beta2.powi(self.step_count)).sqrt()
            / (1.0 - beta1.powi(self.step_count));

        for (index, (params, grads)) in tensors.into_iter().enumerate() {
            debug_assert_eq!(params.len(), grads.len());
            if index == self.moments.len() {
                self.moments.push(Moments::zeros(params.len()));
            }
            let moments = &mut self.moments[index];
            if moments.first.len() != params.len() {
                *moments = Moments::zeros(params.len());
            }
            for (((p, &g), m), v) in params
                .iter_mut()
                .zip(grads)
                .zip(&mut moments.first)
                .zip(&mut moments.second)
            {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                *p -= lr * *m / (v.sqrt() + epsilon);
            }
        }
    }
}
