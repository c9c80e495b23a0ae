//! Scheduling the exponent of importance weight for PER.
use serde::{Deserialize, Serialize};

/// Scheduler of the exponent of importance weight for PER.
///
/// $\beta$ grows by a fixed increment on every prioritized sampling call
/// and is clamped at its final value.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    /// Initial value of $\beta$.
    pub beta_0: f64,

    /// Final value of $\beta$.
    pub beta_final: f64,

    /// Increment of $\beta$ per call of [`IwScheduler::step`].
    pub increment: f64,

    beta: f64,
}

impl IwScheduler {
    /// Creates a scheduler.
    pub fn new(beta_0: f64, beta_final: f64, increment: f64) -> Self {
        Self {
            beta_0,
            beta_final,
            increment,
            beta: beta_0.min(beta_final),
        }
    }

    /// Gets the exponent of importance sampling weight.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Advances $\beta$ by one increment.
    pub fn step(&mut self) {
        self.beta = (self.beta + self.increment).min(self.beta_final);
    }

    /// Resets $\beta$ to its initial value.
    pub fn reset(&mut self) {
        self.beta = self.beta_0.min(self.beta_final);
    }
}

#[cfg(test)]
mod tests {
    use super::IwScheduler;

    #[test]
    fn test_clamped_at_final() {
        let mut s = IwScheduler::new(0.4, 1.0, 0.25);
        s.step();
        assert!((s.beta() - 0.65).abs() < 1e-12);
        (0..10).for_each(|_| s.step());
        assert_eq!(s.beta(), 1.0);
        s.reset();
        assert_eq!(s.beta(), 0.4);
    }
}
