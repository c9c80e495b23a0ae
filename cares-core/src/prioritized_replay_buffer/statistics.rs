//! Normalization statistics of stored transitions.
use serde::{Deserialize, Serialize};

/// Offset added to every statistic to avoid a zero scale.
pub const STATISTICS_EPS: f32 = 1e-5;

/// Per-feature mean and standard deviation of states and state deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Mean of states.
    pub observation_mean: Vec<f32>,

    /// Standard deviation of states.
    pub observation_std: Vec<f32>,

    /// Mean of `next_state - state`.
    pub delta_mean: Vec<f32>,

    /// Standard deviation of `next_state - state`.
    pub delta_std: Vec<f32>,
}

impl Statistics {
    /// Computes statistics of `n` rows of `dim` features given row-major.
    pub(crate) fn from_rows(state: &[f32], next_state: &[f32], n: usize, dim: usize) -> Self {
        let delta = state
            .iter()
            .zip(next_state.iter())
            .map(|(s, ns)| ns - s)
            .collect::<Vec<_>>();
        let (observation_mean, observation_std) = mean_std(&state[..n * dim], n, dim);
        let (delta_mean, delta_std) = mean_std(&delta[..n * dim], n, dim);
        Self {
            observation_mean,
            observation_std,
            delta_mean,
            delta_std,
        }
    }

    /// Dimension of observations.
    pub fn obs_dim(&self) -> usize {
        self.observation_mean.len()
    }

    /// Returns `(x - mean) / std` for a row-major batch of observations.
    pub fn normalize_observation(&self, obs: &[f32]) -> Vec<f32> {
        let d = self.obs_dim();
        obs.iter()
            .enumerate()
            .map(|(i, x)| (x - self.observation_mean[i % d]) / self.observation_std[i % d])
            .collect()
    }

    /// Returns `x * std + mean` for a row-major batch of normalized deltas.
    pub fn denormalize_observation_delta(&self, delta: &[f32]) -> Vec<f32> {
        let d = self.obs_dim();
        delta
            .iter()
            .enumerate()
            .map(|(i, x)| x * self.delta_std[i % d] + self.delta_mean[i % d])
            .collect()
    }
}

/// Population mean and standard deviation per column, both shifted by
/// [`STATISTICS_EPS`].
fn mean_std(xs: &[f32], n: usize, dim: usize) -> (Vec<f32>, Vec<f32>) {
    let mut mean = vec![0f64; dim];
    for row in xs.chunks(dim) {
        row.iter().zip(mean.iter_mut()).for_each(|(x, m)| *m += *x as f64);
    }
    mean.iter_mut().for_each(|m| *m /= n as f64);

    let mut var = vec![0f64; dim];
    for row in xs.chunks(dim) {
        row.iter()
            .zip(mean.iter())
            .zip(var.iter_mut())
            .for_each(|((x, m), v)| *v += (*x as f64 - m).powi(2));
    }

    let mean_ = mean.iter().map(|m| *m as f32 + STATISTICS_EPS).collect();
    let std = var
        .iter()
        .map(|v| (v / n as f64).sqrt() as f32 + STATISTICS_EPS)
        .collect();
    (mean_, std)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        // Two rows of two features.
        let state = [1.0, 2.0, 3.0, 2.0];
        let next_state = [2.0, 2.0, 5.0, 2.0];
        let stats = Statistics::from_rows(&state, &next_state, 2, 2);

        let close = |a: f32, b: f32| (a - b).abs() < 1e-6;
        assert!(close(stats.observation_mean[0], 2.0 + STATISTICS_EPS));
        assert!(close(stats.observation_std[0], 1.0 + STATISTICS_EPS));
        assert!(close(stats.observation_std[1], STATISTICS_EPS));
        assert!(close(stats.delta_mean[0], 1.5 + STATISTICS_EPS));
        assert!(close(stats.delta_std[0], 0.5 + STATISTICS_EPS));

        let x = stats.normalize_observation(&[2.0 + STATISTICS_EPS, 2.0]);
        assert!(close(x[0], 0.0));
        let d = stats.denormalize_observation_delta(&[0.0, 1.0]);
        assert!(close(d[0], stats.delta_mean[0]));
        assert!(close(d[1], stats.delta_mean[1] + stats.delta_std[1]));
    }
}
