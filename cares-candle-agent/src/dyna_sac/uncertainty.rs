//! Weights of synthetic transitions from the variance of their targets.
use anyhow::Result;
use candle_core::Tensor;

/// Added to every normalized weight so that no transition is ignored.
pub const WEIGHT_FLOOR: f32 = 1e-4;

/// Lower bound of the variance before it is inverted.
const MIN_VARIANCE: f32 = 1e-8;

/// Biased covariance over the first axis.
fn covariance(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let dx = x.broadcast_sub(&x.mean_keepdim(0)?)?;
    let dy = y.broadcast_sub(&y.mean_keepdim(0)?)?;
    Ok((dx * dy)?.mean(0)?)
}

/// Variance of the one-step target `r + gamma * (Q - alpha * log pi)` over
/// Monte-Carlo samples of the next state.
///
/// Inputs have shape `[num_samples, batch_size]`, the output `[batch_size]`:
///
/// `Var(r) + g^2 Var(log pi) + g^2 Var(Q) + 2 g^2 (Cov(log pi, Q) + Cov(r, Q) + Cov(r, log pi))`
///
/// Variances are unbiased, covariances are biased.
pub fn total_variance(
    rewards: &Tensor,
    log_pis: &Tensor,
    qs: &Tensor,
    gamma: f64,
) -> Result<Tensor> {
    let gamma_sq = gamma * gamma;
    let var_r = rewards.var(0)?;
    let var_a = log_pis.var(0)?;
    let var_q = qs.var(0)?;
    let cov = ((covariance(log_pis, qs)? + covariance(rewards, qs)?)?
        + covariance(rewards, log_pis)?)?;

    Ok(((var_r + ((var_a + var_q)? * gamma_sq)?)? + (cov * (2.0 * gamma_sq))?)?)
}

/// Converts variances into weights in `[WEIGHT_FLOOR, 1 + WEIGHT_FLOOR]`.
///
/// Variances below `threshold * (max - min) + min` are raised to it, then
/// inverted and min-max normalized. The floor is added after normalization,
/// so the most certain transition gets `1 + WEIGHT_FLOOR` and the least
/// certain one `WEIGHT_FLOOR`. Every weight is `WEIGHT_FLOOR` when the
/// inverted variances do not spread.
pub fn inverse_variance_weights(total_var: &[f32], threshold: f64) -> Vec<f32> {
    if total_var.is_empty() {
        return vec![];
    }
    let min = total_var.iter().copied().fold(f32::INFINITY, f32::min);
    let max = total_var.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = ((threshold as f32) * (max - min) + min).max(MIN_VARIANCE);

    let inv = total_var
        .iter()
        .map(|v| 1.0 / v.max(floor))
        .collect::<Vec<_>>();
    let inv_min = inv.iter().copied().fold(f32::INFINITY, f32::min);
    let inv_max = inv.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = inv_max - inv_min;

    if !range.is_finite() || range <= 0.0 {
        return vec![WEIGHT_FLOOR; total_var.len()];
    }
    inv.iter()
        .map(|w| (w - inv_min) / range + WEIGHT_FLOOR)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_weights_bounds_and_order() {
        let var = [0.5f32, 4.0, 1.0, 10.0, 0.01, 2.5];
        let w = inverse_variance_weights(&var, 0.0);
        assert_eq!(w.len(), var.len());
        assert!(w.iter().all(|w| (WEIGHT_FLOOR..=1.0 + WEIGHT_FLOOR).contains(w)));

        // The most certain transition gets the largest weight.
        assert!((w[4] - (1.0 + WEIGHT_FLOOR)).abs() < 1e-6);
        assert!((w[3] - WEIGHT_FLOOR).abs() < 1e-6);
        assert!(w[0] > w[2] && w[2] > w[5] && w[5] > w[1]);
    }

    #[test]
    fn test_threshold_clips_small_variances() {
        // Floor at 0.5 * (10 - 0) + 0 = 5.
        let w = inverse_variance_weights(&[0.0, 1.0, 10.0], 0.5);
        assert!((w[0] - w[1]).abs() < 1e-6);
        assert!((w[0] - (1.0 + WEIGHT_FLOOR)).abs() < 1e-6);
        assert!((w[2] - WEIGHT_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_weights() {
        let w = inverse_variance_weights(&[0.0; 4], 0.1);
        assert_eq!(w, vec![WEIGHT_FLOOR; 4]);
        let w = inverse_variance_weights(&[3.0; 4], 0.1);
        assert_eq!(w, vec![WEIGHT_FLOOR; 4]);
        assert!(inverse_variance_weights(&[], 0.1).is_empty());
    }

    #[test]
    fn test_total_variance() -> Result<()> {
        // Two samples of two transitions; only rewards vary for the first one.
        let r = Tensor::from_slice(&[0f32, 1.0, 2.0, 1.0], (2, 2), &Device::Cpu)?;
        let a = Tensor::from_slice(&[1f32, 1.0, 1.0, 1.0], (2, 2), &Device::Cpu)?;
        let q = Tensor::from_slice(&[3f32, 3.0, 3.0, 3.0], (2, 2), &Device::Cpu)?;
        let v = total_variance(&r, &a, &q, 0.9)?.to_vec1::<f32>()?;
        assert!((v[0] - 2.0).abs() < 1e-6);
        assert!(v[1].abs() < 1e-6);

        // Perfectly correlated reward and Q.
        let v = total_variance(&r, &a, &r, 1.0)?.to_vec1::<f32>()?;
        // Var(r) + Var(Q) + 2 Cov(r, Q) = 2 + 2 + 2 * 1
        assert!((v[0] - 6.0).abs() < 1e-6);
        Ok(())
    }
}
