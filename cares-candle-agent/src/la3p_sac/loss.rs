//! Critic losses of loss-adjusted prioritized replay.
//!
//! Inputs are absolute TD errors.
use anyhow::Result;
use candle_core::Tensor;

/// Huber loss `mean(x < m ? 0.5 x^2 : m x)` with threshold `m = min_priority`.
pub fn huber(x: &Tensor, min_priority: f64) -> Result<Tensor> {
    let quadratic = (x.sqr()? * 0.5)?;
    let linear = (x * min_priority)?;
    Ok(x
        .lt(min_priority)?
        .where_cond(&quadratic, &linear)?
        .mean_all()?)
}

/// Prioritized approximate loss, the loss on uniform samples whose gradient
/// matches that of the MSE on samples prioritized with exponent `alpha`.
///
/// `mean(x < m ? m^alpha 0.5 x^2 : m x^(1 + alpha) / (1 + alpha))`
pub fn prioritized_approximate_loss(x: &Tensor, min_priority: f64, alpha: f64) -> Result<Tensor> {
    let quadratic = (x.sqr()? * (0.5 * min_priority.powf(alpha)))?;
    let linear = (x.powf(1.0 + alpha)? * (min_priority / (1.0 + alpha)))?;
    Ok(x
        .lt(min_priority)?
        .where_cond(&quadratic, &linear)?
        .mean_all()?)
}

/// Priorities `max_k(x_k).max(min_priority)^alpha` over the errors of all critics.
pub fn priorities(abs_td_errors: &[Tensor], min_priority: f64, alpha: f64) -> Result<Tensor> {
    let x = Tensor::stack(abs_td_errors, 0)?.max(0)?;
    Ok(x.maximum(min_priority)?.powf(alpha)?.detach())
}
