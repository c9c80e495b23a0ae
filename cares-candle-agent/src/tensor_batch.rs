use crate::util::{rows_to_tensor, vec_to_tensor};
use anyhow::Result;
use cares_core::TransitionBatch;
use candle_core::{Device, Tensor};

/// A batch of transitions as tensors on a device.
///
/// `state`, `action` and `next_state` have shape `[batch_size, dim]`;
/// `reward`, `done` and `weights` have shape `[batch_size]`.
#[derive(Clone, Debug)]
pub struct TensorBatch {
    /// States.
    pub state: Tensor,

    /// Actions.
    pub action: Tensor,

    /// Rewards.
    pub reward: Tensor,

    /// Next states.
    pub next_state: Tensor,

    /// Termination flags as `0.0` or `1.0`.
    pub done: Tensor,

    /// Per-sample weights of the loss terms, `None` for uniform weights.
    pub weights: Option<Tensor>,
}

impl TensorBatch {
    /// Copies a batch taken from a replay buffer to `device`.
    ///
    /// The weights of the replay batch are not copied; callers decide how
    /// they enter the loss.
    pub fn from_batch(batch: &TransitionBatch, device: &Device) -> Result<Self> {
        let done = batch.done.iter().map(|&d| d as f32).collect::<Vec<_>>();
        Ok(Self {
            state: rows_to_tensor(&batch.state, batch.obs_dim, device)?,
            action: rows_to_tensor(&batch.action, batch.act_dim, device)?,
            reward: vec_to_tensor(&batch.reward, device)?,
            next_state: rows_to_tensor(&batch.next_state, batch.obs_dim, device)?,
            done: vec_to_tensor(&done, device)?,
            weights: None,
        })
    }

    /// Sets per-sample weights.
    pub fn with_weights(mut self, weights: Tensor) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.reward.dims()[0]
    }

    /// Returns `true` if the batch has no sample.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
