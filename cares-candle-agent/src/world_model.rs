//! Learned dynamics models used for planning.
mod config;
mod ensemble;
use anyhow::Result;
use cares_core::Statistics;
use candle_core::Tensor;
pub use config::EnsembleConfig;
pub use ensemble::ProbabilisticEnsemble;

/// Output of [`WorldModel::pred_next_states`].
///
/// `means` and `vars` are in the normalized delta space and have shape
/// `[num_models, batch_size, obs_dim]`.
#[derive(Clone, Debug)]
pub struct NextStatePrediction {
    /// Next states sampled from a randomly chosen member, `[batch_size, obs_dim]`.
    pub sample: Tensor,

    /// Next states given by the mean over members, `[batch_size, obs_dim]`.
    pub mean: Tensor,

    /// Per-member means of the normalized delta.
    pub means: Tensor,

    /// Per-member variances of the normalized delta.
    pub vars: Tensor,
}

/// An ensemble of one-step dynamics models with a reward model.
///
/// States, actions and rewards are batched tensors on the device of the
/// model. Rewards have shape `[batch_size]`.
pub trait WorldModel {
    /// One optimization step of the dynamics models. Returns the loss.
    fn train_world(&mut self, states: &Tensor, actions: &Tensor, next_states: &Tensor)
        -> Result<f32>;

    /// One optimization step of the reward model. Returns the loss.
    fn train_reward(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
        next_states: &Tensor,
        rewards: &Tensor,
    ) -> Result<f32>;

    /// Predicts next states.
    fn pred_next_states(&mut self, states: &Tensor, actions: &Tensor)
        -> Result<NextStatePrediction>;

    /// Predicts rewards of transitions.
    fn pred_rewards(&self, states: &Tensor, actions: &Tensor, next_states: &Tensor)
        -> Result<Tensor>;

    /// Sets normalization statistics.
    fn set_statistics(&mut self, stats: &Statistics) -> Result<()>;

    /// Normalization statistics, `None` until set.
    fn statistics(&self) -> Option<&Statistics>;

    /// Maps normalized deltas `[.., obs_dim]` back to the state space.
    fn denormalize_delta(&self, delta: &Tensor) -> Result<Tensor>;

    /// Number of members of the ensemble.
    fn num_models(&self) -> usize;
}
