//! Agent.
use crate::{
    prioritized_replay_buffer::{PrioritizedReplayBuffer, Statistics},
    record::Record,
};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Path of the checkpoint file `{dir}/{name}_{part}.pt`.
///
/// `part` is one of `actor`, `critic`, `critic_tgt` or `ent_coef` for the
/// agents in this workspace.
pub fn checkpoint_path(dir: &Path, name: &str, part: &str) -> PathBuf {
    dir.join(format!("{}_{}.pt", name, part))
}

/// A trainable policy.
///
/// The training loop owns the replay buffer and passes it to the agent for
/// every optimization step.
pub trait Agent {
    /// Returns an action for a single observation.
    ///
    /// With `evaluation == true` the deterministic action is returned.
    /// `noise_scale` is the scale of exploration noise for agents that add
    /// noise to their actions; stochastic policies ignore it.
    fn select_action(&mut self, state: &[f32], evaluation: bool, noise_scale: f32)
        -> Result<Vec<f32>>;

    /// Performs an optimization step and returns some information.
    fn train_policy(
        &mut self,
        buffer: &mut PrioritizedReplayBuffer,
        batch_size: usize,
    ) -> Result<Record>;

    /// Trains the world model of a model-based agent.
    fn train_world_model(
        &mut self,
        _buffer: &mut PrioritizedReplayBuffer,
        _batch_size: usize,
    ) -> Result<Record> {
        Ok(Record::empty())
    }

    /// Sets normalization statistics of a model-based agent.
    fn set_statistics(&mut self, _stats: &Statistics) -> Result<()> {
        Ok(())
    }

    /// Returns `true` if the agent learns a world model.
    fn is_model_based(&self) -> bool {
        false
    }

    /// Saves the parameters of the agent in `dir` and returns the written files.
    ///
    /// Files are named with [`checkpoint_path`]. The directory is created if
    /// it does not exist.
    fn save_models(&self, dir: &Path, name: &str) -> Result<Vec<PathBuf>>;

    /// Loads the parameters of the agent from `dir`.
    fn load_models(&mut self, dir: &Path, name: &str) -> Result<()>;
}
