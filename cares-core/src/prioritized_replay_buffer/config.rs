//! Configuration of [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
///
/// ```rust
/// use cares_core::prioritized_replay_buffer::PrioritizedReplayBufferConfig;
///
/// let config = PrioritizedReplayBufferConfig::default()
///     .capacity(10_000)
///     .alpha(0.6)
///     .seed(42);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PrioritizedReplayBufferConfig {
    /// Maximum number of transitions. The oldest ones are overwritten when full.
    pub capacity: usize,

    /// Exponent applied to the running max priority for new transitions.
    pub alpha: f64,

    /// Initial value of the importance sampling exponent.
    pub beta_0: f64,

    /// Increment of the importance sampling exponent per prioritized sample.
    pub beta_increment: f64,

    /// Random seed used for sampling.
    pub seed: u64,
}

impl Default for PrioritizedReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            alpha: 1.0,
            beta_0: 0.4,
            beta_increment: 2e-7,
            seed: 42,
        }
    }
}

impl PrioritizedReplayBufferConfig {
    /// Sets the capacity of the buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the prioritization exponent.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the initial importance sampling exponent.
    pub fn beta_0(mut self, beta_0: f64) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the increment of the importance sampling exponent.
    pub fn beta_increment(mut self, beta_increment: f64) -> Self {
        self.beta_increment = beta_increment;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_config() -> Result<()> {
        let config = PrioritizedReplayBufferConfig::default()
            .capacity(100)
            .alpha(0.6)
            .beta_0(0.5)
            .seed(1);

        let dir = TempDir::new("prioritized_replay_buffer_config")?;
        let path = dir.path().join("per_config.yaml");
        config.save(&path)?;
        let config_ = PrioritizedReplayBufferConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
