use crate::{mlp::MlpConfig, opt::OptimizerConfig, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ProbabilisticEnsemble`](super::ProbabilisticEnsemble).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Number of dynamics models.
    pub num_models: usize,

    /// Network of each dynamics model. Dimensions are set by [`EnsembleConfig::dims`].
    pub model_config: MlpConfig,

    /// Network of the reward model. Dimensions are set by [`EnsembleConfig::dims`].
    pub reward_config: MlpConfig,

    /// Optimizer of every network.
    pub opt_config: OptimizerConfig,

    /// Lower bound of the predicted log variance.
    pub min_logvar: f64,

    /// Upper bound of the predicted log variance.
    pub max_logvar: f64,

    /// Seed of the member selection.
    pub seed: u64,

    /// Device of the networks.
    pub device: Option<Device>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            num_models: 5,
            model_config: MlpConfig::new(0, vec![200, 200, 200, 200], 0, false),
            reward_config: MlpConfig::new(0, vec![200, 200], 1, false),
            opt_config: OptimizerConfig::Adam { lr: 0.001 },
            min_logvar: -10.0,
            max_logvar: 0.5,
            seed: 42,
            device: None,
        }
    }
}

impl EnsembleConfig {
    /// Sets the number of dynamics models.
    pub fn num_models(mut self, v: usize) -> Self {
        self.num_models = v;
        self
    }

    /// Sets the hidden units of the dynamics models.
    pub fn model_units(mut self, units: Vec<usize>) -> Self {
        self.model_config = MlpConfig::new(0, units, 0, false);
        self
    }

    /// Sets the hidden units of the reward model.
    pub fn reward_units(mut self, units: Vec<usize>) -> Self {
        self.reward_config = MlpConfig::new(0, units, 1, false);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Sets network dimensions.
    ///
    /// Dynamics models map `(state, action)` to the mean and log variance of
    /// the state delta, the reward model maps `(state, action, next_state)`
    /// to a scalar.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        self.model_config = MlpConfig::new(
            obs_dim + act_dim,
            self.model_config.units().to_vec(),
            obs_dim,
            false,
        );
        self.reward_config = MlpConfig::new(
            2 * obs_dim + act_dim,
            self.reward_config.units().to_vec(),
            1,
            false,
        );
        self
    }

    /// Constructs [`EnsembleConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`EnsembleConfig`] as YAML file.
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
    fn test_serde_ensemble_config() -> Result<()> {
        let config = EnsembleConfig::default()
            .num_models(3)
            .model_units(vec![32])
            .dims(4, 2)
            .device(Device::Cpu);
        let dir = TempDir::new("ensemble_config")?;
        let path = dir.path().join("ensemble.yaml");
        config.save(&path)?;
        let config_ = EnsembleConfig::load(&path)?;
        assert_eq!(config, config_);
        assert_eq!(config_.model_config.in_dim(), 6);
        assert_eq!(config_.reward_config.in_dim(), 10);
        Ok(())
    }
}
