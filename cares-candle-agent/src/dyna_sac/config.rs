//! Configuration of the uncertainty-weighted Dyna SAC agent.
use crate::{
    sac::SacConfig,
    util::{InDim, OutDim},
    world_model::EnsembleConfig,
    Device,
};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Source of the rewards of synthetic transitions.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum RewardSource {
    /// Goal-distance reward of gripper tasks, see
    /// [`gripper_reward`](super::gripper_reward).
    Gripper,

    /// Reward model of the world model.
    Learned,
}

/// Configuration of [`DynaSacNsIw`](super::DynaSacNsIw).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct DynaSacConfig<Q, P> {
    /// Actor, critics and entropy coefficient.
    pub sac_config: SacConfig<Q, P>,

    /// World model.
    pub world_model_config: EnsembleConfig,

    /// Number of rollout steps.
    pub horizon: usize,

    /// Branching factor of every rollout step.
    pub num_samples: usize,

    /// Fraction of the variance range below which variances are clipped.
    pub threshold: f64,

    /// Next-state samples per ensemble member for the uncertainty estimate.
    pub sample_times: usize,

    /// Rewards of synthetic transitions.
    pub reward: RewardSource,

    /// If `true`, the reward model is trained with the dynamics models.
    pub train_reward: bool,

    /// Interval of soft updates of the target critics, in `train_policy` calls.
    pub policy_update_freq: usize,
}

impl<Q, P> Default for DynaSacConfig<Q, P> {
    fn default() -> Self {
        Self {
            sac_config: SacConfig::default(),
            world_model_config: EnsembleConfig::default(),
            horizon: 3,
            num_samples: 10,
            threshold: 0.1,
            sample_times: 10,
            reward: RewardSource::Learned,
            train_reward: true,
            policy_update_freq: 1,
        }
    }
}

impl<Q, P> DynaSacConfig<Q, P>
where
    Q: DeserializeOwned + Serialize + InDim + OutDim,
    P: DeserializeOwned + Serialize + InDim + OutDim,
{
    /// Sets the dimensions of all networks.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        self.sac_config = self.sac_config.dims(obs_dim, act_dim);
        self.world_model_config = self.world_model_config.dims(obs_dim, act_dim);
        self
    }

    /// Sets the device of all networks.
    pub fn device(mut self, device: Device) -> Self {
        self.sac_config = self.sac_config.device(device);
        self.world_model_config = self.world_model_config.device(device);
        self
    }

    /// Sets the SAC configuration.
    pub fn sac_config(mut self, v: SacConfig<Q, P>) -> Self {
        self.sac_config = v;
        self
    }

    /// Sets the world model configuration.
    pub fn world_model_config(mut self, v: EnsembleConfig) -> Self {
        self.world_model_config = v;
        self
    }

    /// Sets the rollout horizon.
    pub fn horizon(mut self, v: usize) -> Self {
        self.horizon = v;
        self
    }

    /// Sets the branching factor of rollouts.
    pub fn num_samples(mut self, v: usize) -> Self {
        self.num_samples = v;
        self
    }

    /// Sets the variance threshold.
    pub fn threshold(mut self, v: f64) -> Self {
        self.threshold = v;
        self
    }

    /// Sets the number of samples per member for the uncertainty estimate.
    pub fn sample_times(mut self, v: usize) -> Self {
        self.sample_times = v;
        self
    }

    /// Sets the reward source.
    pub fn reward(mut self, v: RewardSource) -> Self {
        self.reward = v;
        self
    }

    /// Enables training of the reward model.
    pub fn train_reward(mut self, v: bool) -> Self {
        self.train_reward = v;
        self
    }

    /// Sets the interval of target updates.
    pub fn policy_update_freq(mut self, v: usize) -> Self {
        self.policy_update_freq = v;
        self
    }

    /// Constructs [`DynaSacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of DynaSAC_NS_IW from {:?}", path.as_ref());
        Ok(b)
    }

    /// Saves [`DynaSacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of DynaSAC_NS_IW into {:?}", path.as_ref());
        Ok(())
    }
}
