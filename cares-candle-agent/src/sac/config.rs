//! Configuration of the SAC components.
use super::EntCoefMode;
use crate::{
    util::{actor::GaussianActorConfig, critic::MultiCriticConfig, InDim, OutDim},
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

/// Configuration of [`Sac`](super::Sac).
///
/// `Q` and `P` are the configurations of the critic and policy networks.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct SacConfig<Q, P> {
    /// Configuration of the actor model.
    pub actor_config: GaussianActorConfig<P>,

    /// Configuration of the critic model.
    pub critic_config: MultiCriticConfig<Q>,

    /// Discont factor.
    pub gamma: f64,

    /// How to update entropy coefficient.
    pub ent_coef_mode: EntCoefMode,

    /// Scale of rewards in the bootstrapped target.
    #[serde(default = "default_reward_scale")]
    pub reward_scale: f32,

    /// Dimension of actions, used for the default target entropy.
    #[serde(default)]
    pub act_dim: usize,

    /// Device for actor/critic models.
    pub device: Option<Device>,
}

fn default_reward_scale() -> f32 {
    1.0
}

impl<Q, P> Default for SacConfig<Q, P> {
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            gamma: 0.99,
            ent_coef_mode: EntCoefMode::default(),
            reward_scale: 1.0,
            act_dim: 0,
            device: None,
        }
    }
}

impl<Q, P> SacConfig<Q, P>
where
    Q: DeserializeOwned + Serialize + InDim + OutDim,
    P: DeserializeOwned + Serialize + InDim + OutDim,
{
    /// Sets the dimensions of all networks.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        self.actor_config = self.actor_config.dims(obs_dim, act_dim);
        self.critic_config = self.critic_config.dims(obs_dim, act_dim);
        self.act_dim = act_dim;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// SAC-alpha.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Reward scale.
    pub fn reward_scale(mut self, v: f32) -> Self {
        self.reward_scale = v;
        self
    }

    /// Configuration of actor.
    pub fn actor_config(mut self, actor_config: GaussianActorConfig<P>) -> Self {
        self.actor_config = actor_config;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, critic_config: MultiCriticConfig<Q>) -> Self {
        self.critic_config = critic_config;
        self
    }

    /// Uses the default network configurations where none is given.
    pub fn with_default_networks(mut self) -> Self
    where
        Q: Default,
        P: Default,
    {
        if self.actor_config.policy_config.is_none() {
            self.actor_config.policy_config = Some(P::default());
        }
        if self.critic_config.q_config.is_none() {
            self.critic_config.q_config = Some(Q::default());
        }
        self
    }

    /// Device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Constructs [`SacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of SAC from {:?}", path.as_ref());
        Ok(b)
    }

    /// Saves [`SacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of SAC into {:?}", path.as_ref());
        Ok(())
    }
}
