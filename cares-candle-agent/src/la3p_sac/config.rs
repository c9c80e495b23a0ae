//! Configuration of the LA3P-SAC agent.
use crate::{
    sac::SacConfig,
    util::{InDim, OutDim},
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

/// Configuration of [`La3pSac`](super::La3pSac).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct La3pSacConfig<Q, P> {
    /// Actor, critics and entropy coefficient.
    pub sac_config: SacConfig<Q, P>,

    /// Fraction of each batch taken with prioritized and inverse-prioritized sampling.
    pub prioritized_fraction: f64,

    /// Exponent of priorities.
    pub per_alpha: f64,

    /// Lower bound of priorities and threshold of the critic losses.
    pub min_priority: f64,

    /// Interval of soft updates of the target critics, in `train_policy` calls.
    pub target_update_freq: usize,

    /// If `true`, prioritized batches are drawn with stratified sampling.
    ///
    /// Defaults to `false`: LA3P draws its prioritized batches with simple
    /// proportional sampling.
    pub stratified: bool,
}

impl<Q, P> Default for La3pSacConfig<Q, P> {
    fn default() -> Self {
        Self {
            sac_config: SacConfig::default(),
            prioritized_fraction: 0.5,
            per_alpha: 0.4,
            min_priority: 1.0,
            target_update_freq: 1,
            stratified: false,
        }
    }
}

impl<Q, P> La3pSacConfig<Q, P>
where
    Q: DeserializeOwned + Serialize + InDim + OutDim,
    P: DeserializeOwned + Serialize + InDim + OutDim,
{
    /// Sets the dimensions of all networks.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        self.sac_config = self.sac_config.dims(obs_dim, act_dim);
        self
    }

    /// Sets the device of all networks.
    pub fn device(mut self, device: Device) -> Self {
        self.sac_config = self.sac_config.device(device);
        self
    }

    /// Sets the SAC configuration.
    pub fn sac_config(mut self, v: SacConfig<Q, P>) -> Self {
        self.sac_config = v;
        self
    }

    /// Sets the prioritized fraction of batches.
    pub fn prioritized_fraction(mut self, v: f64) -> Self {
        self.prioritized_fraction = v;
        self
    }

    /// Sets the exponent of priorities.
    pub fn per_alpha(mut self, v: f64) -> Self {
        self.per_alpha = v;
        self
    }

    /// Sets the minimum priority.
    pub fn min_priority(mut self, v: f64) -> Self {
        self.min_priority = v;
        self
    }

    /// Sets the interval of target updates.
    pub fn target_update_freq(mut self, v: usize) -> Self {
        self.target_update_freq = v;
        self
    }

    /// Sets stratified sampling of prioritized batches.
    pub fn stratified(mut self, v: bool) -> Self {
        self.stratified = v;
        self
    }

    /// Constructs [`La3pSacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of LA3PSAC from {:?}", path.as_ref());
        Ok(b)
    }

    /// Saves [`La3pSacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of LA3PSAC into {:?}", path.as_ref());
        Ok(())
    }
}
