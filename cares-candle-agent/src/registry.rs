//! Construction of agents by algorithm name.
use crate::{
    dyna_sac::{DynaSacConfig, DynaSacNsIw},
    la3p_sac::{La3pSac, La3pSacConfig},
    mlp::{Mlp, Mlp2, MlpConfig},
    Device,
};
use anyhow::Result;
use cares_core::{Agent, CaresError};
use log::info;
use serde::de::DeserializeOwned;
use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

/// Constructor of an agent given `(obs_dim, act_dim, config, device)`.
pub type AgentBuilder = fn(usize, usize, &serde_yaml::Value, Device) -> Result<Box<dyn Agent>>;

/// Key of the algorithm name in configuration files.
pub const ALGORITHM_KEY: &str = "algorithm";

/// Parses a configuration; `null` gives the default one.
fn config_from_value<T: DeserializeOwned + Default>(value: &serde_yaml::Value) -> Result<T> {
    match value {
        serde_yaml::Value::Null => Ok(T::default()),
        _ => Ok(serde_yaml::from_value(value.clone())?),
    }
}

fn build_dyna_sac(
    obs_dim: usize,
    act_dim: usize,
    value: &serde_yaml::Value,
    device: Device,
) -> Result<Box<dyn Agent>> {
    let config: DynaSacConfig<MlpConfig, MlpConfig> = config_from_value(value)?;
    let mut config = config.device(device);
    config.sac_config = config.sac_config.with_default_networks();
    let config = config.dims(obs_dim, act_dim);
    Ok(Box::new(DynaSacNsIw::<Mlp, Mlp2>::build(config, obs_dim)?))
}

fn build_la3p_sac(
    obs_dim: usize,
    act_dim: usize,
    value: &serde_yaml::Value,
    device: Device,
) -> Result<Box<dyn Agent>> {
    let config: La3pSacConfig<MlpConfig, MlpConfig> = config_from_value(value)?;
    let mut config = config.device(device);
    config.sac_config = config.sac_config.with_default_networks();
    let config = config.dims(obs_dim, act_dim);
    Ok(Box::new(La3pSac::<Mlp, Mlp2>::build(config, obs_dim)?))
}

/// Maps algorithm names to agent constructors.
///
/// [`Registry::default`] knows `"DynaSAC_NS_IW"` and `"LA3PSAC"`, both with
/// MLP actor and critics.
pub struct Registry {
    builders: HashMap<String, AgentBuilder>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("DynaSAC_NS_IW", build_dyna_sac);
        registry.register("LA3PSAC", build_la3p_sac);
        registry
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registers a constructor, replacing the one with the same name.
    pub fn register(&mut self, name: impl Into<String>, builder: AgentBuilder) {
        self.builders.insert(name.into(), builder);
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.builders.keys().map(|k| k.as_str()).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Constructs the agent registered as `name`.
    pub fn build(
        &self,
        name: &str,
        obs_dim: usize,
        act_dim: usize,
        config: &serde_yaml::Value,
        device: Device,
    ) -> Result<Box<dyn Agent>> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| CaresError::UnknownAlgorithm(name.to_string()))?;
        info!("Build {} agent", name);
        builder(obs_dim, act_dim, config, device)
    }

    /// Constructs an agent from a YAML file.
    ///
    /// The `algorithm` key of the file selects the constructor, which
    /// receives the whole document as its configuration.
    pub fn build_from_path(
        &self,
        path: impl AsRef<Path>,
        obs_dim: usize,
        act_dim: usize,
        device: Device,
    ) -> Result<Box<dyn Agent>> {
        let file = File::open(&path)?;
        let value: serde_yaml::Value = serde_yaml::from_reader(BufReader::new(file))?;
        let name = value
            .get(ALGORITHM_KEY)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CaresError::UnknownAlgorithm(format!(
                    "no `{}` key in {:?}",
                    ALGORITHM_KEY,
                    path.as_ref()
                ))
            })?
            .to_string();
        self.build(&name, obs_dim, act_dim, &value, device)
    }
}
