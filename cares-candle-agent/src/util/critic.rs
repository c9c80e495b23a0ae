//! Critic for agents with continuous action.
use crate::{
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::{track_with_replace_substring, InDim, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType::F32, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`MultiCritic`].
#[serde(default)]
pub struct MultiCriticConfig<Q> {
    /// The number of critic networks.
    pub n_nets: usize,

    /// Configuration of critic networks.
    pub q_config: Option<Q>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Soft update coefficient.
    pub tau: f64,
}

impl<Q> Default for MultiCriticConfig<Q> {
    fn default() -> Self {
        Self {
            n_nets: 2,
            q_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            tau: 0.005,
        }
    }
}

impl<Q> MultiCriticConfig<Q>
where
    Q: DeserializeOwned + Serialize + InDim + OutDim,
{
    /// Sets the number of critic networks.
    pub fn n_nets(mut self, v: usize) -> Self {
        self.n_nets = v;
        self
    }

    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets input dimension `obs_dim + act_dim` and output dimension 1.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        if let Some(q_config) = &mut self.q_config {
            q_config.set_in_dim(obs_dim + act_dim);
            q_config.set_out_dim(1);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets soft update parameter tau.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Constructs [`MultiCriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MultiCriticConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Critic for agents with continuous action.
///
/// It takes observations and actions as inputs and outputs action values.
///
/// This struct has multiple q functions and corresponding target networks.
/// Target networks are modified only by [`MultiCritic::soft_update`].
pub struct MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    tau: f64,
    varmap: VarMap,
    varmap_tgt: VarMap, // for target network

    qs: Vec<Q>,
    qs_tgt: Vec<Q>, // for target network

    opt: Optimizer, // no optimizer required for target networks
}

impl<Q> MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`MultiCritic`].
    pub fn build(config: MultiCriticConfig<Q::Config>, device: Device) -> Result<MultiCritic<Q>> {
        let tau = config.tau;
        let n_nets = config.n_nets;
        let q_config = config.q_config.context("q_config is not set.")?;

        // Critic networks
        let (varmap, qs) = Self::build_critic_networks(&q_config, &device, n_nets, "critic")?;

        // Target networks
        let (varmap_tgt, qs_tgt) =
            Self::build_critic_networks(&q_config, &device, n_nets, "critic_tgt")?;

        // Optimizer, shared with critic networks
        let opt = config.opt_config.build(varmap.all_vars())?;

        // Copy parameters
        track_with_replace_substring(&varmap_tgt, &varmap, 1.0, ("critic", "critic_tgt"))?;

        Ok(Self {
            tau,
            varmap,
            varmap_tgt,
            qs,
            qs_tgt,
            opt,
        })
    }

    fn build_critic_networks(
        q_config: &Q::Config,
        device: &Device,
        n_nets: usize,
        prefix: &str,
    ) -> Result<(VarMap, Vec<Q>)> {
        let varmap = VarMap::new();
        let qs = (0..n_nets)
            .map(|ix| {
                let vb = VarBuilder::from_varmap(&varmap, F32, device)
                    .set_prefix(format!("{}{}", prefix, ix));
                Q::build(vb, q_config.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((varmap, qs))
    }
}

impl<Q> MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    /// Polyak update of the target networks with coefficient `tau`.
    pub fn soft_update(&mut self) -> Result<()> {
        track_with_replace_substring(
            &self.varmap_tgt,
            &self.varmap,
            self.tau,
            ("critic", "critic_tgt"),
        )
    }

    fn forward_all(qs: &[Q], obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        qs.iter()
            .map(|critic| -> Result<Tensor> { Ok(critic.forward(obs, act)?.squeeze(D::Minus1)?) })
            .collect()
    }

    /// Returns action values of all critics, each of shape `[batch_size]`.
    pub fn qvals(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        Self::forward_all(&self.qs, obs, act)
    }

    /// Returns minimum action values over critics.
    pub fn qvals_min(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let qvals = Tensor::stack(&self.qvals(obs, act)?, 0)?; // [n_nets, batch_size]
        Ok(qvals.min(0)?)
    }

    /// Returns minimum action values over target critics.
    pub fn qvals_min_tgt(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let qvals = Tensor::stack(&Self::forward_all(&self.qs_tgt, obs, act)?, 0)?;
        Ok(qvals.min(0)?)
    }

    /// Backward step for all variables in critic networks.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Saves critics to `path` and target critics to `path_tgt`.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        path_tgt: impl AsRef<Path>,
    ) -> Result<(PathBuf, PathBuf)> {
        let path = path.as_ref().to_path_buf();
        self.varmap.save(&path)?;
        info!("Save critics to {:?}", path);

        let path_tgt = path_tgt.as_ref().to_path_buf();
        self.varmap_tgt.save(&path_tgt)?;
        info!("Save target critics to {:?}", path_tgt);

        Ok((path, path_tgt))
    }

    /// Loads critics from `path` and target critics from `path_tgt`.
    pub fn load(&mut self, path: impl AsRef<Path>, path_tgt: impl AsRef<Path>) -> Result<()> {
        self.varmap.load(path.as_ref())?;
        info!("Load critics from {:?}", path.as_ref());

        self.varmap_tgt.load(path_tgt.as_ref())?;
        info!("Load target critics from {:?}", path_tgt.as_ref());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, MlpConfig};

    fn critic(tau: f64) -> Result<MultiCritic<Mlp>> {
        let config = MultiCriticConfig::default()
            .q_config(MlpConfig::new(0, vec![8], 0, false))
            .dims(3, 2)
            .tau(tau);
        MultiCritic::<Mlp>::build(config, Device::Cpu)
    }

    #[test]
    fn test_targets_start_equal() -> Result<()> {
        let critic = critic(0.005)?;
        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1f32, (4, 2), &Device::Cpu)?;

        let qs = critic.qvals(&obs, &act)?;
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].dims(), [4]);

        let q = critic.qvals_min(&obs, &act)?.to_vec1::<f32>()?;
        let q_tgt = critic.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?;
        for (a, b) in q.iter().zip(q_tgt.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_soft_update_moves_targets() -> Result<()> {
        let mut critic = critic(1.0)?;
        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1f32, (4, 2), &Device::Cpu)?;

        let qs = critic.qvals(&obs, &act)?;
        let loss = (qs[0].sqr()?.mean_all()? + qs[1].sqr()?.mean_all()?)?;
        critic.backward_step(&loss)?;
        let q = critic.qvals_min(&obs, &act)?;
        let q_tgt = critic.qvals_min_tgt(&obs, &act)?;
        assert!((&q - &q_tgt)?.abs()?.sum_all()?.to_scalar::<f32>()? > 0.0);

        critic.soft_update()?;
        let q_tgt = critic.qvals_min_tgt(&obs, &act)?;
        assert!((q - q_tgt)?.abs()?.sum_all()?.to_scalar::<f32>()? < 1e-5);
        Ok(())
    }
}
