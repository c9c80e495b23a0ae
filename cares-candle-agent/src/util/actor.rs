//! Actor with Gaussian policy.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{InDim, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Added inside the log of the tanh Jacobian.
const EPSILON: f64 = 1e-6;

/// Sum of the log densities of the standard normal over the last axis.
fn normal_logp(x: &Tensor) -> Result<Tensor> {
    let tmp: Tensor =
        ((-0.5 * (2.0 * std::f32::consts::PI).ln() as f64) - (0.5 * x.powf(2.0)?)?)?;
    Ok(tmp.sum(D::Minus1)?)
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`GaussianActor`].
#[serde(default)]
pub struct GaussianActorConfig<P> {
    /// Configuration of the policy network.
    pub policy_config: Option<P>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Lower bound of log std.
    pub min_log_std: f64,

    /// Upper bound of log std.
    pub max_log_std: f64,
}

impl<P> Default for GaussianActorConfig<P> {
    fn default() -> Self {
        Self {
            policy_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            min_log_std: -20.0,
            max_log_std: 2.0,
        }
    }
}

impl<P> GaussianActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim + InDim,
{
    /// Sets the minimum value of log std.
    pub fn min_log_std(mut self, v: f64) -> Self {
        self.min_log_std = v;
        self
    }

    /// Sets the maximum value of log std.
    pub fn max_log_std(mut self, v: f64) -> Self {
        self.max_log_std = v;
        self
    }

    /// Sets configurations for policy function.
    pub fn policy_config(mut self, v: P) -> Self {
        self.policy_config = Some(v);
        self
    }

    /// Sets input and output dimensions of the policy network.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        if let Some(pi_config) = &mut self.policy_config {
            pi_config.set_in_dim(obs_dim);
            pi_config.set_out_dim(act_dim);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Loads [`GaussianActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GaussianActorConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Actor with tanh-squashed Gaussian policy.
pub struct GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
{
    device: Device,
    varmap: VarMap,

    // Dimension of the action vector.
    out_dim: usize,

    policy: P,
    opt: Optimizer,

    // Min/max log std
    min_log_std: f64,
    max_log_std: f64,
}

impl<P> GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`GaussianActor`].
    pub fn build(config: GaussianActorConfig<P::Config>, device: Device) -> Result<Self> {
        let policy_config = config.policy_config.context("policy_config is not set.")?;
        let out_dim = policy_config.get_out_dim();
        let varmap = VarMap::new();
        let policy = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device).set_prefix("actor");
            P::build(vb, policy_config)?
        };
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            out_dim,
            varmap,
            opt,
            policy,
            min_log_std: config.min_log_std,
            max_log_std: config.max_log_std,
        })
    }

    /// Returns the mean and the clamped log std of the Gaussian distribution.
    ///
    /// The shape of the both tensors is `(batch_size, action_dimension)`.
    pub fn forward(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, log_std) = self.policy.forward(obs)?;
        debug_assert_eq!(mean.dims()[1], self.out_dim);
        let log_std = log_std.clamp(self.min_log_std, self.max_log_std)?;
        Ok((mean, log_std))
    }

    /// Samples actions with their log probabilities.
    ///
    /// Returns `(action, log_prob, deterministic_action)`, where `log_prob`
    /// has shape `[batch_size]` and `deterministic_action` is `tanh(mean)`.
    pub fn action_logp(&self, obs: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let (mean, log_std) = self.forward(obs)?;
        let std = log_std.exp()?;
        let z = Tensor::randn(0f32, 1f32, mean.dims(), &self.device)?;
        let a = (&std * &z + &mean)?.tanh()?;
        let log_p = ((normal_logp(&z)? - log_std.sum(D::Minus1)?)?
            - ((1f64 - a.powf(2.0)?)? + EPSILON)?
                .log()?
                .sum(D::Minus1)?)?;

        Ok((a, log_p, mean.tanh()?))
    }

    /// Samples actions.
    ///
    /// If `train` is `true`, actions are sampled from the squashed Gaussian.
    /// Otherwise, `tanh` of the mean is returned.
    pub fn sample(&self, obs: &Tensor, train: bool) -> Result<Tensor> {
        let (mean, log_std) = self.forward(obs)?;
        match train {
            true => {
                let std = log_std.exp()?;
                Ok(((std * mean.randn_like(0., 1.)?)? + mean)?.tanh()?)
            }
            false => Ok(mean.tanh()?),
        }
    }

    /// Performs an optimization step given a loss.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Save variables to prefix + ".pt".
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.save(path.as_path())?;
        info!("Save actor parameters to {:?}", path);

        Ok(path)
    }

    /// Load variables from prefix + ".pt".
    pub fn load(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.load(path.as_path())?;
        info!("Load actor parameters from {:?}", path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp2, MlpConfig};

    fn actor() -> Result<GaussianActor<Mlp2>> {
        let config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(0, vec![16, 16], 0, false))
            .dims(3, 2);
        GaussianActor::<Mlp2>::build(config, Device::Cpu)
    }

    #[test]
    fn test_action_logp_shapes_and_bounds() -> Result<()> {
        let actor = actor()?;
        let obs = Tensor::randn(0f32, 1f32, (5, 3), &Device::Cpu)?;
        let (a, log_p, det) = actor.action_logp(&obs)?;

        assert_eq!(a.dims(), [5, 2]);
        assert_eq!(log_p.dims(), [5]);
        assert_eq!(det.dims(), [5, 2]);
        let a = a.flatten_all()?.to_vec1::<f32>()?;
        assert!(a.iter().all(|v| v.abs() <= 1.0));
        assert!(log_p.to_vec1::<f32>()?.iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_evaluation_is_deterministic() -> Result<()> {
        let actor = actor()?;
        let obs = Tensor::randn(0f32, 1f32, (1, 3), &Device::Cpu)?;
        let a1 = actor.sample(&obs, false)?.flatten_all()?.to_vec1::<f32>()?;
        let a2 = actor.sample(&obs, false)?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(a1, a2);
        Ok(())
    }
}
