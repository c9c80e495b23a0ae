use super::{EnsembleConfig, NextStatePrediction, WorldModel};
use crate::{
    mlp::{Mlp, Mlp2},
    model::SubModel1,
    opt::Optimizer,
    util::{vec_to_tensor, OutDim},
};
use anyhow::{Context, Result};
use cares_core::{CaresError, Statistics};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{loss::mse, VarBuilder, VarMap};
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A dynamics model predicting a diagonal Gaussian over the normalized delta.
struct Member {
    // Keeps the parameters alive with the optimizer.
    _varmap: VarMap,
    net: Mlp2,
    opt: Optimizer,
}

impl Member {
    fn forward(
        &self,
        obs: &Tensor,
        act: &Tensor,
        logvar_range: (f64, f64),
    ) -> Result<(Tensor, Tensor)> {
        let (mean, logvar) = self.net.forward(&Tensor::cat(&[obs, act], D::Minus1)?)?;
        Ok((mean, logvar.clamp(logvar_range.0, logvar_range.1)?))
    }
}

/// Normalization constants as tensors of shape `[obs_dim]`.
struct Normalizer {
    obs_mean: Tensor,
    obs_std: Tensor,
    delta_mean: Tensor,
    delta_std: Tensor,
}

impl Normalizer {
    fn new(stats: &Statistics, device: &Device) -> Result<Self> {
        Ok(Self {
            obs_mean: vec_to_tensor(&stats.observation_mean, device)?,
            obs_std: vec_to_tensor(&stats.observation_std, device)?,
            delta_mean: vec_to_tensor(&stats.delta_mean, device)?,
            delta_std: vec_to_tensor(&stats.delta_std, device)?,
        })
    }

    fn normalize_obs(&self, obs: &Tensor) -> Result<Tensor> {
        Ok(obs
            .broadcast_sub(&self.obs_mean)?
            .broadcast_div(&self.obs_std)?)
    }

    fn normalize_delta(&self, delta: &Tensor) -> Result<Tensor> {
        Ok(delta
            .broadcast_sub(&self.delta_mean)?
            .broadcast_div(&self.delta_std)?)
    }

    fn denormalize_delta(&self, delta: &Tensor) -> Result<Tensor> {
        Ok(delta
            .broadcast_mul(&self.delta_std)?
            .broadcast_add(&self.delta_mean)?)
    }
}

/// Ensemble of probabilistic dynamics models and a reward model.
///
/// Each member is trained with the Gaussian negative log likelihood of the
/// normalized state delta `(s' - s - delta_mean) / delta_std` given the
/// normalized state and the action. The reward model takes the normalized
/// state, the action and the normalized next state and is trained with the
/// mean squared error.
pub struct ProbabilisticEnsemble {
    members: Vec<Member>,
    _reward_varmap: VarMap,
    reward_net: Mlp,
    reward_opt: Optimizer,
    logvar_range: (f64, f64),
    obs_dim: usize,
    statistics: Option<Statistics>,
    normalizer: Option<Normalizer>,
    rng: StdRng,
    device: Device,
}

impl ProbabilisticEnsemble {
    /// Constructs the ensemble. Dimensions must be set with [`EnsembleConfig::dims`].
    ///
    /// Fails with [`CaresError::InvalidConfig`] if `num_models` is zero.
    pub fn build(config: EnsembleConfig) -> Result<Self> {
        if config.num_models == 0 {
            return Err(CaresError::InvalidConfig("num_models must be positive".into()).into());
        }
        let device: Device = config
            .device
            .context("No device is given for the ensemble")?
            .try_into()?;
        let obs_dim = config.model_config.get_out_dim();

        let members = (0..config.num_models)
            .map(|ix| -> Result<Member> {
                let varmap = VarMap::new();
                let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device)
                    .set_prefix(format!("model{}", ix));
                let net = Mlp2::build(vb, config.model_config.clone())?;
                let opt = config.opt_config.build(varmap.all_vars())?;
                Ok(Member {
                    _varmap: varmap,
                    net,
                    opt,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let reward_varmap = VarMap::new();
        let reward_net = {
            let vb = VarBuilder::from_varmap(&reward_varmap, DType::F32, &device)
                .set_prefix("reward");
            Mlp::build(vb, config.reward_config.clone())?
        };
        let reward_opt = config.opt_config.build(reward_varmap.all_vars())?;
        info!(
            "Build ensemble: {} models, obs_dim = {}",
            config.num_models, obs_dim
        );

        Ok(Self {
            members,
            _reward_varmap: reward_varmap,
            reward_net,
            reward_opt,
            logvar_range: (config.min_logvar, config.max_logvar),
            obs_dim,
            statistics: None,
            normalizer: None,
            rng: StdRng::seed_from_u64(config.seed),
            device,
        })
    }

    fn normalizer(&self) -> Result<&Normalizer> {
        Ok(self
            .normalizer
            .as_ref()
            .ok_or(CaresError::StatisticsNotSet)?)
    }
}

impl WorldModel for ProbabilisticEnsemble {
    fn train_world(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
        next_states: &Tensor,
    ) -> Result<f32> {
        let (obs, target) = {
            let normalizer = self.normalizer()?;
            let obs = normalizer.normalize_obs(states)?;
            let target = normalizer.normalize_delta(&(next_states - states)?)?;
            (obs, target)
        };

        let mut total = 0f32;
        for member in self.members.iter_mut() {
            let (mean, logvar) = member.forward(&obs, actions, self.logvar_range)?;
            let inv_var = logvar.neg()?.exp()?;
            let loss = (((mean - &target)?.sqr()? * inv_var)? + logvar)?.mean_all()?;
            member.opt.backward_step(&loss)?;
            total += loss.to_scalar::<f32>()?;
        }
        let loss = total / self.members.len() as f32;
        debug!("world model loss = {}", loss);

        Ok(loss)
    }

    fn train_reward(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
        next_states: &Tensor,
        rewards: &Tensor,
    ) -> Result<f32> {
        let pred = self.pred_rewards(states, actions, next_states)?;
        let loss = mse(&pred, rewards)?;
        self.reward_opt.backward_step(&loss)?;
        let loss = loss.to_scalar::<f32>()?;
        debug!("reward model loss = {}", loss);

        Ok(loss)
    }

    fn pred_next_states(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
    ) -> Result<NextStatePrediction> {
        let obs = self.normalizer()?.normalize_obs(states)?;

        let mut means = Vec::with_capacity(self.members.len());
        let mut vars = Vec::with_capacity(self.members.len());
        for member in self.members.iter() {
            let (mean, logvar) = member.forward(&obs, actions, self.logvar_range)?;
            means.push(mean.detach());
            vars.push(logvar.detach().exp()?);
        }
        let means = Tensor::stack(&means, 0)?;
        let vars = Tensor::stack(&vars, 0)?;

        let ix = self.rng.gen_range(0..self.members.len());
        let delta = {
            let mean = means.get(ix)?;
            let std = vars.get(ix)?.sqrt()?;
            (&mean + (std * mean.randn_like(0.0, 1.0)?)?)?
        };
        let sample = (states + self.denormalize_delta(&delta)?)?;
        let mean = (states + self.denormalize_delta(&means.mean(0)?)?)?;

        Ok(NextStatePrediction {
            sample,
            mean,
            means,
            vars,
        })
    }

    fn pred_rewards(
        &self,
        states: &Tensor,
        actions: &Tensor,
        next_states: &Tensor,
    ) -> Result<Tensor> {
        let normalizer = self.normalizer()?;
        let input = Tensor::cat(
            &[
                normalizer.normalize_obs(states)?,
                actions.clone(),
                normalizer.normalize_obs(next_states)?,
            ],
            D::Minus1,
        )?;
        Ok(self.reward_net.forward(&input)?.squeeze(D::Minus1)?)
    }

    fn set_statistics(&mut self, stats: &Statistics) -> Result<()> {
        if stats.obs_dim() != self.obs_dim {
            return Err(CaresError::DimensionMismatch {
                field: "statistics".to_string(),
                expected: self.obs_dim,
                got: stats.obs_dim(),
            }
            .into());
        }
        self.normalizer = Some(Normalizer::new(stats, &self.device)?);
        self.statistics = Some(stats.clone());
        Ok(())
    }

    fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    fn denormalize_delta(&self, delta: &Tensor) -> Result<Tensor> {
        self.normalizer()?.denormalize_delta(delta)
    }

    fn num_models(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::rows_to_tensor;

    fn stats(d: usize) -> Statistics {
        Statistics {
            observation_mean: vec![0.0; d],
            observation_std: vec![1.0; d],
            delta_mean: vec![0.0; d],
            delta_std: vec![1.0; d],
        }
    }

    fn ensemble() -> Result<ProbabilisticEnsemble> {
        let config = EnsembleConfig::default()
            .num_models(3)
            .model_units(vec![32, 32])
            .reward_units(vec![16])
            .dims(4, 2)
            .device(crate::Device::Cpu);
        ProbabilisticEnsemble::build(config)
    }

    #[test]
    fn test_statistics_required() -> Result<()> {
        let mut model = ensemble()?;
        let s = Tensor::zeros((2, 4), DType::F32, &Device::Cpu)?;
        let a = Tensor::zeros((2, 2), DType::F32, &Device::Cpu)?;
        let err = model.pred_next_states(&s, &a).err().context("must fail")?;
        assert_eq!(
            err.downcast_ref::<CaresError>(),
            Some(&CaresError::StatisticsNotSet)
        );

        let err = model.set_statistics(&stats(3)).err().context("must fail")?;
        assert!(err.downcast_ref::<CaresError>().is_some());
        Ok(())
    }

    #[test]
    fn test_no_models() {
        let config = EnsembleConfig::default()
            .num_models(0)
            .dims(4, 2)
            .device(crate::Device::Cpu);
        let err = ProbabilisticEnsemble::build(config).err().map(|e| e.to_string());
        assert_eq!(
            err,
            Some("Invalid configuration: num_models must be positive".to_string())
        );
    }

    #[test]
    fn test_prediction_shapes() -> Result<()> {
        let mut model = ensemble()?;
        model.set_statistics(&stats(4))?;
        let s = Tensor::randn(0f32, 1f32, (5, 4), &Device::Cpu)?;
        let a = Tensor::randn(0f32, 1f32, (5, 2), &Device::Cpu)?;

        let pred = model.pred_next_states(&s, &a)?;
        assert_eq!(pred.sample.dims(), [5, 4]);
        assert_eq!(pred.mean.dims(), [5, 4]);
        assert_eq!(pred.means.dims(), [3, 5, 4]);
        assert_eq!(pred.vars.dims(), [3, 5, 4]);
        let vars = pred.vars.flatten_all()?.to_vec1::<f32>()?;
        assert!(vars.iter().all(|v| *v > 0.0));

        let r = model.pred_rewards(&s, &a, &pred.sample)?;
        assert_eq!(r.dims(), [5]);
        Ok(())
    }

    #[test]
    fn test_training_reduces_losses() -> Result<()> {
        let mut model = ensemble()?;
        model.set_statistics(&stats(4))?;
        let data: Vec<f32> = (0..32).map(|i| (i as f32 * 0.37).sin()).collect();
        let s = rows_to_tensor(&data, 4, &Device::Cpu)?;
        let a = rows_to_tensor(&data[..16], 2, &Device::Cpu)?;
        let ns = (&s * 0.5)?;
        let r = s.sum(D::Minus1)?;

        let first = model.train_world(&s, &a, &ns)?;
        let first_r = model.train_reward(&s, &a, &ns, &r)?;
        let (mut last, mut last_r) = (first, first_r);
        for _ in 0..200 {
            last = model.train_world(&s, &a, &ns)?;
            last_r = model.train_reward(&s, &a, &ns, &r)?;
        }
        assert!(last < first);
        assert!(last_r < first_r);
        Ok(())
    }
}
