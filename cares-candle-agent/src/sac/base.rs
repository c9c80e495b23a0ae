use super::{EntCoef, SacConfig};
use crate::{
    model::{SubModel1, SubModel2},
    tensor_batch::TensorBatch,
    util::{actor::GaussianActor, critic::MultiCritic, vec_to_tensor, OutDim},
};
use anyhow::{Context, Result};
use cares_core::{checkpoint_path, CaresError};
use candle_core::{DType, Device, Tensor};
use log::{info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

type ActionValue = Tensor;
type ActMean = Tensor;
type ActStd = Tensor;

/// Soft actor critic (SAC) components shared by the agents.
///
/// Holds a tanh-Gaussian actor, twin critics with their target networks and
/// the entropy coefficient. The agents decide which batches flow through
/// [`Sac::update_critic`] and [`Sac::update_actor`] and when the targets are
/// moved with [`Sac::soft_update`].
pub struct Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
{
    critic: MultiCritic<Q>,
    actor: GaussianActor<P>,
    ent_coef: EntCoef,
    gamma: f64,
    reward_scale: f32,
    obs_dim: usize,
    device: Device,
}

impl<Q, P> Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Constructs the SAC components.
    ///
    /// The network dimensions in `config` must already be set, see
    /// [`SacConfig::dims`].
    pub fn build(config: SacConfig<Q::Config, P::Config>, obs_dim: usize) -> Result<Self> {
        let device: Device = config
            .device
            .context("No device is given for SAC")?
            .try_into()?;
        let actor = GaussianActor::build(config.actor_config, device.clone())?;
        let critic = MultiCritic::build(config.critic_config, device.clone())?;
        let ent_coef = EntCoef::new(config.ent_coef_mode, config.act_dim, device.clone())?;
        info!(
            "Build SAC: obs_dim = {}, act_dim = {}, gamma = {}",
            obs_dim, config.act_dim, config.gamma
        );

        Ok(Self {
            critic,
            actor,
            ent_coef,
            gamma: config.gamma,
            reward_scale: config.reward_scale,
            obs_dim,
            device,
        })
    }

    /// The actor.
    pub fn actor(&self) -> &GaussianActor<P> {
        &self.actor
    }

    /// The twin critics and their targets.
    pub fn critic(&self) -> &MultiCritic<Q> {
        &self.critic
    }

    /// Discount factor.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Device of the networks.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Current entropy coefficient.
    pub fn alpha(&self) -> Result<f32> {
        self.ent_coef.alpha_scalar()
    }

    /// Bootstrapped target `r + gamma * (1 - done) * (min Q_tgt(s', a') - alpha * log pi(a'|s'))`.
    ///
    /// The result is detached and has shape `[batch_size]`.
    pub fn target(&self, batch: &TensorBatch) -> Result<Tensor> {
        let (next_act, next_log_p, _) = self.actor.action_logp(&batch.next_state)?;
        let next_q = self.critic.qvals_min_tgt(&batch.next_state, &next_act)?;
        let next_q = (next_q - self.ent_coef.alpha()?.broadcast_mul(&next_log_p)?)?;
        let not_done = (1f64 - &batch.done)?;
        let reward = (&batch.reward * self.reward_scale as f64)?;
        Ok((reward + ((not_done * self.gamma)? * next_q)?)?.detach())
    }

    /// TD errors `target - Q_k(s, a)` of every critic, each of shape `[batch_size]`.
    ///
    /// The errors carry gradients with respect to the critic parameters.
    pub fn td_errors(&self, batch: &TensorBatch) -> Result<Vec<Tensor>> {
        let tgt = self.target(batch)?;
        self.critic
            .qvals(&batch.state, &batch.action)?
            .iter()
            .map(|q| -> Result<Tensor> { Ok((&tgt - q)?) })
            .collect()
    }

    /// Weighted mean-squared Bellman error summed over critics,
    /// `sum_k 0.5 * mean(w * delta_k^2)`, followed by an optimization step.
    ///
    /// Uses weights 1 when the batch has none. Returns the loss.
    pub fn update_critic(&mut self, batch: &TensorBatch) -> Result<f32> {
        let td_errors = self.td_errors(batch)?;
        let weights = match &batch.weights {
            Some(w) => w.detach(),
            None => Tensor::ones(batch.len(), DType::F32, &self.device)?,
        };
        let mut losses = Vec::with_capacity(td_errors.len());
        for td in td_errors.iter() {
            losses.push(((td.sqr()? * &weights)?.mean_all()? * 0.5)?);
        }
        let loss = Tensor::stack(&losses, 0)?.sum_all()?;
        self.critic.backward_step(&loss)?;
        trace!("critic loss = {:?}", loss);

        Ok(loss.to_scalar::<f32>()?)
    }

    /// Optimization step of the critics with an arbitrary loss.
    pub fn critic_step(&mut self, loss: &Tensor) -> Result<()> {
        self.critic.backward_step(loss)
    }

    /// Updates the actor with loss `mean(alpha * log pi - min Q)`, then the
    /// entropy coefficient with the log probabilities of the same actions.
    ///
    /// `min Q` is taken from the target critics when `target_critic` is
    /// `true`. Returns the actor loss and the entropy coefficient loss.
    pub fn update_actor(
        &mut self,
        states: &Tensor,
        target_critic: bool,
    ) -> Result<(f32, Option<f32>)> {
        let (act, log_p, _) = self.actor.action_logp(states)?;
        let q = match target_critic {
            true => self.critic.qvals_min_tgt(states, &act)?,
            false => self.critic.qvals_min(states, &act)?,
        };
        let alpha = self.ent_coef.alpha()?;
        let loss = (alpha.broadcast_mul(&log_p)? - q)?.mean_all()?;
        self.actor.backward_step(&loss)?;

        let alpha_loss = self.ent_coef.update(&log_p.detach())?;

        Ok((loss.to_scalar::<f32>()?, alpha_loss))
    }

    /// Polyak update of the target critics.
    pub fn soft_update(&mut self) -> Result<()> {
        self.critic.soft_update()
    }

    /// Samples an action for a single state.
    ///
    /// Returns `tanh(mean)` when `evaluation` is `true`.
    pub fn select_action(&self, state: &[f32], evaluation: bool) -> Result<Vec<f32>> {
        if state.len() != self.obs_dim {
            return Err(CaresError::DimensionMismatch {
                field: "state".to_string(),
                expected: self.obs_dim,
                got: state.len(),
            }
            .into());
        }
        let obs = vec_to_tensor(state, &self.device)?.unsqueeze(0)?;
        let act = self.actor.sample(&obs, !evaluation)?;
        Ok(act.flatten_all()?.to_vec1::<f32>()?)
    }

    /// Saves the networks under `dir` as `{name}_actor.pt`, `{name}_critic.pt`,
    /// `{name}_critic_tgt.pt` and `{name}_ent_coef.pt`.
    pub fn save(&self, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let path_actor = self.actor.save(checkpoint_path(dir, name, "actor"))?;
        let (path_critic, path_critic_tgt) = self.critic.save(
            checkpoint_path(dir, name, "critic"),
            checkpoint_path(dir, name, "critic_tgt"),
        )?;
        let path_ent_coef = checkpoint_path(dir, name, "ent_coef");
        self.ent_coef.save(&path_ent_coef)?;

        Ok(vec![path_actor, path_critic, path_critic_tgt, path_ent_coef])
    }

    /// Loads the networks saved with [`Sac::save`].
    pub fn load(&mut self, dir: &Path, name: &str) -> Result<()> {
        self.actor.load(checkpoint_path(dir, name, "actor"))?;
        self.critic.load(
            checkpoint_path(dir, name, "critic"),
            checkpoint_path(dir, name, "critic_tgt"),
        )?;
        self.ent_coef.load(checkpoint_path(dir, name, "ent_coef"))?;
        Ok(())
    }
}
