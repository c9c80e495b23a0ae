use super::{
    copy_goal, gripper_reward, inverse_variance_weights, total_variance, DynaSacConfig,
    RewardSource,
};
use crate::{
    model::{SubModel1, SubModel2},
    sac::Sac,
    tensor_batch::TensorBatch,
    util::{repeat_interleave, vec_to_tensor, OutDim},
    world_model::{NextStatePrediction, ProbabilisticEnsemble, WorldModel},
};
use anyhow::Result;
use cares_core::{
    record::{Record, RecordValue},
    Agent, CaresError, PrioritizedReplayBuffer, Statistics,
};
use candle_core::Tensor;
use log::{debug, info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

type ActionValue = Tensor;
type ActMean = Tensor;
type ActStd = Tensor;

/// Dyna SAC with uncertainty-weighted synthetic transitions.
///
/// Every call of [`Agent::train_policy`] performs a SAC update on a uniform
/// batch of real transitions, rolls the world model out from the next states
/// of that batch and performs another SAC update on the synthetic
/// transitions. The critic loss of the synthetic update weights each
/// transition by the inverse variance of its bootstrapped target, estimated
/// from samples of the ensemble members.
pub struct DynaSacNsIw<Q, P, W = ProbabilisticEnsemble>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    W: WorldModel,
{
    sac: Sac<Q, P>,
    world_model: W,
    horizon: usize,
    num_samples: usize,
    threshold: f64,
    sample_times: usize,
    reward: RewardSource,
    train_reward: bool,
    policy_update_freq: usize,
    learn_counter: usize,
}

impl<Q, P> DynaSacNsIw<Q, P, ProbabilisticEnsemble>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Constructs the agent with a [`ProbabilisticEnsemble`].
    ///
    /// Dimensions and devices must be set with [`DynaSacConfig::dims`] and
    /// [`DynaSacConfig::device`].
    pub fn build(config: DynaSacConfig<Q::Config, P::Config>, obs_dim: usize) -> Result<Self> {
        let world_model = ProbabilisticEnsemble::build(config.world_model_config.clone())?;
        Self::with_world_model(config, obs_dim, world_model)
    }
}

impl<Q, P, W> DynaSacNsIw<Q, P, W>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    W: WorldModel,
{
    /// Constructs the agent with the given world model.
    ///
    /// `config.world_model_config` is not used. Fails with
    /// [`CaresError::InvalidConfig`] if `num_samples` is zero, `sample_times`
    /// is less than 2 or the world model has no member.
    pub fn with_world_model(
        config: DynaSacConfig<Q::Config, P::Config>,
        obs_dim: usize,
        world_model: W,
    ) -> Result<Self> {
        let invalid = |msg: &str| -> Result<Self> {
            Err(CaresError::InvalidConfig(msg.to_string()).into())
        };
        if config.num_samples == 0 {
            return invalid("num_samples must be positive");
        }
        // The unbiased variance over the samples of one model needs two of them.
        if config.sample_times < 2 {
            return invalid("sample_times must be at least 2");
        }
        if world_model.num_models() == 0 {
            return invalid("the world model has no member");
        }
        info!(
            "Build DynaSAC_NS_IW: horizon = {}, num_samples = {}, reward = {:?}",
            config.horizon, config.num_samples, config.reward
        );
        Ok(Self {
            sac: Sac::build(config.sac_config, obs_dim)?,
            world_model,
            horizon: config.horizon,
            num_samples: config.num_samples,
            threshold: config.threshold,
            sample_times: config.sample_times,
            reward: config.reward,
            train_reward: config.train_reward,
            policy_update_freq: config.policy_update_freq.max(1),
            learn_counter: 0,
        })
    }

    /// The world model.
    pub fn world_model(&self) -> &W {
        &self.world_model
    }

    /// The SAC components.
    pub fn sac(&self) -> &Sac<Q, P> {
        &self.sac
    }

    /// SAC update on a batch; the targets are moved every
    /// `policy_update_freq` calls of `train_policy`.
    fn update_sac(&mut self, batch: &TensorBatch) -> Result<Record> {
        let critic_loss = self.sac.update_critic(batch)?;
        let (actor_loss, alpha_loss) = self.sac.update_actor(&batch.state, false)?;
        if self.learn_counter % self.policy_update_freq == 0 {
            self.sac.soft_update()?;
        }

        let mut record = Record::from_slice(&[
            ("critic_loss_total", RecordValue::Scalar(critic_loss)),
            ("actor_loss", RecordValue::Scalar(actor_loss)),
        ]);
        if let Some(alpha_loss) = alpha_loss {
            record.insert("alpha_loss", RecordValue::Scalar(alpha_loss));
        }
        Ok(record)
    }

    /// Rewards of transitions `(states, actions, next_states)`, `[batch_size]`.
    fn rewards(
        &self,
        states: &Tensor,
        actions: &Tensor,
        next_states: &Tensor,
    ) -> Result<Tensor> {
        match self.reward {
            RewardSource::Gripper => gripper_reward(states, next_states),
            RewardSource::Learned => Ok(self
                .world_model
                .pred_rewards(states, actions, next_states)?
                .detach()),
        }
    }

    /// Weights of the transitions starting at `states` with `actions`.
    ///
    /// Draws `sample_times` next states from every member's Gaussian over the
    /// normalized delta and evaluates the reward, the log probability of a
    /// policy action and the minimum target Q value at each of them. The
    /// variance of the bootstrapped target over these samples is converted
    /// with [`inverse_variance_weights`].
    pub fn uncertainty_weights(
        &self,
        states: &Tensor,
        actions: &Tensor,
        prediction: &NextStatePrediction,
    ) -> Result<Tensor> {
        let n_models = prediction.means.dims()[0];
        let mut rewards = Vec::with_capacity(n_models * self.sample_times);
        let mut log_pis = Vec::with_capacity(n_models * self.sample_times);
        let mut qs = Vec::with_capacity(n_models * self.sample_times);

        for i in 0..n_models {
            let mean = prediction.means.get(i)?;
            let std = prediction.vars.get(i)?.sqrt()?;
            for _ in 0..self.sample_times {
                let delta = (&mean + (&std * mean.randn_like(0.0, 1.0)?)?)?;
                let next_states = (states + self.world_model.denormalize_delta(&delta)?)?;
                let (act, log_pi, _) = self.sac.actor().action_logp(&next_states)?;
                let q = self.sac.critic().qvals_min_tgt(&next_states, &act)?;
                rewards.push(self.rewards(states, actions, &next_states)?);
                log_pis.push(log_pi.detach());
                qs.push(q.detach());
            }
        }

        let total_var = total_variance(
            &Tensor::stack(&rewards, 0)?,
            &Tensor::stack(&log_pis, 0)?,
            &Tensor::stack(&qs, 0)?,
            self.sac.gamma(),
        )?;
        let weights = inverse_variance_weights(&total_var.to_vec1::<f32>()?, self.threshold);
        trace!(
            "weights: mean = {}",
            weights.iter().sum::<f32>() / weights.len().max(1) as f32
        );

        vec_to_tensor(&weights, self.sac.device())
    }

    /// Rolls the world model out from `states` for `horizon` steps.
    ///
    /// Every step repeats each state `num_samples` times, so step `h` has
    /// `batch_size * num_samples^h` transitions. The transitions of all steps
    /// are stacked, with `done` set to 0 and weights from
    /// [`DynaSacNsIw::uncertainty_weights`].
    pub fn generate_rollouts(&mut self, states: &Tensor) -> Result<TensorBatch> {
        let mut pred_states = Vec::with_capacity(self.horizon);
        let mut pred_actions = Vec::with_capacity(self.horizon);
        let mut pred_rewards = Vec::with_capacity(self.horizon);
        let mut pred_next_states = Vec::with_capacity(self.horizon);
        let mut weights = Vec::with_capacity(self.horizon);

        let mut state = states.detach();
        for h in 0..self.horizon {
            state = repeat_interleave(&state, self.num_samples)?;
            let (act, _, _) = self.sac.actor().action_logp(&state)?;
            let act = act.detach();
            let prediction = self.world_model.pred_next_states(&state, &act)?;
            let next_state = match self.reward {
                RewardSource::Gripper => copy_goal(&state, &prediction.sample)?,
                RewardSource::Learned => prediction.sample.clone(),
            };
            let reward = self.rewards(&state, &act, &prediction.sample)?;
            let weight = self.uncertainty_weights(&state, &act, &prediction)?;
            trace!("rollout step {}: batch size = {}", h, state.dims()[0]);

            pred_states.push(state);
            pred_actions.push(act);
            pred_rewards.push(reward);
            pred_next_states.push(next_state.clone());
            weights.push(weight);
            state = next_state;
        }

        let reward = Tensor::cat(&pred_rewards, 0)?;
        let done = reward.zeros_like()?;
        Ok(TensorBatch {
            state: Tensor::cat(&pred_states, 0)?,
            action: Tensor::cat(&pred_actions, 0)?,
            reward,
            next_state: Tensor::cat(&pred_next_states, 0)?,
            done,
            weights: Some(Tensor::cat(&weights, 0)?),
        })
    }

    fn train_policy_(
        &mut self,
        buffer: &mut PrioritizedReplayBuffer,
        batch_size: usize,
    ) -> Result<Record> {
        self.learn_counter += 1;

        let batch = buffer.sample_uniform(batch_size)?;
        let batch = TensorBatch::from_batch(&batch, self.sac.device())?;
        let mut record = self.update_sac(&batch)?.with_prefix("real");

        if self.horizon > 0 {
            let synthetic = self.generate_rollouts(&batch.next_state)?;
            debug!("synthetic batch size = {}", synthetic.len());
            record.merge_inplace(self.update_sac(&synthetic)?.with_prefix("dyna"));
            record.insert(
                "dyna/batch_size",
                RecordValue::Scalar(synthetic.len() as f32),
            );
        }
        record.insert("alpha", RecordValue::Scalar(self.sac.alpha()?));

        Ok(record)
    }
}

impl<Q, P, W> Agent for DynaSacNsIw<Q, P, W>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    W: WorldModel,
{
    fn select_action(
        &mut self,
        state: &[f32],
        evaluation: bool,
        _noise_scale: f32,
    ) -> Result<Vec<f32>> {
        self.sac.select_action(state, evaluation)
    }

    fn train_policy(
        &mut self,
        buffer: &mut PrioritizedReplayBuffer,
        batch_size: usize,
    ) -> Result<Record> {
        self.train_policy_(buffer, batch_size)
    }

    fn train_world_model(
        &mut self,
        buffer: &mut PrioritizedReplayBuffer,
        batch_size: usize,
    ) -> Result<Record> {
        let batch = buffer.sample_uniform(batch_size)?;
        let batch = TensorBatch::from_batch(&batch, self.sac.device())?;
        let loss = self
            .world_model
            .train_world(&batch.state, &batch.action, &batch.next_state)?;
        let mut record = Record::from_scalar("world_model_loss", loss);

        if self.train_reward {
            let loss = self.world_model.train_reward(
                &batch.state,
                &batch.action,
                &batch.next_state,
                &batch.reward,
            )?;
            record.insert("reward_model_loss", RecordValue::Scalar(loss));
        }
        Ok(record)
    }

    fn set_statistics(&mut self, stats: &Statistics) -> Result<()> {
        self.world_model.set_statistics(stats)
    }

    fn is_model_based(&self) -> bool {
        true
    }

    fn save_models(&self, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
        let paths = self.sac.save(dir, name)?;
        info!("Save DynaSAC_NS_IW models to {:?}", dir);
        Ok(paths)
    }

    fn load_models(&mut self, dir: &Path, name: &str) -> Result<()> {
        self.sac.load(dir, name)?;
        info!("Load DynaSAC_NS_IW models from {:?}", dir);
        Ok(())
    }
}
