use super::{huber, priorities, prioritized_approximate_loss, La3pSacConfig};
use crate::{
    model::{SubModel1, SubModel2},
    sac::Sac,
    tensor_batch::TensorBatch,
    util::OutDim,
};
use anyhow::Result;
use cares_core::{
    record::{Record, RecordValue},
    Agent, PrioritizedReplayBuffer,
};
use candle_core::Tensor;
use log::{info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

type ActionValue = Tensor;
type ActMean = Tensor;
type ActStd = Tensor;

/// SAC with loss-adjusted approximate actor prioritization.
///
/// Each call of [`Agent::train_policy`] splits the batch in three parts:
///
/// 1. a uniform batch trains the critics with the prioritized approximate
///    loss and the actor,
/// 2. a prioritized batch trains the critics with the Huber loss,
/// 3. an inverse-prioritized batch trains the actor.
///
/// Priorities of the samples used for the critics are written back to the
/// buffer. The actor loss uses the target critics.
pub struct La3pSac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
{
    sac: Sac<Q, P>,
    prioritized_fraction: f64,
    per_alpha: f64,
    min_priority: f64,
    target_update_freq: usize,
    stratified: bool,
    learn_counter: usize,
}

impl<Q, P> La3pSac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Constructs the agent.
    ///
    /// Dimensions and device must be set with [`La3pSacConfig::dims`] and
    /// [`La3pSacConfig::device`].
    pub fn build(config: La3pSacConfig<Q::Config, P::Config>, obs_dim: usize) -> Result<Self> {
        info!(
            "Build LA3PSAC: prioritized_fraction = {}, per_alpha = {}, min_priority = {}",
            config.prioritized_fraction, config.per_alpha, config.min_priority
        );
        Ok(Self {
            sac: Sac::build(config.sac_config, obs_dim)?,
            prioritized_fraction: config.prioritized_fraction,
            per_alpha: config.per_alpha,
            min_priority: config.min_priority,
            target_update_freq: config.target_update_freq.max(1),
            stratified: config.stratified,
            learn_counter: 0,
        })
    }

    /// The SAC components.
    pub fn sac(&self) -> &Sac<Q, P> {
        &self.sac
    }

    /// Critic step on a batch. Returns the loss and the new priorities.
    ///
    /// Uniform batches use the prioritized approximate loss normalized by the
    /// mean priority, prioritized batches the Huber loss.
    fn update_critic(
        &mut self,
        batch: &TensorBatch,
        uniform: bool,
    ) -> Result<(f32, Vec<f64>)> {
        let td_errors = self
            .sac
            .td_errors(batch)?
            .iter()
            .map(|td| -> Result<Tensor> { Ok(td.abs()?) })
            .collect::<Result<Vec<_>>>()?;
        let prios = priorities(&td_errors, self.min_priority, self.per_alpha)?;

        let mut losses = Vec::with_capacity(td_errors.len());
        for td in td_errors.iter() {
            losses.push(match uniform {
                true => prioritized_approximate_loss(td, self.min_priority, self.per_alpha)?,
                false => huber(td, self.min_priority)?,
            });
        }
        let mut loss = Tensor::stack(&losses, 0)?.sum_all()?;
        if uniform {
            loss = (loss / prios.mean_all()?)?;
        }
        self.sac.critic_step(&loss)?;

        let prios = prios
            .to_vec1::<f32>()?
            .into_iter()
            .map(|p| p as f64)
            .collect();
        Ok((loss.to_scalar::<f32>()?, prios))
    }

    fn update_actor(&mut self, states: &Tensor) -> Result<Record> {
        let (actor_loss, alpha_loss) = self.sac.update_actor(states, true)?;
        let mut record = Record::from_slice(&[
            ("actor_loss", RecordValue::Scalar(actor_loss)),
            ("alpha", RecordValue::Scalar(self.sac.alpha()?)),
        ]);
        if let Some(alpha_loss) = alpha_loss {
            record.insert("alpha_loss", RecordValue::Scalar(alpha_loss));
        }
        Ok(record)
    }

    fn train_policy_(
        &mut self,
        buffer: &mut PrioritizedReplayBuffer,
        batch_size: usize,
    ) -> Result<Record> {
        self.learn_counter += 1;
        let uniform_batch_size = (batch_size as f64 * (1.0 - self.prioritized_fraction)) as usize;
        let priority_batch_size = (batch_size as f64 * self.prioritized_fraction) as usize;
        let target_update = self.learn_counter % self.target_update_freq == 0;
        let device = self.sac.device().clone();
        let mut record = Record::empty();

        if uniform_batch_size > 0 {
            let batch = buffer.sample_uniform(uniform_batch_size)?;
            let tensors = TensorBatch::from_batch(&batch, &device)?;
            let (loss, prios) = self.update_critic(&tensors, true)?;
            buffer.update_priorities(&batch.indices, &prios)?;

            let mut info = self.update_actor(&tensors.state)?;
            info.insert("critic_loss_total", RecordValue::Scalar(loss));
            if target_update {
                self.sac.soft_update()?;
            }
            record.merge_inplace(info.with_prefix("uniform"));
        }

        if priority_batch_size > 0 {
            let batch = buffer.sample_priority(priority_batch_size, self.stratified)?;
            let tensors = TensorBatch::from_batch(&batch, &device)?;
            let (loss, prios) = self.update_critic(&tensors, false)?;
            buffer.update_priorities(&batch.indices, &prios)?;
            if target_update {
                self.sac.soft_update()?;
            }

            let batch = buffer.sample_inverse_priority(priority_batch_size)?;
            let tensors = TensorBatch::from_batch(&batch, &device)?;
            let mut info = self.update_actor(&tensors.state)?;
            info.insert("critic_loss_total", RecordValue::Scalar(loss));
            record.merge_inplace(info.with_prefix("priority"));
        }
        trace!("LA3PSAC step {}", self.learn_counter);

        Ok(record)
    }
}

impl<Q, P> Agent for La3pSac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
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

    fn save_models(&self, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
        let paths = self.sac.save(dir, name)?;
        info!("Save LA3PSAC models to {:?}", dir);
        Ok(paths)
    }

    fn load_models(&mut self, dir: &Path, name: &str) -> Result<()> {
        self.sac.load(dir, name)?;
        info!("Load LA3PSAC models from {:?}", dir);
        Ok(())
    }
}
