//! Prioritized replay buffer.
mod iw_scheduler;
mod sum_tree;
use super::{
    ConsecutiveBatch, PrioritizedReplayBufferConfig, Statistics, Transition, TransitionBatch,
};
use crate::error::CaresError;
use anyhow::Result;
pub use iw_scheduler::IwScheduler;
use log::{debug, info, trace};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
pub use sum_tree::SumTree;

/// Offset added to priorities before inversion.
const INVERSE_PRIORITY_EPS: f64 = 1e-6;

/// Final value of the importance sampling exponent.
const BETA_FINAL: f64 = 1.0;

/// Column-wise storage, allocated at the first `add`.
struct Columns {
    obs_dim: usize,
    act_dim: usize,
    n_extra: usize,
    state: Vec<f32>,
    action: Vec<f32>,
    reward: Vec<f32>,
    next_state: Vec<f32>,
    done: Vec<i8>,
    extra: Vec<f32>,
}

impl Columns {
    fn new(capacity: usize, obs_dim: usize, act_dim: usize, n_extra: usize) -> Self {
        Self {
            obs_dim,
            act_dim,
            n_extra,
            state: vec![0.; capacity * obs_dim],
            action: vec![0.; capacity * act_dim],
            reward: vec![0.; capacity],
            next_state: vec![0.; capacity * obs_dim],
            done: vec![0; capacity],
            extra: vec![0.; capacity * n_extra],
        }
    }

    fn check(&self, state: &[f32], action: &[f32], next_state: &[f32], extra: &[f32]) -> Result<()> {
        if extra.len() != self.n_extra {
            return Err(CaresError::ArityMismatch {
                expected: self.n_extra,
                got: extra.len(),
            }
            .into());
        }
        for (field, expected, got) in [
            ("state", self.obs_dim, state.len()),
            ("action", self.act_dim, action.len()),
            ("next_state", self.obs_dim, next_state.len()),
        ] {
            if expected != got {
                return Err(CaresError::DimensionMismatch {
                    field: field.to_string(),
                    expected,
                    got,
                }
                .into());
            }
        }
        Ok(())
    }

    fn write(&mut self, i: usize, tr: &Transition) {
        let (o, a, e) = (self.obs_dim, self.act_dim, self.n_extra);
        self.state[i * o..(i + 1) * o].copy_from_slice(&tr.state);
        self.action[i * a..(i + 1) * a].copy_from_slice(&tr.action);
        self.reward[i] = tr.reward;
        self.next_state[i * o..(i + 1) * o].copy_from_slice(&tr.next_state);
        self.done[i] = tr.done as i8;
        self.extra[i * e..(i + 1) * e].copy_from_slice(&tr.extra);
    }

    fn gather(&self, ixs: &[usize], weights: Option<Vec<f32>>) -> TransitionBatch {
        fn rows(src: &[f32], ixs: &[usize], d: usize) -> Vec<f32> {
            ixs.iter()
                .flat_map(|&i| src[i * d..(i + 1) * d].iter().copied())
                .collect()
        }

        TransitionBatch {
            obs_dim: self.obs_dim,
            act_dim: self.act_dim,
            n_extra: self.n_extra,
            state: rows(&self.state, ixs, self.obs_dim),
            action: rows(&self.action, ixs, self.act_dim),
            reward: ixs.iter().map(|&i| self.reward[i]).collect(),
            next_state: rows(&self.next_state, ixs, self.obs_dim),
            done: ixs.iter().map(|&i| self.done[i]).collect(),
            extra: rows(&self.extra, ixs, self.n_extra),
            indices: ixs.to_vec(),
            weights,
        }
    }
}

/// A fixed-capacity circular store of transitions with a sum tree of priorities.
///
/// Slot `i` of the store corresponds to leaf `i` of the tree. A new transition
/// is given the priority `max_priority^alpha`, where `max_priority` is the
/// largest priority ever assigned, so that it is likely to be sampled soon.
///
/// Requesting a batch larger than the number of stored transitions returns
/// a batch of the stored size. Sampling from an empty buffer fails with
/// [`CaresError::EmptyBuffer`].
///
/// ```rust
/// use cares_core::prioritized_replay_buffer::{
///     PrioritizedReplayBuffer, PrioritizedReplayBufferConfig,
/// };
///
/// let config = PrioritizedReplayBufferConfig::default().capacity(100);
/// let mut buffer = PrioritizedReplayBuffer::build(&config).unwrap();
/// buffer.add(&[0.0, 1.0], &[0.5], 1.0, &[1.0, 1.0], false, &[]).unwrap();
///
/// let batch = buffer.sample_priority(32, true).unwrap();
/// assert_eq!(batch.len(), 1);
/// buffer.update_priorities(&batch.indices, &[2.0]).unwrap();
/// ```
pub struct PrioritizedReplayBuffer {
    capacity: usize,

    /// Slot where the next transition is written.
    tree_pointer: usize,

    current_size: usize,

    alpha: f64,

    max_priority: f64,

    columns: Option<Columns>,

    sum_tree: SumTree,

    iw_scheduler: IwScheduler,

    rng: StdRng,
}

impl PrioritizedReplayBuffer {
    /// Creates an empty buffer.
    ///
    /// # Errors
    ///
    /// Fails with [`CaresError::InvalidConfig`] if the capacity is zero.
    pub fn build(config: &PrioritizedReplayBufferConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(CaresError::InvalidConfig("capacity must be positive".to_string()).into());
        }
        info!(
            "Build prioritized replay buffer with capacity {}",
            config.capacity
        );
        Ok(Self {
            capacity: config.capacity,
            tree_pointer: 0,
            current_size: 0,
            alpha: config.alpha,
            max_priority: 1.0,
            columns: None,
            sum_tree: SumTree::new(config.capacity),
            iw_scheduler: IwScheduler::new(config.beta_0, BETA_FINAL, config.beta_increment),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Maximum number of transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.current_size
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.current_size == 0
    }

    /// Largest priority assigned so far.
    pub fn max_priority(&self) -> f64 {
        self.max_priority
    }

    /// Current importance sampling exponent.
    pub fn beta(&self) -> f64 {
        self.iw_scheduler.beta()
    }

    /// Priority stored for slot `ix`.
    pub fn priority(&self, ix: usize) -> f64 {
        self.sum_tree.get(ix)
    }

    /// The underlying sum tree.
    pub fn sum_tree(&self) -> &SumTree {
        &self.sum_tree
    }

    /// Adds a transition.
    ///
    /// # Errors
    ///
    /// Fails if the number of extra fields or a vector dimension differs from
    /// the first transition added since the last [`clear`](Self::clear).
    pub fn add(
        &mut self,
        state: &[f32],
        action: &[f32],
        reward: f32,
        next_state: &[f32],
        done: bool,
        extra: &[f32],
    ) -> Result<()> {
        self.push(Transition {
            state: state.to_vec(),
            action: action.to_vec(),
            reward,
            next_state: next_state.to_vec(),
            done,
            extra: extra.to_vec(),
        })
    }

    /// Adds a transition given as a [`Transition`].
    ///
    /// The dimensions are fixed by the first transition that is accepted.
    pub fn push(&mut self, tr: Transition) -> Result<()> {
        let (columns, first) = match self.columns.take() {
            Some(columns) => (columns, false),
            None => {
                let (o, a, e) = (tr.state.len(), tr.action.len(), tr.extra.len());
                (Columns::new(self.capacity, o, a, e), true)
            }
        };
        if let Err(e) = columns.check(&tr.state, &tr.action, &tr.next_state, &tr.extra) {
            if !first {
                self.columns = Some(columns);
            }
            return Err(e);
        }
        let columns = self.columns.insert(columns);
        columns.write(self.tree_pointer, &tr);

        let p = self.max_priority.powf(self.alpha);
        self.sum_tree.set(self.tree_pointer, p)?;

        self.tree_pointer = (self.tree_pointer + 1) % self.capacity;
        self.current_size = (self.current_size + 1).min(self.capacity);
        Ok(())
    }

    fn columns(&self) -> Result<&Columns> {
        match &self.columns {
            Some(columns) if self.current_size > 0 => Ok(columns),
            _ => Err(CaresError::EmptyBuffer.into()),
        }
    }

    /// Samples `min(batch_size, len)` transitions uniformly with replacement.
    pub fn sample_uniform(&mut self, batch_size: usize) -> Result<TransitionBatch> {
        self.columns()?;
        let batch_size = batch_size.min(self.current_size);
        let size = self.current_size;
        let ixs = (0..batch_size)
            .map(|_| self.rng.gen_range(0..size))
            .collect::<Vec<_>>();
        Ok(self.columns()?.gather(&ixs, None))
    }

    /// Samples `min(batch_size, len)` transitions proportionally to their priorities.
    ///
    /// The importance weight of sample $i$ is $w_i=(N P(i))^{-\beta}$,
    /// normalized by the largest weight in the batch. $\beta$ is advanced
    /// after every call.
    pub fn sample_priority(
        &mut self,
        batch_size: usize,
        stratified: bool,
    ) -> Result<TransitionBatch> {
        self.columns()?;
        let batch_size = batch_size.min(self.current_size);
        let ixs = if stratified {
            self.sum_tree.sample_stratified(batch_size, &mut self.rng)?
        } else {
            self.sum_tree.sample_simple(batch_size, &mut self.rng)?
        };

        let total = self.sum_tree.total();
        let n = self.current_size as f64;
        let beta = self.iw_scheduler.beta();
        let ws = ixs
            .iter()
            .map(|&ix| (n * self.sum_tree.get(ix) / total).powf(-beta))
            .collect::<Vec<_>>();
        let w_max = ws.iter().fold(f64::MIN, |m, &w| m.max(w));
        let ws = ws.iter().map(|w| (w / w_max) as f32).collect();

        self.iw_scheduler.step();
        trace!("beta = {}", self.iw_scheduler.beta());

        Ok(self.columns()?.gather(&ixs, Some(ws)))
    }

    /// Samples `min(batch_size, len)` transitions favouring low priorities.
    ///
    /// Stored priorities are inverted as `max_priority / (p + 1e-6)` and a
    /// stratified sample is drawn from a temporary tree over the inverted
    /// values. The returned weights are the inverted priorities of the
    /// sampled slots.
    pub fn sample_inverse_priority(&mut self, batch_size: usize) -> Result<TransitionBatch> {
        self.columns()?;
        let batch_size = batch_size.min(self.current_size);
        let size = self.current_size;
        let inverse = self.sum_tree.leaves()[..size]
            .iter()
            .map(|p| self.max_priority / (p + INVERSE_PRIORITY_EPS))
            .collect::<Vec<_>>();

        let mut inverse_tree = SumTree::new(self.capacity);
        inverse_tree.batch_set(&(0..size).collect::<Vec<_>>(), &inverse)?;
        let ixs = inverse_tree.sample_stratified(batch_size, &mut self.rng)?;
        let ws = ixs.iter().map(|&ix| inverse[ix] as f32).collect();

        Ok(self.columns()?.gather(&ixs, Some(ws)))
    }

    /// Writes new priorities for the given slots.
    ///
    /// Priorities are stored as given; callers apply their own exponent.
    /// `max_priority` is raised if any new value exceeds it.
    ///
    /// # Errors
    ///
    /// Fails with [`CaresError::IndexOutOfRange`] if an index does not refer
    /// to a stored transition. Slots not yet written keep priority 0.
    pub fn update_priorities(&mut self, indices: &[usize], priorities: &[f64]) -> Result<()> {
        if let Some(&index) = indices.iter().find(|&&ix| ix >= self.current_size) {
            return Err(CaresError::IndexOutOfRange {
                index,
                len: self.current_size,
            }
            .into());
        }
        self.sum_tree.batch_set(indices, priorities)?;
        let max = priorities.iter().fold(self.max_priority, |m, &p| m.max(p));
        if max > self.max_priority {
            debug!("max_priority: {} -> {}", self.max_priority, max);
            self.max_priority = max;
        }
        Ok(())
    }

    /// Returns all stored transitions in slot order and clears the buffer.
    pub fn flush(&mut self) -> Result<TransitionBatch> {
        let ixs = (0..self.current_size).collect::<Vec<_>>();
        let batch = self.columns()?.gather(&ixs, None);
        self.clear();
        Ok(batch)
    }

    /// Returns `true` if slot `i` holds a non-terminal transition whose
    /// successor is stored in slot `i + 1` (modulo capacity).
    fn has_successor(&self, columns: &Columns, i: usize) -> bool {
        if columns.done[i] != 0 {
            return false;
        }
        let next = (i + 1) % self.capacity;
        if self.current_size < self.capacity {
            next < self.current_size
        } else {
            // The newest transition is followed by the oldest one.
            next != self.tree_pointer
        }
    }

    /// Samples pairs of consecutive transitions without duplicates.
    ///
    /// Candidates are slots holding a non-terminal transition followed by a
    /// stored transition of the same trajectory.
    ///
    /// # Errors
    ///
    /// Fails with [`CaresError::InsufficientNonTerminal`] if there are fewer
    /// candidates than `min(batch_size, len)`.
    pub fn sample_consecutive(&mut self, batch_size: usize) -> Result<ConsecutiveBatch> {
        let columns = self.columns()?;
        let batch_size = batch_size.min(self.current_size);
        let candidates = (0..self.current_size)
            .filter(|&i| self.has_successor(columns, i))
            .collect::<Vec<_>>();
        if candidates.len() < batch_size {
            return Err(CaresError::InsufficientNonTerminal {
                requested: batch_size,
                available: candidates.len(),
            }
            .into());
        }

        let ixs = index::sample(&mut self.rng, candidates.len(), batch_size)
            .into_iter()
            .map(|k| candidates[k])
            .collect::<Vec<_>>();
        let next_ixs = ixs
            .iter()
            .map(|i| (i + 1) % self.capacity)
            .collect::<Vec<_>>();

        let columns = self.columns()?;
        Ok(ConsecutiveBatch {
            current: columns.gather(&ixs, None),
            next: columns.gather(&next_ixs, None),
        })
    }

    /// Per-feature statistics of states and state deltas over stored transitions.
    pub fn get_statistics(&self) -> Result<Statistics> {
        let columns = self.columns()?;
        let n = self.current_size;
        let d = columns.obs_dim;
        Ok(Statistics::from_rows(
            &columns.state[..n * d],
            &columns.next_state[..n * d],
            n,
            d,
        ))
    }

    /// Removes all transitions and resets priorities and $\beta$.
    pub fn clear(&mut self) {
        self.tree_pointer = 0;
        self.current_size = 0;
        self.columns = None;
        self.sum_tree = SumTree::new(self.capacity);
        self.max_priority = 1.0;
        self.iw_scheduler.reset();
    }
}
