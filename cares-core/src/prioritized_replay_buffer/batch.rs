//! Transitions and batches of transitions.
//!
//! Vector fields of a batch are stored row-major in flat vectors, e.g.
//! `state[i * obs_dim..(i + 1) * obs_dim]` is the state of the `i`-th sample.

/// A single transition `(state, action, reward, next_state, done, extra...)`.
///
/// `extra` holds additional scalar fields, such as the log-probability of the
/// action. Their number and order must be the same for every transition added
/// to a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation before the action.
    pub state: Vec<f32>,

    /// Action taken.
    pub action: Vec<f32>,

    /// Reward received.
    pub reward: f32,

    /// Observation after the action.
    pub next_state: Vec<f32>,

    /// Whether the episode terminated.
    pub done: bool,

    /// Additional scalar fields.
    pub extra: Vec<f32>,
}

/// A batch of transitions taken from a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch {
    /// Dimension of observations.
    pub obs_dim: usize,

    /// Dimension of actions.
    pub act_dim: usize,

    /// Number of extra fields per transition.
    pub n_extra: usize,

    /// States, `[len, obs_dim]`.
    pub state: Vec<f32>,

    /// Actions, `[len, act_dim]`.
    pub action: Vec<f32>,

    /// Rewards, `[len]`.
    pub reward: Vec<f32>,

    /// Next states, `[len, obs_dim]`.
    pub next_state: Vec<f32>,

    /// Termination flags, `[len]`.
    pub done: Vec<i8>,

    /// Extra fields, `[len, n_extra]`.
    pub extra: Vec<f32>,

    /// Buffer slots the samples were taken from.
    pub indices: Vec<usize>,

    /// Importance weights for prioritized sampling, inverse priorities for
    /// inverse-priority sampling, `None` otherwise.
    pub weights: Option<Vec<f32>>,
}

impl TransitionBatch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no sample.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Returns the `i`-th sample as a [`Transition`].
    pub fn transition(&self, i: usize) -> Transition {
        Transition {
            state: self.state[i * self.obs_dim..(i + 1) * self.obs_dim].to_vec(),
            action: self.action[i * self.act_dim..(i + 1) * self.act_dim].to_vec(),
            reward: self.reward[i],
            next_state: self.next_state[i * self.obs_dim..(i + 1) * self.obs_dim].to_vec(),
            done: self.done[i] != 0,
            extra: self.extra[i * self.n_extra..(i + 1) * self.n_extra].to_vec(),
        }
    }
}

/// Pairs of temporally consecutive transitions.
///
/// `next.transition(i)` is the transition stored right after
/// `current.transition(i)` in the same episode.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsecutiveBatch {
    /// Transitions at the sampled slots.
    pub current: TransitionBatch,

    /// Transitions at the slots following the sampled ones.
    pub next: TransitionBatch,
}

impl ConsecutiveBatch {
    /// Sampled slots of the first transition of each pair.
    pub fn indices(&self) -> &[usize] {
        &self.current.indices
    }
}
