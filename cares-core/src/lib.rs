#![warn(missing_docs)]
//! Prioritized experience replay and agent interfaces for reinforcement learning.
//!
//! This crate has no tensor backend. Agents are implemented in
//! `cares-candle-agent`.
pub mod error;
pub mod prioritized_replay_buffer;
pub mod record;

mod base;
pub use base::{checkpoint_path, Agent};
pub use error::CaresError;
pub use prioritized_replay_buffer::{
    PrioritizedReplayBuffer, PrioritizedReplayBufferConfig, Statistics, SumTree, Transition,
    TransitionBatch,
};
