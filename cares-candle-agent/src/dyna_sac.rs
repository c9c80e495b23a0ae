//! Dyna SAC with uncertainty-weighted synthetic transitions.
mod base;
mod config;
mod reward;
mod uncertainty;
pub use base::DynaSacNsIw;
pub use config::{DynaSacConfig, RewardSource};
pub use reward::{copy_goal, gripper_reward};
pub use uncertainty::{inverse_variance_weights, total_variance, WEIGHT_FLOOR};
