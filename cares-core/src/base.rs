//! Core interfaces.
mod agent;
pub use agent::{checkpoint_path, Agent};
