//! SAC with loss-adjusted approximate actor prioritization (LA3P).
mod base;
mod config;
mod loss;
pub use base::La3pSac;
pub use config::La3pSacConfig;
pub use loss::{huber, priorities, prioritized_approximate_loss};
