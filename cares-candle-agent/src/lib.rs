//! RL agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! * [`dyna_sac::DynaSacNsIw`] - Dyna SAC training on real transitions and on
//!   rollouts of a learned ensemble weighted by the inverse variance of their
//!   bootstrapped targets.
//! * [`la3p_sac::La3pSac`] - SAC with loss-adjusted approximate actor
//!   prioritization over a [`PrioritizedReplayBuffer`].
//!
//! Agents implement [`cares_core::Agent`] and can be constructed by name
//! with [`registry::Registry`].
//!
//! [`PrioritizedReplayBuffer`]: cares_core::PrioritizedReplayBuffer
pub mod dyna_sac;
pub mod la3p_sac;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod registry;
pub mod sac;
mod tensor_batch;
pub mod util;
pub mod world_model;
use serde::{Deserialize, Serialize};
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU device with the given ordinal.
    Cuda(usize),
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
