//! Training metrics returned by agents.
//!
//! An agent returns a [`Record`] from every training step. The training loop
//! decides how it is logged; the library only builds the key-value map.
//!
//! ```rust
//! use cares_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss_critic", 0.5);
//! record.insert("weights", RecordValue::Array1(vec![1.0, 0.5]));
//! let record = Record::empty().merge(record.with_prefix("uniform"));
//! assert_eq!(record.get_scalar("uniform/loss_critic").unwrap(), 0.5);
//! ```
mod base;

pub use base::{Record, RecordValue};
