use crate::util::{InDim, OutDim};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`](super::Mlp) and [`Mlp2`](super::Mlp2).
///
/// `in_dim` and `out_dim` may be omitted in YAML files when they are filled
/// in from the environment dimensions.
pub struct MlpConfig {
    #[serde(default)]
    pub(super) in_dim: usize,
    pub(super) units: Vec<usize>,
    #[serde(default)]
    pub(super) out_dim: usize,
    #[serde(default)]
    pub(super) activation_out: bool,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    ///
    /// * `activation_out` - If `true`, activation function is added in the final layer.
    pub fn new(in_dim: usize, units: Vec<usize>, out_dim: usize, activation_out: bool) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation_out,
        }
    }

    /// Input dimension.
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Hidden units.
    pub fn units(&self) -> &[usize] {
        &self.units
    }
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self::new(0, vec![256, 256], 0, false)
    }
}

impl OutDim for MlpConfig {
    fn get_out_dim(&self) -> usize {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: usize) {
        self.out_dim = out_dim;
    }
}

impl InDim for MlpConfig {
    fn set_in_dim(&mut self, in_dim: usize) {
        self.in_dim = in_dim;
    }
}
