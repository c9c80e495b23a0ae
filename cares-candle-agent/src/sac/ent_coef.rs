//! Entropy coefficient of SAC.
use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, path::Path};

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),

    /// Automatic tuning given `(target_entropy, learning_rate)`.
    Auto(f64, f64),

    /// Automatic tuning with target entropy `-action_dim` given the learning rate.
    AutoActionDim(f64),
}

impl Default for EntCoefMode {
    fn default() -> Self {
        Self::AutoActionDim(0.0003)
    }
}

/// The entropy coefficient of SAC.
///
/// With automatic tuning, $\log\alpha$ starts at 0 and is trained with the loss
/// $-\log\alpha\,(\log\pi + \bar{H})$, where $\bar{H}$ is the target entropy.
pub struct EntCoef {
    varmap: VarMap,
    log_alpha: Tensor,
    target_entropy: Option<f64>,
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    pub fn new(mode: EntCoefMode, act_dim: usize, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let (log_alpha, target_entropy, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                let init = Init::Const(alpha.ln());
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                (log_alpha, None, None)
            }
            EntCoefMode::Auto(target_entropy, learning_rate) => {
                let init = Init::Const(0.0);
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                let opt = OptimizerConfig::default()
                    .learning_rate(learning_rate)
                    .build(varmap.all_vars())?;
                (log_alpha, Some(target_entropy), Some(opt))
            }
            EntCoefMode::AutoActionDim(learning_rate) => {
                return Self::new(
                    EntCoefMode::Auto(-(act_dim as f64), learning_rate),
                    act_dim,
                    device,
                );
            }
        };

        Ok(Self {
            varmap,
            log_alpha,
            opt,
            target_entropy,
        })
    }

    /// Returns the entropy coefficient, a tensor of shape `[1]`.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_alpha.detach().exp()?)
    }

    /// Returns the entropy coefficient as a scalar.
    pub fn alpha_scalar(&self) -> Result<f32> {
        Ok(self.alpha()?.to_vec1::<f32>()?[0])
    }

    /// Update the parameter given log probabilities of sampled actions.
    ///
    /// Returns the loss, or `None` when the coefficient is fixed.
    pub fn update(&mut self, logp: &Tensor) -> Result<Option<f32>> {
        match (&self.target_entropy, &mut self.opt) {
            (Some(target_entropy), Some(opt)) => {
                let target_entropy = Tensor::try_from(*target_entropy as f32)?.to_device(logp.device())?;
                let loss = {
                    let tmp = self
                        .log_alpha
                        .broadcast_mul(&logp.broadcast_add(&target_entropy)?.detach())?;
                    (tmp * -1f64)?.mean_all()?
                };
                opt.backward_step(&loss)?;
                Ok(Some(loss.to_scalar::<f32>()?))
            }
            _ => Ok(None),
        }
    }

    /// Save the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save entropy coefficient to {:?}", path.as_ref());
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load entropy coefficient from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Fix(0.2), 2, Device::Cpu)?;
        assert!((ent_coef.alpha_scalar()? - 0.2).abs() < 1e-6);
        let logp = Tensor::from_slice(&[-1f32, -2.0], (2,), &Device::Cpu)?;
        assert_eq!(ent_coef.update(&logp)?, None);
        assert!((ent_coef.alpha_scalar()? - 0.2).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_auto_decreases_alpha_above_target() -> Result<()> {
        // Entropy far above the target -2 pushes alpha down.
        let mut ent_coef = EntCoef::new(EntCoefMode::AutoActionDim(0.01), 2, Device::Cpu)?;
        assert!((ent_coef.alpha_scalar()? - 1.0).abs() < 1e-6);
        let logp = Tensor::from_slice(&[-10f32, -10.0], (2,), &Device::Cpu)?;
        for _ in 0..10 {
            ent_coef.update(&logp)?;
        }
        assert!(ent_coef.alpha_scalar()? < 1.0);
        Ok(())
    }
}
