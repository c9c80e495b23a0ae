//! Optimizers of the actor, the critics, the entropy coefficient and the world model.
use anyhow::Result;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};

/// Optimizer settings.
///
/// Omitted AdamW moments fall back to the defaults of [`ParamsAdamW`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam with default moments.
    Adam { lr: f64 },

    /// AdamW.
    AdamW {
        lr: f64,
        #[serde(default = "adamw::beta1")]
        beta1: f64,
        #[serde(default = "adamw::beta2")]
        beta2: f64,
        #[serde(default = "adamw::eps")]
        eps: f64,
        #[serde(default = "adamw::weight_decay")]
        weight_decay: f64,
    },
}

mod adamw {
    use candle_nn::ParamsAdamW;

    pub fn beta1() -> f64 {
        ParamsAdamW::default().beta1
    }

    pub fn beta2() -> f64 {
        ParamsAdamW::default().beta2
    }

    pub fn eps() -> f64 {
        ParamsAdamW::default().eps
    }

    pub fn weight_decay() -> f64 {
        ParamsAdamW::default().weight_decay
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 0.0003 }
    }
}

impl OptimizerConfig {
    /// Learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::Adam { lr } | Self::AdamW { lr, .. } => *lr,
        }
    }

    /// Replaces the learning rate, keeping the other settings.
    pub fn learning_rate(mut self, v: f64) -> Self {
        match &mut self {
            Self::Adam { lr } | Self::AdamW { lr, .. } => *lr = v,
        }
        self
    }

    /// Constructs an optimizer over `vars`.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        let opt = match *self {
            Self::Adam { lr } => {
                let params = ParamsAdam {
                    lr,
                    ..ParamsAdam::default()
                };
                Optimizer::Adam(Adam::new(vars, params)?)
            }
            Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr,
                    beta1,
                    beta2,
                    eps,
                    weight_decay,
                };
                Optimizer::AdamW(AdamW::new(vars, params)?)
            }
        };
        Ok(opt)
    }
}

/// An optimizer built from [`OptimizerConfig`].
pub enum Optimizer {
    Adam(Adam),
    AdamW(AdamW),
}

impl Optimizer {
    /// Computes the gradients of `loss` and updates the variables.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Self::Adam(opt) => opt.backward_step(loss)?,
            Self::AdamW(opt) => opt.backward_step(loss)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_partial_adamw_config() -> Result<()> {
        let config: OptimizerConfig = serde_yaml::from_str("AdamW:\n  lr: 0.01\n")?;
        let defaults = ParamsAdamW::default();
        match &config {
            OptimizerConfig::AdamW {
                beta1,
                weight_decay,
                ..
            } => {
                assert_eq!(*beta1, defaults.beta1);
                assert_eq!(*weight_decay, defaults.weight_decay);
            }
            _ => panic!("expected AdamW"),
        }
        assert_eq!(config.clone().learning_rate(0.5).lr(), 0.5);
        assert_eq!(OptimizerConfig::default().lr(), 0.0003);
        Ok(())
    }

    #[test]
    fn test_backward_step_decreases_loss() -> Result<()> {
        for config in [
            OptimizerConfig::Adam { lr: 0.1 },
            serde_yaml::from_str("AdamW:\n  lr: 0.1\n")?,
        ] {
            let x = Var::ones(3, DType::F32, &Device::Cpu)?;
            let mut opt = config.build(vec![x.clone()])?;
            let loss = |x: &Var| -> Result<Tensor> { Ok(x.as_tensor().sqr()?.sum_all()?) };
            let first = loss(&x)?.to_scalar::<f32>()?;
            for _ in 0..10 {
                opt.backward_step(&loss(&x)?)?;
            }
            assert!(loss(&x)?.to_scalar::<f32>()? < first);
        }
        Ok(())
    }
}
