//! Goal-distance reward of gripper tasks.
//!
//! The last two features of a state are the goal position and the two
//! features before them are the object position.
use anyhow::Result;
use cares_core::CaresError;
use candle_core::{Tensor, D};

/// Reward of reaching the goal.
pub const GOAL_REWARD: f64 = 800.0;

/// Distance within which the goal is reached.
pub const GOAL_DISTANCE: f64 = 10.0;

/// Distance beyond which the reward is zero.
pub const MAX_DISTANCE: f64 = 70.0;

fn check_dim(states: &Tensor) -> Result<usize> {
    let dim = states.dims()[states.rank() - 1];
    if dim < 4 {
        return Err(CaresError::DimensionMismatch {
            field: "gripper state".to_string(),
            expected: 4,
            got: dim,
        }
        .into());
    }
    Ok(dim)
}

/// Returns `70 - d` where `d` is the distance between the goal in `states`
/// and the object in `next_states`; 800 if `d <= 10` and 0 if `d > 70`.
///
/// Inputs are `[batch_size, obs_dim]`, the output is `[batch_size]`.
pub fn gripper_reward(states: &Tensor, next_states: &Tensor) -> Result<Tensor> {
    let dim = check_dim(states)?;
    let goal = states.narrow(D::Minus1, dim - 2, 2)?;
    let object = next_states.narrow(D::Minus1, dim - 4, 2)?;
    let d = (goal - object)?.sqr()?.sum(D::Minus1)?.sqrt()?;

    let reward = (MAX_DISTANCE - &d)?;
    let reward = d
        .le(GOAL_DISTANCE)?
        .where_cond(&(d.ones_like()? * GOAL_REWARD)?, &reward)?;
    Ok(d.gt(MAX_DISTANCE)?.where_cond(&d.zeros_like()?, &reward)?)
}

/// Copies the goal of `states` into the last two features of `next_states`.
pub fn copy_goal(states: &Tensor, next_states: &Tensor) -> Result<Tensor> {
    let dim = check_dim(states)?;
    Ok(Tensor::cat(
        &[
            next_states.narrow(D::Minus1, 0, dim - 2)?,
            states.narrow(D::Minus1, dim - 2, 2)?,
        ],
        D::Minus1,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_gripper_reward() -> Result<()> {
        // Goal at the origin, objects at distances 5, 10, 30, 70 and 100.
        let states = Tensor::zeros((5, 4), candle_core::DType::F32, &Device::Cpu)?;
        let next_states = Tensor::from_slice(
            &[
                3f32, 4.0, 0.0, 0.0, //
                6.0, 8.0, 0.0, 0.0, //
                30.0, 0.0, 0.0, 0.0, //
                0.0, 70.0, 0.0, 0.0, //
                60.0, 80.0, 0.0, 0.0,
            ],
            (5, 4),
            &Device::Cpu,
        )?;
        let r = gripper_reward(&states, &next_states)?.to_vec1::<f32>()?;
        let expected = [800.0, 800.0, 40.0, 0.0, 0.0];
        for (r, e) in r.iter().zip(expected.iter()) {
            assert!((r - e).abs() < 1e-4, "{} != {}", r, e);
        }
        Ok(())
    }

    #[test]
    fn test_copy_goal() -> Result<()> {
        let states = Tensor::from_slice(&[0f32, 0.0, 0.0, 7.0, 8.0], (1, 5), &Device::Cpu)?;
        let next = Tensor::from_slice(&[1f32, 2.0, 3.0, 4.0, 5.0], (1, 5), &Device::Cpu)?;
        let next = copy_goal(&states, &next)?;
        assert_eq!(next.flatten_all()?.to_vec1::<f32>()?, vec![1.0, 2.0, 3.0, 7.0, 8.0]);

        let short = Tensor::zeros((1, 3), candle_core::DType::F32, &Device::Cpu)?;
        assert!(gripper_reward(&short, &short).is_err());
        Ok(())
    }
}
