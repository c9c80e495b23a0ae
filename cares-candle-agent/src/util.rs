//! Utilities.
pub mod actor;
pub mod critic;
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use log::trace;

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    track_with_replace_substring(dest, src, tau, ("", ""))
}

/// Apply soft update on variables whose names differ by a substring.
///
/// The source of `dest` variable `k` is the variable of `src` named
/// `k.replace(ss_dest, ss_src)`. This is the only place where the parameters
/// of target networks are modified.
pub fn track_with_replace_substring(
    dest: &VarMap,
    src: &VarMap,
    tau: f64,
    (ss_src, ss_dest): (&str, &str),
) -> Result<()> {
    trace!("track: tau = {}", tau);
    let dest = dest.data().lock().map_err(|e| anyhow!("{}", e))?;
    let src = src.data().lock().map_err(|e| anyhow!("{}", e))?;

    for (k_dest, v_dest) in dest.iter() {
        let k_src = match ss_dest.is_empty() {
            true => k_dest.clone(),
            false => k_dest.replace(ss_dest, ss_src),
        };
        let v_src = src
            .get(&k_src)
            .ok_or_else(|| anyhow!("Variable {} is not found in the source", k_src))?;
        let t_dest = ((tau * v_src.as_tensor())? + ((1.0 - tau) * v_dest.as_tensor())?)?;
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: usize);
}

/// Interface for handling input dimensions.
pub trait InDim {
    /// Sets the input dimension.
    fn set_in_dim(&mut self, v: usize);
}

/// Creates a `[n, dim]` tensor from row-major data.
pub fn rows_to_tensor(data: &[f32], dim: usize, device: &Device) -> Result<Tensor> {
    let n = if dim == 0 { 0 } else { data.len() / dim };
    Ok(Tensor::from_slice(data, (n, dim), device)?)
}

/// Creates a 1-dimensional tensor.
pub fn vec_to_tensor(data: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(data, (data.len(),), device)?)
}

/// Repeats every row `n` times in place, `[a, b] -> [a, a, b, b]` for `n = 2`.
pub fn repeat_interleave(xs: &Tensor, n: usize) -> Result<Tensor> {
    let batch_size = xs.dims()[0];
    let ixs = (0..batch_size as u32)
        .flat_map(|i| std::iter::repeat(i).take(n))
        .collect::<Vec<_>>();
    let ixs = Tensor::from_vec(ixs, (batch_size * n,), xs.device())?;
    Ok(xs.index_select(&ixs, 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;

    fn varmap_with(name: &str, t: &Tensor) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((3,), name, init, DType::F32, &Device::Cpu)?;
        vm.data().lock().unwrap().get(name).unwrap().set(t)?;
        Ok(vm)
    }

    fn get(vm: &VarMap, name: &str) -> Tensor {
        vm.data().lock().unwrap().get(name).unwrap().as_tensor().clone()
    }

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let t_src = Tensor::from_slice(&[1.0f32, 2.0, 3.0], (3,), &Device::Cpu)?;
        let t_dest = Tensor::from_slice(&[4.0f32, 5.0, 6.0], (3,), &Device::Cpu)?;
        let t = ((tau * &t_src)? + ((1.0 - tau) * &t_dest)?)?;

        let vm_src = varmap_with("var1", &t_src)?;
        let vm_dest = varmap_with("var1", &t_dest)?;
        track(&vm_dest, &vm_src, tau)?;

        let t_ = get(&vm_dest, "var1");
        assert!((t - t_)?.abs()?.sum(0)?.to_scalar::<f32>()? < 1e-6);
        Ok(())
    }

    #[test]
    fn test_track_with_replace_substring() -> Result<()> {
        let t_src = Tensor::from_slice(&[1.0f32, 2.0, 3.0], (3,), &Device::Cpu)?;
        let t_dest = Tensor::from_slice(&[0.0f32, 0.0, 0.0], (3,), &Device::Cpu)?;
        let vm_src = varmap_with("critic0.w", &t_src)?;
        let vm_dest = varmap_with("critic_tgt0.w", &t_dest)?;

        track_with_replace_substring(&vm_dest, &vm_src, 1.0, ("critic", "critic_tgt"))?;
        assert_eq!(get(&vm_dest, "critic_tgt0.w").to_vec1::<f32>()?, vec![1.0, 2.0, 3.0]);

        // Names that cannot be resolved are reported.
        assert!(track(&vm_dest, &vm_src, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_repeat_interleave() -> Result<()> {
        let xs = Tensor::from_slice(&[1f32, 2.0, 3.0, 4.0], (2, 2), &Device::Cpu)?;
        let ys = repeat_interleave(&xs, 3)?;
        assert_eq!(ys.dims(), [6, 2]);
        assert_eq!(
            ys.flatten_all()?.to_vec1::<f32>()?,
            vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0]
        );
        Ok(())
    }
}
