//! Tensor helpers for categorical policies.
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::ops::{log_softmax, softmax};
use rand::{rngs::SmallRng, Rng};

/// Samples one action index per row from a `[N, A]` logits tensor.
pub fn sample_categorical(logits: &Tensor, rng: &mut SmallRng) -> Result<Vec<i64>> {
    let probs = softmax(&logits.detach(), D::Minus1)?.to_vec2::<f32>()?;
    let mut actions = Vec::with_capacity(probs.len());
    for row in probs {
        let u: f32 = rng.gen();
        let mut cum = 0.0;
        let mut a = row.len() - 1;
        for (i, p) in row.iter().enumerate() {
            cum += p;
            if u < cum {
                a = i;
                break;
            }
        }
        actions.push(a as i64);
    }
    Ok(actions)
}

/// Greedy action indices from a `[N, A]` logits tensor.
pub fn greedy(logits: &Tensor) -> Result<Vec<i64>> {
    Ok(logits
        .detach()
        .argmax(D::Minus1)?
        .to_dtype(candle_core::DType::I64)?
        .to_vec1()?)
}

/// Log-probabilities of the chosen actions.
///
/// `logits` is `[N, A]`, `actions` an `i64` tensor of shape `[N]`; the result
/// is `[N]` and stays differentiable w.r.t. `logits`.
pub fn action_log_probs(logits: &Tensor, actions: &Tensor) -> Result<Tensor> {
    let logp = log_softmax(logits, D::Minus1)?;
    Ok(logp
        .gather(&actions.unsqueeze(D::Minus1)?, D::Minus1)?
        .squeeze(D::Minus1)?)
}

/// Mean entropy of the categorical distributions in a `[N, A]` logits tensor.
pub fn entropy(logits: &Tensor) -> Result<Tensor> {
    let logp = log_softmax(logits, D::Minus1)?;
    let p = logp.exp()?;
    Ok((p * logp)?.sum(D::Minus1)?.neg()?.mean_all()?)
}

/// Converts per-environment episode-active masks to a `[N]` `f32` tensor.
pub fn masks_to_tensor(masks: &[bool], device: &Device) -> Result<Tensor> {
    let v: Vec<f32> = masks.iter().map(|&m| m as u8 as f32).collect();
    Ok(Tensor::from_slice(&v[..], (v.len(),), device)?)
}

/// L2 norm of a tensor as a scalar.
pub fn l2_norm(t: &Tensor) -> Result<f32> {
    Ok(t.sqr()?.sum_all()?.sqrt()?.to_vec0::<f32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sampling_respects_degenerate_distributions() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(0);
        // Row 0 puts almost all mass on action 2, row 1 on action 0.
        let logits =
            Tensor::from_slice(&[-50.0f32, -50.0, 50.0, 50.0, -50.0, -50.0], (2, 3), &Device::Cpu)?;
        for _ in 0..10 {
            let a = sample_categorical(&logits, &mut rng)?;
            assert_eq!(a, vec![2, 0]);
        }
        assert_eq!(greedy(&logits)?, vec![2, 0]);
        Ok(())
    }

    #[test]
    fn log_probs_of_uniform_logits() -> Result<()> {
        let logits = Tensor::zeros((2, 4), candle_core::DType::F32, &Device::Cpu)?;
        let actions = Tensor::from_slice(&[1i64, 3], (2,), &Device::Cpu)?;
        let logp = action_log_probs(&logits, &actions)?.to_vec1::<f32>()?;
        for v in logp {
            assert!((v - (0.25f32).ln()).abs() < 1e-6);
        }
        let h = entropy(&logits)?.to_vec0::<f32>()?;
        assert!((h - (4f32).ln()).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn mask_tensor_matches_flags() -> Result<()> {
        let t = masks_to_tensor(&[true, false, true], &Device::Cpu)?;
        assert_eq!(t.to_vec1::<f32>()?, vec![1.0, 0.0, 1.0]);
        Ok(())
    }
}
