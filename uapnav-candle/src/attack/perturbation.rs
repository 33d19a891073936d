//! The perturbation container and the policy wrapper applying it.
use crate::{obs::SensorObs, util::l2_norm};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use uapnav_core::{
    record::{Record, RecordValue},
    Env, Policy,
};

/// Budget scale of a sensor: image-like sensors scale with their value range
/// and the product of the two trailing frame dimensions (width and
/// channels), vector sensors do not.
fn sensor_scale(name: &str, t: &Tensor, ranges: &BTreeMap<String, f64>) -> f64 {
    if t.rank() >= 3 {
        let range = ranges.get(name).copied().unwrap_or(1.0);
        let dims = t.dims();
        range * (dims[dims.len() - 2] * dims[dims.len() - 1]) as f64
    } else {
        1.0
    }
}

/// One additive noise tensor per sensor, shared across steps and episodes.
///
/// Noise tensors carry no batch dimension; they broadcast over the
/// environment batch when applied.
#[derive(Clone, Debug)]
pub struct UniversalPerturbation {
    noise: BTreeMap<String, Tensor>,
}

impl UniversalPerturbation {
    /// Zero noise shaped after the sensors of `obs`, batch dimension
    /// stripped.
    pub fn zeros_like(obs: &SensorObs) -> Result<Self> {
        let mut noise = BTreeMap::new();
        for (k, t) in obs.iter() {
            let dims = &t.dims()[1..];
            noise.insert(k.clone(), Tensor::zeros(dims, DType::F32, t.device())?);
        }
        Ok(Self { noise })
    }

    /// The noise tensor of sensor `name`.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.noise.get(name)
    }

    /// Iterates over `(sensor, noise)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.noise.iter()
    }

    /// Adds the noise to every sensor of `obs`.
    pub fn apply(&self, obs: &SensorObs) -> Result<SensorObs> {
        obs.map(|k, t| match self.noise.get(k) {
            Some(n) => Ok(t.broadcast_add(n)?),
            None => Ok(t.clone()),
        })
    }

    /// Accumulates `scale * grads` into the noise, sensor by sensor.
    pub fn add(&mut self, grads: &BTreeMap<String, Tensor>, scale: f64) -> Result<()> {
        for (k, g) in grads {
            if let Some(n) = self.noise.get_mut(k) {
                // Batched gradients are summed over the batch dimension.
                let g = if g.rank() == n.rank() + 1 {
                    g.sum(0)?
                } else {
                    g.clone()
                };
                *n = (n.clone() + (g * scale)?)?;
            }
        }
        Ok(())
    }

    /// Applies one normalized update: per sensor,
    /// `noise += grad / ||grad|| * alpha * scale`. Sensors with a zero
    /// gradient are left untouched.
    pub fn add_normalized(
        &mut self,
        grads: &BTreeMap<String, Tensor>,
        alpha: f64,
        ranges: &BTreeMap<String, f64>,
    ) -> Result<()> {
        for (k, g) in grads {
            if let Some(n) = self.noise.get_mut(k) {
                let norm = l2_norm(g)? as f64;
                if norm == 0.0 {
                    warn!("Zero gradient for sensor {:?}, skipping update", k);
                    continue;
                }
                let step = alpha * sensor_scale(k, g, ranges) / norm;
                *n = (n.clone() + (g * step)?)?;
            }
        }
        Ok(())
    }

    /// Renormalizes every sensor's noise to L2 norm `eta * scale`.
    /// All-zero sensors are skipped rather than divided by zero.
    pub fn project(&mut self, eta: f64, ranges: &BTreeMap<String, f64>) -> Result<()> {
        for (k, n) in self.noise.iter_mut() {
            let norm = l2_norm(n)? as f64;
            if norm == 0.0 {
                continue;
            }
            let budget = eta * sensor_scale(k, n, ranges);
            *n = (n.clone() * (budget / norm))?;
        }
        Ok(())
    }

    /// Per-sensor noise norms for logging.
    pub fn record(&self) -> Record {
        let mut record = Record::empty();
        for (k, n) in self.noise.iter() {
            let norm = l2_norm(n).unwrap_or(f32::NAN);
            record.insert(format!("noise_norm_{}", k), RecordValue::Scalar(norm));
        }
        record
    }

    /// Saves the noise tensors as a safetensors file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let tensors: HashMap<String, Tensor> =
            self.noise.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        candle_core::safetensors::save(&tensors, path.as_ref())?;
        info!("Saved perturbation to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads noise tensors from a safetensors file.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let tensors = candle_core::safetensors::load(path.as_ref(), device)?;
        info!("Loaded perturbation from {:?}", path.as_ref());
        Ok(Self {
            noise: tensors.into_iter().collect(),
        })
    }
}

/// A policy evaluated under a fixed perturbation.
///
/// Adds the noise to every observation before delegating to the wrapped
/// policy.
pub struct PerturbedPolicy<'a, P> {
    policy: &'a mut P,
    noise: &'a UniversalPerturbation,
}

impl<'a, P> PerturbedPolicy<'a, P> {
    /// Wraps `policy` so it observes `noise`-shifted observations.
    pub fn new(policy: &'a mut P, noise: &'a UniversalPerturbation) -> Self {
        Self { policy, noise }
    }
}

impl<E, P> Policy<E> for PerturbedPolicy<'_, P>
where
    E: Env<Obs = SensorObs>,
    P: Policy<E>,
{
    fn sample(&mut self, obs: &SensorObs) -> E::Act {
        let obs = self.noise.apply(obs).unwrap();
        self.policy.sample(&obs)
    }

    fn reset_state(&mut self, is_done: Option<&[i8]>) {
        self.policy.reset_state(is_done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs() -> Result<SensorObs> {
        let device = Device::Cpu;
        Ok(SensorObs::new(BTreeMap::from([
            (
                "depth".to_string(),
                Tensor::ones((2, 4, 4, 1), DType::F32, &device)?,
            ),
            (
                "pointgoal_with_gps_compass".to_string(),
                Tensor::zeros((2, 2), DType::F32, &device)?,
            ),
        ])))
    }

    #[test]
    fn zeros_strip_the_batch_dimension() -> Result<()> {
        let noise = UniversalPerturbation::zeros_like(&obs()?)?;
        assert_eq!(noise.get("depth").unwrap().dims(), &[4, 4, 1]);
        assert_eq!(noise.get("pointgoal_with_gps_compass").unwrap().dims(), &[2]);
        Ok(())
    }

    #[test]
    fn apply_broadcasts_over_the_batch() -> Result<()> {
        let obs = obs()?;
        let mut noise = UniversalPerturbation::zeros_like(&obs)?;
        let g = BTreeMap::from([(
            "depth".to_string(),
            Tensor::ones((4, 4, 1), DType::F32, &Device::Cpu)?,
        )]);
        noise.add(&g, 0.5)?;
        let shifted = noise.apply(&obs)?;
        let v = shifted.get("depth").unwrap().flatten_all()?.to_vec1::<f32>()?;
        assert!(v.iter().all(|&x| (x - 1.5).abs() < 1e-6));
        // The goal sensor stays untouched by a zero noise.
        let goal = shifted
            .get("pointgoal_with_gps_compass")
            .unwrap()
            .flatten_all()?
            .to_vec1::<f32>()?;
        assert!(goal.iter().all(|&x| x == 0.0));
        Ok(())
    }

    #[test]
    fn projection_respects_the_budget() -> Result<()> {
        let obs = obs()?;
        let mut noise = UniversalPerturbation::zeros_like(&obs)?;
        let g = BTreeMap::from([(
            "pointgoal_with_gps_compass".to_string(),
            Tensor::from_slice(&[3.0f32, 4.0], (2,), &Device::Cpu)?,
        )]);
        noise.add(&g, 1.0)?;
        // Vector sensors have unit scale: the budget is eta itself.
        noise.project(1.0, &BTreeMap::new())?;
        let n = noise.get("pointgoal_with_gps_compass").unwrap();
        assert!((l2_norm(n)? - 1.0).abs() < 1e-5);

        // A zero-norm sensor is skipped rather than divided by zero.
        noise.project(1.0, &BTreeMap::new())?;
        assert_eq!(l2_norm(noise.get("depth").unwrap())?, 0.0);
        Ok(())
    }

    #[test]
    fn projection_renormalizes_below_budget_noise() -> Result<()> {
        let obs = obs()?;
        let mut noise = UniversalPerturbation::zeros_like(&obs)?;
        let g = BTreeMap::from([(
            "pointgoal_with_gps_compass".to_string(),
            Tensor::from_slice(&[0.3f32, 0.4], (2,), &Device::Cpu)?,
        )]);
        noise.add(&g, 1.0)?;
        // Norm 0.5 is pulled up to the budget, not left in place.
        noise.project(1.0, &BTreeMap::new())?;
        let n = noise.get("pointgoal_with_gps_compass").unwrap();
        assert!((l2_norm(n)? - 1.0).abs() < 1e-5);
        let v = n.to_vec1::<f32>()?;
        assert!((v[0] - 0.6).abs() < 1e-5 && (v[1] - 0.8).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn image_budget_scales_with_trailing_dims_and_range() -> Result<()> {
        let obs = obs()?;
        let mut noise = UniversalPerturbation::zeros_like(&obs)?;
        let g = BTreeMap::from([(
            "depth".to_string(),
            (Tensor::ones((4, 4, 1), DType::F32, &Device::Cpu)? * 1e6)?,
        )]);
        noise.add(&g, 1.0)?;
        let ranges = BTreeMap::from([("depth".to_string(), 2.0)]);
        noise.project(0.5, &ranges)?;
        // Budget: 0.5 * 2.0 * (4 wide * 1 channel) = 4.
        let n = l2_norm(noise.get("depth").unwrap())?;
        assert!((n - 4.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn save_and_load_roundtrip() -> Result<()> {
        use tempdir::TempDir;
        let dir = TempDir::new("uap")?;
        let path = dir.path().join("noise.safetensors");
        let obs = obs()?;
        let mut noise = UniversalPerturbation::zeros_like(&obs)?;
        let g = BTreeMap::from([(
            "pointgoal_with_gps_compass".to_string(),
            Tensor::from_slice(&[1.0f32, -2.0], (2,), &Device::Cpu)?,
        )]);
        noise.add(&g, 1.0)?;
        noise.save(&path)?;
        let loaded = UniversalPerturbation::load(&path, &Device::Cpu)?;
        let v = loaded
            .get("pointgoal_with_gps_compass")
            .unwrap()
            .to_vec1::<f32>()?;
        assert_eq!(v, vec![1.0, -2.0]);
        Ok(())
    }
}
