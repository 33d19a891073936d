//! Observation and action types shared by the agent and the environment.
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use std::collections::BTreeMap;
use uapnav_core::{Act, Obs};

/// A batched multi-sensor observation.
///
/// Maps sensor names to tensors whose first dimension is the number of
/// parallel environments. Image-like sensors are stored channel-last
/// (`[N, H, W, C]`, `f32`), vector sensors as `[N, D]`.
#[derive(Clone, Debug)]
pub struct SensorObs(BTreeMap<String, Tensor>);

impl SensorObs {
    /// Constructs an observation from sensor tensors.
    pub fn new(sensors: BTreeMap<String, Tensor>) -> Self {
        Self(sensors)
    }

    /// The tensor of sensor `name`.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.0.get(name)
    }

    /// Like [`SensorObs::get`], but failing with the sensor name.
    pub fn sensor(&self, name: &str) -> Result<&Tensor> {
        self.0
            .get(name)
            .with_context(|| format!("observation has no sensor {:?}", name))
    }

    /// Iterates over `(name, tensor)` pairs in sensor-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.0.iter()
    }

    /// Sensor names in order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Applies `f` to every sensor tensor.
    pub fn map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&str, &Tensor) -> Result<Tensor>,
    {
        let mut out = BTreeMap::new();
        for (k, v) in self.0.iter() {
            out.insert(k.clone(), f(k, v)?);
        }
        Ok(Self(out))
    }

    /// Detaches every sensor tensor from the computation graph.
    pub fn detach(&self) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), v.detach())).collect())
    }
}

impl Obs for SensorObs {
    /// The number of parallel environments in the batch.
    fn len(&self) -> usize {
        self.0
            .values()
            .next()
            .map(|t| t.dims()[0])
            .unwrap_or(0)
    }
}

/// A batch of discrete actions, one index per environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscreteAct(pub Vec<i64>);

impl DiscreteAct {
    /// Converts to an `i64` tensor of shape `[N]`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(&self.0[..], (self.0.len(),), device)?)
    }

    /// Constructs from a tensor of action indices.
    pub fn from_tensor(t: &Tensor) -> Result<Self> {
        Ok(Self(t.flatten_all()?.to_dtype(DType::I64)?.to_vec1()?))
    }
}

impl Act for DiscreteAct {
    fn len(&self) -> usize {
        self.0.len()
    }
}
