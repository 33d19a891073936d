//! Attack configuration.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Perturbation optimization strategy.
///
/// Serialized as the numeric index used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AttackStrategy {
    /// No attack; evaluation runs on clean observations.
    Clean,

    /// Gradient accumulation over clean trajectories.
    Uap,

    /// Value-weighted gradients with iterative normalized updates.
    RewardUap,

    /// Discounted per-episode gradients gated by episode success.
    TrajectoryUap,
}

impl TryFrom<u8> for AttackStrategy {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Clean),
            1 => Ok(Self::Uap),
            2 => Ok(Self::RewardUap),
            3 => Ok(Self::TrajectoryUap),
            _ => Err(format!("unknown attack strategy index {}", v)),
        }
    }
}

impl From<AttackStrategy> for u8 {
    fn from(s: AttackStrategy) -> u8 {
        match s {
            AttackStrategy::Clean => 0,
            AttackStrategy::Uap => 1,
            AttackStrategy::RewardUap => 2,
            AttackStrategy::TrajectoryUap => 3,
        }
    }
}

impl AttackStrategy {
    /// Short name used in result directories.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Uap => "uap",
            Self::RewardUap => "reward_uap",
            Self::TrajectoryUap => "traj_uap",
        }
    }
}

/// Configuration of [`UapOptimizer`](super::UapOptimizer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct AttackConfig {
    /// Strategy used to optimize the perturbation.
    pub strategy: AttackStrategy,

    /// Number of update rounds (iterative strategies), or a factor of the
    /// trajectory count for [`AttackStrategy::Uap`].
    pub update_num: usize,

    /// Trajectories collected per round.
    pub traj_num_each: usize,

    /// Attack budget: bound of the per-sensor noise norm, before sensor
    /// scaling.
    pub eta: f64,

    /// Discount of the per-episode gradient accumulator
    /// ([`AttackStrategy::TrajectoryUap`] only).
    pub gamma: f64,

    /// Per-sensor value ranges entering the budget scaling of image-like
    /// sensors. Sensors not listed use a range of `1.0`.
    pub sensor_ranges: BTreeMap<String, f64>,

    /// Seed of the action-sampling RNG.
    pub seed: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            strategy: AttackStrategy::Clean,
            update_num: 10,
            traj_num_each: 5,
            eta: 0.1,
            gamma: 0.99,
            sensor_ranges: BTreeMap::new(),
            seed: 42,
        }
    }
}

impl AttackConfig {
    /// Sets the strategy.
    pub fn strategy(mut self, v: AttackStrategy) -> Self {
        self.strategy = v;
        self
    }

    /// Sets the number of update rounds.
    pub fn update_num(mut self, v: usize) -> Self {
        self.update_num = v;
        self
    }

    /// Sets the number of trajectories per round.
    pub fn traj_num_each(mut self, v: usize) -> Self {
        self.traj_num_each = v;
        self
    }

    /// Sets the attack budget.
    pub fn eta(mut self, v: f64) -> Self {
        self.eta = v;
        self
    }

    /// Sets the value range of a sensor.
    pub fn sensor_range(mut self, sensor: impl Into<String>, range: f64) -> Self {
        self.sensor_ranges.insert(sensor.into(), range);
        self
    }

    /// Constructs [`AttackConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`AttackConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_roundtrips_through_index() {
        for i in 0..4u8 {
            let s = AttackStrategy::try_from(i).unwrap();
            assert_eq!(u8::from(s), i);
        }
        assert!(AttackStrategy::try_from(4).is_err());
    }

    #[test]
    fn strategy_serializes_as_number() {
        let yaml = serde_yaml::to_string(&AttackStrategy::RewardUap).unwrap();
        let n: u8 = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(n, 2);
        let s: AttackStrategy = serde_yaml::from_str("2").unwrap();
        assert_eq!(s, AttackStrategy::RewardUap);
    }
}
