//! Configuration of [`RolloutBuffer`](super::RolloutBuffer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`RolloutBuffer`](super::RolloutBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RolloutBufferConfig {
    /// The rollout horizon `H`.
    pub num_steps: usize,

    /// The number of parallel environments `N`.
    pub num_envs: usize,
}

impl Default for RolloutBufferConfig {
    fn default() -> Self {
        Self {
            num_steps: 128,
            num_envs: 1,
        }
    }
}

impl RolloutBufferConfig {
    /// Sets the rollout horizon.
    pub fn num_steps(mut self, v: usize) -> Self {
        self.num_steps = v;
        self
    }

    /// Sets the number of parallel environments.
    pub fn num_envs(mut self, v: usize) -> Self {
        self.num_envs = v;
        self
    }

    /// Constructs [`RolloutBufferConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RolloutBufferConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
