//! Configuration of [`Ppo`](super::Ppo).
use crate::{model::NavPolicyModelConfig, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Ppo`](super::Ppo).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PpoConfig {
    /// Configuration of the actor-critic model.
    pub model_config: NavPolicyModelConfig,

    /// Device on which the model lives.
    pub device: Device,

    /// Discount factor.
    pub gamma: f32,

    /// Uses generalized advantage estimation when `true`.
    pub use_gae: bool,

    /// GAE lambda.
    pub tau: f32,

    /// Clipping range of the probability ratio.
    pub clip_param: f32,

    /// Number of optimization epochs over one rollout.
    pub ppo_epoch: usize,

    /// Weight of the value loss.
    pub value_loss_coef: f32,

    /// Weight of the entropy bonus.
    pub entropy_coef: f32,

    /// Normalizes advantages over the rollout when `true`.
    pub normalize_advantage: bool,

    /// Takes the argmax action in evaluation mode when `true`; otherwise
    /// evaluation samples from the categorical distribution.
    pub deterministic_eval: bool,

    /// Seed of the action-sampling RNG.
    pub seed: u64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            model_config: NavPolicyModelConfig::default(),
            device: Device::Cpu,
            gamma: 0.99,
            use_gae: true,
            tau: 0.95,
            clip_param: 0.2,
            ppo_epoch: 4,
            value_loss_coef: 0.5,
            entropy_coef: 0.01,
            normalize_advantage: true,
            deterministic_eval: false,
            seed: 42,
        }
    }
}

impl PpoConfig {
    /// Sets the model configuration.
    pub fn model_config(mut self, v: NavPolicyModelConfig) -> Self {
        self.model_config = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the number of optimization epochs per rollout.
    pub fn ppo_epoch(mut self, v: usize) -> Self {
        self.ppo_epoch = v;
        self
    }

    /// Sets the clipping range.
    pub fn clip_param(mut self, v: f32) -> Self {
        self.clip_param = v;
        self
    }

    /// Sets the seed of the action-sampling RNG.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`PpoConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PpoConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
