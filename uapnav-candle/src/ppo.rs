//! PPO agent for recurrent navigation policies.
mod base;
mod config;
pub use base::Ppo;
pub use config::PpoConfig;

use crate::{ActStore, SensorStore, TensorStore};

/// Rollout buffer specialized to sensor observations, discrete actions and
/// tensor hidden states.
pub type NavRolloutBuffer = uapnav_core::RolloutBuffer<SensorStore, ActStore, TensorStore>;
