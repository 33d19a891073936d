#![warn(missing_docs)]
//! Core abstractions of the uapnav workspace.
//!
//! This crate is backend-free: it defines the environment, policy and agent
//! traits, the fixed-horizon rollout buffer used for on-policy optimization
//! and perturbation estimation, an episode evaluator, and the record types
//! through which metrics flow. Tensor-backed implementations of the storage
//! and policy seams live in `uapnav-candle`.
pub mod error;
pub mod record;

mod base;
pub use base::{Act, Agent, Configurable, Env, Info, Obs, Policy, RolloutAgent, Step};

mod rollout_buffer;
pub use rollout_buffer::{
    BatchStore, RolloutBuffer, RolloutBufferBase, RolloutBufferConfig, VecStore,
};

mod evaluator;
pub use evaluator::{EpisodeEvaluator, EpisodeStats, Evaluator};

mod trainer;
pub use trainer::{OnPolicyTrainer, OnPolicyTrainerConfig};
