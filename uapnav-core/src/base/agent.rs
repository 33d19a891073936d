//! Agent.
use super::{Env, Policy};
use crate::record::Record;
use anyhow::Result;
use std::path::Path;

/// A trainable policy on an environment.
///
/// `R` is the rollout buffer type the agent optimizes from.
pub trait Agent<E: Env, R>: Policy<E> {
    /// Sets the policy to training mode.
    fn train(&mut self);

    /// Sets the policy to evaluation mode.
    fn eval(&mut self);

    /// Returns `true` in training mode.
    fn is_train(&self) -> bool;

    /// Performs an optimization step.
    fn opt(&mut self, buffer: &mut R) -> Result<()> {
        let _ = self.opt_with_record(buffer)?;
        Ok(())
    }

    /// Performs an optimization step and returns loss statistics.
    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record>;

    /// Saves the parameters of the agent in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}

/// An on-policy agent that drives rollout collection itself.
///
/// The trainer alternates [`RolloutAgent::rollout_step`] until the buffer is
/// full with one [`Agent::opt_with_record`], which is expected to consume
/// the rollout (compute returns, update, then cycle the buffer).
pub trait RolloutAgent<E: Env, R>: Agent<E, R> {
    /// Performs one vectorized environment step and records it into `buffer`.
    ///
    /// On the first call the agent resets `env` and seeds the buffer's
    /// initial slot.
    fn rollout_step(&mut self, env: &mut E, buffer: &mut R) -> Result<Record>;
}
