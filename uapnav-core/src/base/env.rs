//! Environment.
use super::{Act, Info, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// A vectorized environment stepping `N` episodes in lockstep.
///
/// Environment slots auto-reset: when slot `i` finishes an episode during
/// [`Env::step`], the returned observation for that slot already belongs to
/// the next episode and the done flags mark the boundary. Callers that need
/// the terminal metrics of the finished episode read them from the step's
/// [`Info`].
pub trait Env {
    /// Configuration.
    type Config: Clone;

    /// Observation batch emitted by the environment.
    type Obs: Obs;

    /// Action batch accepted by the environment.
    type Act: Act;

    /// Additional per-step information, including episode metrics.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Returns the number of parallel environment slots.
    fn num_envs(&self) -> usize;

    /// Performs one step in every slot.
    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record)
    where
        Self: Sized;

    /// Starts fresh episodes in all slots.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Starts fresh episodes, deriving episode seeds from `ix`.
    ///
    /// Used for deterministic evaluation: the same index always produces the
    /// same episode set.
    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs>;
}
