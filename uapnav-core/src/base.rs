//! Core traits.
mod agent;
mod env;
mod policy;
mod step;

pub use agent::{Agent, RolloutAgent};
pub use env::Env;
pub use policy::{Configurable, Policy};
use std::fmt::Debug;
pub use step::{Info, Step};

/// A batch of observations, one per parallel environment.
///
/// All observations emitted by an [`Env`] keep a fixed environment count and
/// a fixed per-environment ordering; `len()` returns that count.
pub trait Obs: Clone + Debug {
    /// Returns the number of per-environment observations in the batch.
    fn len(&self) -> usize;

    /// Returns `true` if the batch holds no observations.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of actions, one per parallel environment.
pub trait Act: Clone + Debug {
    /// Returns the number of per-environment actions in the batch.
    fn len(&self) -> usize;
}
