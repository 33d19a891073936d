//! Policy.
use super::Env;
use anyhow::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

/// A policy on an environment.
///
/// The mapping from observation batch to action batch can be deterministic
/// or stochastic. Recurrent policies keep their hidden state internally and
/// clear it per slot through [`Policy::reset_state`].
pub trait Policy<E: Env> {
    /// Samples an action batch given an observation batch.
    fn sample(&mut self, obs: &E::Obs) -> E::Act;

    /// Clears recurrent state for slots where `is_done[i] == 1`, or for all
    /// slots when `is_done` is `None`. Memoryless policies ignore this.
    fn reset_state(&mut self, is_done: Option<&[i8]>) {
        let _ = is_done;
    }
}

/// A configurable object.
pub trait Configurable {
    /// Configuration.
    type Config: Clone + DeserializeOwned;

    /// Builds the object.
    fn build(config: Self::Config) -> Self;

    /// Builds the object from the YAML configuration at the given path.
    fn build_from_path(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: Sized,
    {
        let file = std::fs::File::open(path)?;
        let rdr = std::io::BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Ok(Self::build(config))
    }
}
