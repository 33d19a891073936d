//! Configuration of [`OnPolicyTrainer`](super::OnPolicyTrainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`OnPolicyTrainer`](super::OnPolicyTrainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct OnPolicyTrainerConfig {
    /// The number of optimization updates.
    pub max_updates: usize,

    /// Interval of evaluation in updates.
    pub eval_interval: usize,

    /// Interval of saving model parameters in updates.
    pub save_interval: usize,

    /// Interval of flushing records in updates.
    pub flush_record_interval: usize,

    /// Directory where model parameters are saved.
    pub model_dir: Option<String>,
}

impl Default for OnPolicyTrainerConfig {
    fn default() -> Self {
        Self {
            max_updates: 0,
            eval_interval: 0,
            save_interval: 0,
            flush_record_interval: usize::MAX,
            model_dir: None,
        }
    }
}

impl OnPolicyTrainerConfig {
    /// Sets the number of optimization updates.
    pub fn max_updates(mut self, v: usize) -> Self {
        self.max_updates = v;
        self
    }

    /// Sets the interval of evaluation in updates.
    pub fn eval_interval(mut self, v: usize) -> Self {
        self.eval_interval = v;
        self
    }

    /// Sets the interval of saving in updates.
    pub fn save_interval(mut self, v: usize) -> Self {
        self.save_interval = v;
        self
    }

    /// Sets the interval of flushing records in updates.
    pub fn flush_record_interval(mut self, v: usize) -> Self {
        self.flush_record_interval = v;
        self
    }

    /// Sets the directory where model parameters are saved.
    pub fn model_dir<T: Into<String>>(mut self, model_dir: T) -> Self {
        self.model_dir = Some(model_dir.into());
        self
    }

    /// Constructs [`OnPolicyTrainerConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`OnPolicyTrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn config_roundtrips_through_yaml() -> Result<()> {
        let config = OnPolicyTrainerConfig::default()
            .max_updates(100)
            .eval_interval(10)
            .save_interval(50)
            .flush_record_interval(10)
            .model_dir("model");

        let dir = TempDir::new("on_policy_trainer")?;
        let path = dir.path().join("trainer.yaml");
        config.save(&path)?;
        let loaded = OnPolicyTrainerConfig::load(&path)?;
        assert_eq!(loaded, config);
        Ok(())
    }
}
