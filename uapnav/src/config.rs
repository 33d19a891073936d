//! Experiment configuration tree and dotted-path overrides.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};
use uapnav_candle::{attack::AttackConfig, ppo::PpoConfig};
use uapnav_core::{OnPolicyTrainerConfig, RolloutBufferConfig};
use uapnav_pointnav_env::PointNavEnvConfig;

/// The full configuration of one experiment.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ExperimentConfig {
    /// Environment.
    pub env: PointNavEnvConfig,

    /// PPO agent.
    pub agent: PpoConfig,

    /// Rollout buffer.
    pub buffer: RolloutBufferConfig,

    /// Training loop.
    pub trainer: OnPolicyTrainerConfig,

    /// Perturbation attack.
    pub attack: AttackConfig,

    /// Number of evaluation episodes.
    pub eval_episodes: usize,

    /// Seed of the evaluation episode set.
    pub eval_seed: i64,

    /// Root directory for evaluation results.
    pub result_dir: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            env: PointNavEnvConfig::default(),
            agent: PpoConfig::default(),
            buffer: RolloutBufferConfig::default(),
            trainer: OnPolicyTrainerConfig::default(),
            attack: AttackConfig::default(),
            eval_episodes: 20,
            eval_seed: 0,
            result_dir: "results".to_string(),
        }
    }
}

impl ExperimentConfig {
    /// Constructs [`ExperimentConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("opening config {:?}", path.as_ref()))?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ExperimentConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    /// Applies `key.path=value` overrides, parsed as YAML scalars.
    ///
    /// Every path must already exist in the configuration tree; unknown keys
    /// are an error rather than silently ignored.
    pub fn with_overrides(self, overrides: &[String]) -> Result<Self> {
        if overrides.is_empty() {
            return Ok(self);
        }
        let mut root = serde_yaml::to_value(&self)?;
        for ov in overrides {
            let (path, raw) = ov
                .split_once('=')
                .with_context(|| format!("override {:?} is not of the form key=value", ov))?;
            let new: serde_yaml::Value = serde_yaml::from_str(raw)?;
            let mut node = &mut root;
            for key in path.split('.') {
                let key = serde_yaml::Value::String(key.to_string());
                node = match node {
                    serde_yaml::Value::Mapping(m) => match m.get_mut(&key) {
                        Some(v) => v,
                        None => bail!("unknown configuration key {:?} in override {:?}", key, ov),
                    },
                    _ => bail!("cannot index into a scalar with override {:?}", ov),
                };
            }
            *node = new;
        }
        Ok(serde_yaml::from_value(root)?)
    }

    /// The directory receiving the results of one attacked evaluation, named
    /// after the strategy and its budget parameters.
    pub fn result_dir(&self) -> PathBuf {
        PathBuf::from(&self.result_dir).join(format!(
            "{}_eta{}_u{}_t{}",
            self.attack.strategy.name(),
            self.attack.eta,
            self.attack.update_num,
            self.attack.traj_num_each
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uapnav_candle::attack::AttackStrategy;

    #[test]
    fn overrides_reach_nested_fields() -> Result<()> {
        let config = ExperimentConfig::default().with_overrides(&[
            "attack.strategy=3".to_string(),
            "attack.eta=0.25".to_string(),
            "agent.gamma=0.9".to_string(),
            "env.num_envs=8".to_string(),
        ])?;
        assert_eq!(config.attack.strategy, AttackStrategy::TrajectoryUap);
        assert_eq!(config.attack.eta, 0.25);
        assert_eq!(config.agent.gamma, 0.9);
        assert_eq!(config.env.num_envs, 8);
        Ok(())
    }

    #[test]
    fn unknown_override_keys_are_rejected() {
        let err = ExperimentConfig::default()
            .with_overrides(&["attack.nonexistent=1".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn config_roundtrips_through_yaml() -> Result<()> {
        use tempdir::TempDir;
        let dir = TempDir::new("experiment_config")?;
        let path = dir.path().join("config.yaml");
        let config = ExperimentConfig::default()
            .with_overrides(&["attack.strategy=2".to_string()])?;
        config.save(&path)?;
        assert_eq!(ExperimentConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn result_dir_encodes_the_attack_parameters() {
        let config = ExperimentConfig::default()
            .with_overrides(&[
                "attack.strategy=2".to_string(),
                "attack.eta=0.1".to_string(),
                "attack.update_num=10".to_string(),
                "attack.traj_num_each=5".to_string(),
            ])
            .unwrap();
        assert_eq!(
            config.result_dir(),
            PathBuf::from("results/reward_uap_eta0.1_u10_t5")
        );
    }
}
