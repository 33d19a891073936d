//! Training and attacked evaluation of pointgoal navigation policies.
//!
//! [`train`] runs PPO on the grid-world environment. [`evaluate`] optimizes
//! a universal perturbation with the configured strategy, saves it, then
//! measures the policy under that perturbation over a fixed episode set and
//! writes per-episode and aggregated metrics to the result directory.
mod config;
pub use config::ExperimentConfig;

use anyhow::Result;
use log::info;
use std::{fs, path::Path};
use uapnav_candle::{
    attack::{PerturbedPolicy, UapOptimizer},
    ppo::{NavRolloutBuffer, Ppo},
};
use uapnav_core::{
    record::{Record, RecordValue, Recorder},
    Agent, Configurable, Env, EpisodeEvaluator, OnPolicyTrainer,
};
use uapnav_pointnav_env::PointNavEnv;

/// The agent type of the experiment.
pub type NavAgent = Ppo<PointNavEnv>;

/// Trains a PPO agent, evaluating and checkpointing per the trainer
/// configuration. Records go to `train.csv` under the model directory.
pub fn train(config: &ExperimentConfig) -> Result<()> {
    let mut agent = NavAgent::build(config.agent.clone());
    let mut trainer = OnPolicyTrainer::<PointNavEnv, NavRolloutBuffer>::build(
        config.trainer.clone(),
        config.env.clone(),
        config.buffer.clone(),
    );
    let record_path = match &config.trainer.model_dir {
        Some(dir) => Path::new(dir).join("train.csv"),
        None => Path::new("train.csv").to_path_buf(),
    };
    let mut recorder: Box<dyn Recorder> =
        Box::new(uapnav_core::record::CsvRecorder::new(record_path)?);
    let mut evaluator =
        EpisodeEvaluator::<PointNavEnv>::new(&config.env, config.eval_seed, config.eval_episodes)?;

    trainer.train(&mut agent, &mut recorder, &mut evaluator)
}

/// Runs one attacked evaluation.
///
/// Loads the checkpoint if given, optimizes the perturbation on a fresh
/// environment, saves it as `noise.safetensors`, then evaluates the
/// perturbed policy over the configured episode set. Per-episode statistics
/// land in `episodes.csv`, the configuration in `config.yaml`, and the
/// aggregated metrics are returned.
pub fn evaluate(config: &ExperimentConfig, checkpoint: Option<&Path>) -> Result<Record> {
    let mut agent = NavAgent::build(config.agent.clone());
    if let Some(path) = checkpoint {
        agent.load_params(path)?;
    }
    agent.eval();

    let result_dir = config.result_dir();
    fs::create_dir_all(&result_dir)?;
    config.save(result_dir.join("config.yaml"))?;

    let mut env = PointNavEnv::build(&config.env, config.eval_seed)?;
    let mut optimizer = UapOptimizer::new(config.attack.clone());
    let noise = optimizer.optimize(agent.model(), &mut env)?;
    noise.save(result_dir.join("noise.safetensors"))?;

    let mut evaluator =
        EpisodeEvaluator::<PointNavEnv>::new(&config.env, config.eval_seed, config.eval_episodes)?;
    let stats = {
        let mut policy = PerturbedPolicy::new(&mut agent, &noise);
        evaluator.run(&mut policy)?
    };
    stats.to_csv(result_dir.join("episodes.csv"))?;

    let record = stats.aggregate().merge(noise.record());
    for (k, v) in record.iter() {
        if let RecordValue::Scalar(v) = v {
            info!("{}: {}", k, v);
        }
    }
    Ok(record)
}
