//! End-to-end checks of the PPO agent and the perturbation attacks on a stub
//! environment.
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use std::collections::BTreeMap;
use uapnav_core::{
    record::Record, Agent, Configurable, Env, EpisodeEvaluator, Evaluator, Info, RolloutAgent,
    RolloutBufferBase, RolloutBufferConfig, Step,
};
use uapnav_candle::{
    attack::{AttackConfig, AttackStrategy, PerturbedPolicy, UapOptimizer, UniversalPerturbation},
    model::NavPolicyModelConfig,
    ppo::{NavRolloutBuffer, Ppo, PpoConfig},
    util::l2_norm,
    DiscreteAct, SensorObs,
};

#[derive(Clone)]
struct StubConfig {
    num_envs: usize,
    episode_len: usize,
    resolution: usize,
}

struct StubInfo {
    success: Vec<Option<f32>>,
}

impl Info for StubInfo {
    fn scalars(&self, ix: usize) -> Vec<(String, f32)> {
        match self.success[ix] {
            Some(s) => vec![("success".to_string(), s), ("spl".to_string(), s)],
            None => Vec::new(),
        }
    }
}

/// Fixed-length episodes over constant observations; every episode succeeds.
struct StubNavEnv {
    config: StubConfig,
    t: Vec<usize>,
}

impl StubNavEnv {
    fn obs(&self) -> Result<SensorObs> {
        let n = self.config.num_envs;
        let r = self.config.resolution;
        Ok(SensorObs::new(BTreeMap::from([
            (
                "depth".to_string(),
                Tensor::zeros((n, r, r, 1), DType::F32, &Device::Cpu)?,
            ),
            (
                "pointgoal_with_gps_compass".to_string(),
                Tensor::ones((n, 2), DType::F32, &Device::Cpu)?,
            ),
        ])))
    }
}

impl Env for StubNavEnv {
    type Config = StubConfig;
    type Obs = SensorObs;
    type Act = DiscreteAct;
    type Info = StubInfo;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            t: vec![0; config.num_envs],
        })
    }

    fn num_envs(&self) -> usize {
        self.config.num_envs
    }

    fn step(&mut self, a: &DiscreteAct) -> (Step<Self>, Record) {
        let n = self.config.num_envs;
        let mut terminated = vec![0i8; n];
        let mut success = vec![None; n];
        for i in 0..n {
            self.t[i] += 1;
            if self.t[i] >= self.config.episode_len {
                terminated[i] = 1;
                success[i] = Some(1.0);
                self.t[i] = 0;
            }
        }
        let obs = self.obs().unwrap();
        let step = Step::new(
            obs,
            a.clone(),
            vec![0.1; n],
            terminated,
            vec![0; n],
            StubInfo { success },
        );
        (step, Record::empty())
    }

    fn reset(&mut self) -> Result<SensorObs> {
        self.t = vec![0; self.config.num_envs];
        self.obs()
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<SensorObs> {
        self.reset()
    }
}

fn small_agent() -> Ppo<StubNavEnv> {
    let model_config = NavPolicyModelConfig::default()
        .depth_shape(64, 64)
        .hidden_dim(16);
    Ppo::build(PpoConfig::default().model_config(model_config).ppo_epoch(2))
}

fn stub_config() -> StubConfig {
    StubConfig {
        num_envs: 2,
        episode_len: 3,
        resolution: 64,
    }
}

#[test]
fn ppo_collects_and_updates() -> Result<()> {
    let mut agent = small_agent();
    let mut env = StubNavEnv::build(&stub_config(), 0)?;
    let mut buffer = NavRolloutBuffer::build(&RolloutBufferConfig::default().num_steps(4).num_envs(2));

    while !buffer.is_full() {
        agent.rollout_step(&mut env, &mut buffer)?;
    }
    let record = agent.opt_with_record(&mut buffer)?;
    assert!(record.get_scalar("loss_value").is_ok());
    assert!(record.get_scalar("entropy").is_ok());
    // The buffer cycled and accepts the next rollout.
    assert!(!buffer.is_full());
    agent.rollout_step(&mut env, &mut buffer)?;
    Ok(())
}

#[test]
fn attack_strategies_stay_within_budget() -> Result<()> {
    let agent = small_agent();
    let eta = 0.05;

    for strategy in [
        AttackStrategy::Uap,
        AttackStrategy::RewardUap,
        AttackStrategy::TrajectoryUap,
    ] {
        let config = AttackConfig::default()
            .strategy(strategy)
            .update_num(2)
            .traj_num_each(1)
            .eta(eta);
        let mut env = StubNavEnv::build(&stub_config(), 0)?;
        let mut optimizer = UapOptimizer::new(config);
        let noise = optimizer.optimize(agent.model(), &mut env)?;

        // Vector sensors are bounded by eta itself, image sensors by
        // eta * width * channels.
        let goal_norm = l2_norm(noise.get("pointgoal_with_gps_compass").unwrap())?;
        assert!(goal_norm.is_finite());
        assert!(goal_norm as f64 <= eta + 1e-5);
        let depth_norm = l2_norm(noise.get("depth").unwrap())?;
        assert!(depth_norm.is_finite());
        assert!(depth_norm as f64 <= eta * 64.0 + 1e-3);
    }
    Ok(())
}

#[test]
fn clean_strategy_is_a_zero_perturbation() -> Result<()> {
    let agent = small_agent();
    let mut env = StubNavEnv::build(&stub_config(), 0)?;
    let mut optimizer = UapOptimizer::new(AttackConfig::default());
    let noise = optimizer.optimize(agent.model(), &mut env)?;
    for (_, t) in noise.iter() {
        assert_eq!(l2_norm(t)?, 0.0);
    }
    Ok(())
}

#[test]
fn perturbed_policy_is_evaluated_over_episodes() -> Result<()> {
    let mut agent = small_agent();
    agent.eval();
    let obs = StubNavEnv::build(&stub_config(), 0)?.reset()?;
    let noise = UniversalPerturbation::zeros_like(&obs)?;

    let mut evaluator = EpisodeEvaluator::<StubNavEnv>::new(&stub_config(), 0, 4)?;
    let mut policy = PerturbedPolicy::new(&mut agent, &noise);
    let record = evaluator.evaluate(&mut policy)?;

    assert_eq!(record.get_scalar("success")?, 1.0);
    // Three steps of 0.1 reward per episode.
    assert!((record.get_scalar("reward")? - 0.3).abs() < 1e-5);
    Ok(())
}
