//! On-policy training loop.
use crate::{
    record::{Record, RecordValue, Recorder},
    Env, Evaluator, RolloutAgent, RolloutBufferBase,
};
use anyhow::Result;
use log::info;
use std::marker::PhantomData;

mod config;
pub use config::OnPolicyTrainerConfig;

/// Manages the training loop of an on-policy agent.
///
/// Each update collects a rollout into the buffer until it is full, then runs
/// one optimization step of the agent. Evaluation, model saving and record
/// flushing happen at configured intervals of updates.
pub struct OnPolicyTrainer<E, R>
where
    E: Env,
    R: RolloutBufferBase,
{
    env_config: E::Config,
    buffer_config: R::Config,
    config: OnPolicyTrainerConfig,
    phantom: PhantomData<(E, R)>,
}

impl<E, R> OnPolicyTrainer<E, R>
where
    E: Env,
    R: RolloutBufferBase,
{
    /// Constructs a trainer.
    pub fn build(
        config: OnPolicyTrainerConfig,
        env_config: E::Config,
        buffer_config: R::Config,
    ) -> Self {
        Self {
            env_config,
            buffer_config,
            config,
            phantom: PhantomData,
        }
    }

    fn save_model<A: RolloutAgent<E, R>>(agent: &A, model_dir: String) {
        match agent.save_params(model_dir.as_ref()) {
            Ok(()) => info!("Saved the model in {:?}", &model_dir),
            Err(_) => info!("Failed to save model in {:?}", &model_dir),
        }
    }

    fn save_best_model<A: RolloutAgent<E, R>>(agent: &A, model_dir: String) {
        let model_dir = model_dir + "/best";
        Self::save_model(agent, model_dir);
    }

    fn save_model_with_steps<A: RolloutAgent<E, R>>(agent: &A, model_dir: String, steps: usize) {
        let model_dir = model_dir + format!("/{}", steps).as_str();
        Self::save_model(agent, model_dir);
    }

    /// Runs the training loop.
    ///
    /// The agent switches to evaluation mode around each call to `evaluator`
    /// and back to training mode afterwards.
    pub fn train<A, D>(
        &mut self,
        agent: &mut A,
        recorder: &mut Box<dyn Recorder>,
        evaluator: &mut D,
    ) -> Result<()>
    where
        A: RolloutAgent<E, R>,
        D: Evaluator<E, A>,
    {
        let mut env = E::build(&self.env_config, 0)?;
        let mut buffer = R::build(&self.buffer_config);
        let mut max_eval_reward = f32::MIN;

        agent.train();

        for update in 1..=self.config.max_updates {
            let mut rollout_record = Record::empty();
            while !buffer.is_full() {
                let record = agent.rollout_step(&mut env, &mut buffer)?;
                rollout_record = rollout_record.merge(record);
            }
            let mut record = rollout_record.merge(agent.opt_with_record(&mut buffer)?);
            record.insert("update", RecordValue::Scalar(update as f32));

            if self.config.eval_interval != 0 && update % self.config.eval_interval == 0 {
                agent.eval();
                let eval_record = evaluator.evaluate(agent)?;
                agent.train();
                let eval_reward = eval_record.get_scalar("reward")?;
                record = record.merge(eval_record);

                if self.config.model_dir.is_some() && eval_reward > max_eval_reward {
                    max_eval_reward = eval_reward;
                    let model_dir = self.config.model_dir.clone().unwrap();
                    Self::save_best_model(agent, model_dir);
                }
            }

            if self.config.save_interval != 0 && update % self.config.save_interval == 0 {
                if let Some(model_dir) = self.config.model_dir.clone() {
                    Self::save_model_with_steps(agent, model_dir, update);
                }
            }

            recorder.store(record);
            if self.config.flush_record_interval != 0 && update % self.config.flush_record_interval == 0
            {
                recorder.flush(update as i64);
            }
        }

        recorder.flush(self.config.max_updates as i64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        record::BufferedRecorder, Act, Agent, Obs, Policy, RolloutBuffer, RolloutBufferConfig,
        Step, VecStore,
    };
    use anyhow::Result;

    #[derive(Clone, Debug)]
    struct TestObs(Vec<f32>);

    impl Obs for TestObs {
        fn len(&self) -> usize {
            self.0.len()
        }
    }

    #[derive(Clone, Debug)]
    struct TestAct(Vec<f32>);

    impl Act for TestAct {
        fn len(&self) -> usize {
            self.0.len()
        }
    }

    struct TestEnv {
        n: usize,
    }

    impl Env for TestEnv {
        type Config = usize;
        type Obs = TestObs;
        type Act = TestAct;
        type Info = ();

        fn build(config: &usize, _seed: i64) -> Result<Self> {
            Ok(Self { n: *config })
        }

        fn num_envs(&self) -> usize {
            self.n
        }

        fn step(&mut self, a: &TestAct) -> (Step<Self>, Record) {
            let step = Step::new(
                TestObs(vec![0.0; self.n]),
                a.clone(),
                vec![1.0; self.n],
                vec![0; self.n],
                vec![0; self.n],
                (),
            );
            (step, Record::empty())
        }

        fn reset(&mut self) -> Result<TestObs> {
            Ok(TestObs(vec![0.0; self.n]))
        }

        fn reset_with_index(&mut self, _ix: usize) -> Result<TestObs> {
            self.reset()
        }
    }

    type TestBuffer = RolloutBuffer<VecStore, VecStore, ()>;

    struct TestAgent {
        train: bool,
        n_opts: usize,
    }

    impl Policy<TestEnv> for TestAgent {
        fn sample(&mut self, obs: &TestObs) -> TestAct {
            TestAct(vec![0.0; obs.len()])
        }
    }

    impl Agent<TestEnv, TestBuffer> for TestAgent {
        fn train(&mut self) {
            self.train = true;
        }

        fn eval(&mut self) {
            self.train = false;
        }

        fn is_train(&self) -> bool {
            self.train
        }

        fn opt_with_record(&mut self, buffer: &mut TestBuffer) -> Result<Record> {
            buffer.after_update();
            self.n_opts += 1;
            Ok(Record::from_scalar("n_opts", self.n_opts as f32))
        }

        fn save_params(&self, _path: &std::path::Path) -> Result<()> {
            Ok(())
        }

        fn load_params(&mut self, _path: &std::path::Path) -> Result<()> {
            Ok(())
        }
    }

    impl RolloutAgent<TestEnv, TestBuffer> for TestAgent {
        fn rollout_step(&mut self, env: &mut TestEnv, buffer: &mut TestBuffer) -> Result<Record> {
            if buffer.obs_at(buffer.current_step()).is_err() {
                buffer.set_init(&env.reset()?.0, None);
            }
            let act = TestAct(vec![0.0; env.num_envs()]);
            let (step, _) = env.step(&act);
            let n = env.num_envs();
            buffer.insert(
                &step.obs.0,
                &act.0,
                None,
                &step.reward,
                &vec![0.0; n],
                &vec![0.0; n],
                &vec![true; n],
            )?;
            Ok(Record::empty())
        }
    }

    struct TestEvaluator;

    impl Evaluator<TestEnv, TestAgent> for TestEvaluator {
        fn evaluate(&mut self, _agent: &mut TestAgent) -> Result<Record> {
            Ok(Record::from_scalar("reward", 1.0))
        }
    }

    fn run(config: OnPolicyTrainerConfig) -> Result<TestAgent> {
        let mut trainer = OnPolicyTrainer::<TestEnv, TestBuffer>::build(
            config,
            2,
            RolloutBufferConfig::default().num_steps(2).num_envs(2),
        );
        let mut agent = TestAgent {
            train: false,
            n_opts: 0,
        };
        let mut recorder: Box<dyn Recorder> = Box::new(BufferedRecorder::new());
        trainer.train(&mut agent, &mut recorder, &mut TestEvaluator)?;
        Ok(agent)
    }

    #[test]
    fn zero_flush_interval_defers_flushing_to_the_end() -> Result<()> {
        let config = OnPolicyTrainerConfig::default()
            .max_updates(3)
            .flush_record_interval(0);
        let agent = run(config)?;
        assert_eq!(agent.n_opts, 3);
        Ok(())
    }

    #[test]
    fn evaluation_restores_training_mode() -> Result<()> {
        let config = OnPolicyTrainerConfig::default()
            .max_updates(2)
            .eval_interval(1);
        let agent = run(config)?;
        assert!(agent.is_train());
        Ok(())
    }
}
