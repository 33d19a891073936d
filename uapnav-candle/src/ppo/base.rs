//! PPO agent.
use super::{config::PpoConfig, NavRolloutBuffer};
use crate::{
    model::NavPolicyModel,
    obs::{DiscreteAct, SensorObs},
    util::{action_log_probs, entropy, greedy, masks_to_tensor, sample_categorical},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use rand::{rngs::SmallRng, SeedableRng};
use std::{fs, marker::PhantomData, path::Path};
use uapnav_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, Obs, Policy, RolloutAgent,
};

/// Proximal policy optimization over a recurrent navigation policy.
///
/// During rollouts the buffer carries the recurrent state:
/// [`RolloutAgent::rollout_step`] reads the current observation and hidden
/// state from it and writes the successors back. [`Policy::sample`] keeps a
/// separate hidden state for evaluation, cleared per environment slot by
/// [`Policy::reset_state`]. Optimization replays the stored sequence through
/// the GRU from the hidden state at the start of the rollout.
pub struct Ppo<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    model: NavPolicyModel,
    gamma: f32,
    use_gae: bool,
    tau: f32,
    clip_param: f32,
    ppo_epoch: usize,
    value_loss_coef: f32,
    entropy_coef: f32,
    normalize_advantage: bool,
    deterministic_eval: bool,
    train: bool,
    device: Device,
    n_opts: usize,
    rng: SmallRng,
    hidden: Option<Tensor>,
    phantom: PhantomData<E>,
}

impl<E> Ppo<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    /// The underlying actor-critic model.
    pub fn model(&self) -> &NavPolicyModel {
        &self.model
    }

    fn pick_actions(&mut self, logits: &Tensor) -> Result<Vec<i64>> {
        if self.train || !self.deterministic_eval {
            sample_categorical(logits, &mut self.rng)
        } else {
            greedy(logits)
        }
    }

    /// Advantages `returns - values` over the filled rollout, `[H][N]`.
    fn advantages(&self, buffer: &NavRolloutBuffer) -> Vec<Vec<f32>> {
        let horizon = buffer.current_step();
        let mut adv: Vec<Vec<f32>> = (0..horizon)
            .map(|t| {
                buffer
                    .returns_at(t)
                    .iter()
                    .zip(buffer.values_at(t))
                    .map(|(r, v)| r - v)
                    .collect()
            })
            .collect();

        if self.normalize_advantage {
            let n = (horizon * buffer.num_envs()) as f32;
            let mean = adv.iter().flatten().sum::<f32>() / n;
            let var = adv
                .iter()
                .flatten()
                .map(|a| (a - mean) * (a - mean))
                .sum::<f32>()
                / n;
            let std = var.sqrt() + 1e-5;
            for row in adv.iter_mut() {
                for a in row.iter_mut() {
                    *a = (*a - mean) / std;
                }
            }
        }
        adv
    }

    fn opt_(&mut self, buffer: &mut NavRolloutBuffer) -> Result<Record> {
        let horizon = buffer.current_step();
        let num_envs = buffer.num_envs();

        // Bootstrap value of the observation after the last step.
        let next_value = {
            let obs = buffer.obs_at(horizon)?;
            let hidden = buffer.hidden_at(horizon)?;
            let masks = masks_to_tensor(buffer.masks_at(horizon), &self.device)?;
            let (_, values, _) = self.model.forward(obs, hidden, &masks)?;
            values.detach().to_vec1::<f32>()?
        };
        buffer.compute_returns(&next_value, self.use_gae, self.gamma, self.tau)?;

        let adv = self.advantages(buffer);
        let (mut value_loss_epoch, mut action_loss_epoch, mut entropy_epoch) = (0f32, 0f32, 0f32);

        for _ in 0..self.ppo_epoch {
            let mut h = buffer.hidden_at(0)?.clone();
            let mut surrogates = Vec::with_capacity(horizon);
            let mut value_losses = Vec::with_capacity(horizon);
            let mut entropies = Vec::with_capacity(horizon);

            for t in 0..horizon {
                let obs = buffer.obs_at(t)?;
                let masks = masks_to_tensor(buffer.masks_at(t), &self.device)?;
                let (logits, values, h_next) = self.model.forward(obs, &h, &masks)?;
                h = h_next;

                let act = buffer.act_at(t)?.to_tensor(&self.device)?;
                let logp = action_log_probs(&logits, &act)?;
                let old_logp =
                    Tensor::from_slice(buffer.log_probs_at(t), (num_envs,), &self.device)?;
                let adv_t = Tensor::from_slice(&adv[t][..], (num_envs,), &self.device)?;
                let ret_t = Tensor::from_slice(buffer.returns_at(t), (num_envs,), &self.device)?;

                let ratio = (logp - old_logp)?.exp()?;
                let surr1 = (&ratio * &adv_t)?;
                let surr2 = (&ratio.clamp(1.0 - self.clip_param, 1.0 + self.clip_param)? * &adv_t)?;
                surrogates.push(surr1.minimum(&surr2)?.mean_all()?);
                value_losses.push((values - ret_t)?.sqr()?.mean_all()?);
                entropies.push(entropy(&logits)?);
            }

            let action_loss = Tensor::stack(&surrogates, 0)?.mean_all()?.neg()?;
            let value_loss = Tensor::stack(&value_losses, 0)?.mean_all()?;
            let dist_entropy = Tensor::stack(&entropies, 0)?.mean_all()?;

            let loss = ((&value_loss * self.value_loss_coef as f64)? + &action_loss)?;
            let loss = (loss - (&dist_entropy * self.entropy_coef as f64)?)?;
            self.model.backward_step(&loss)?;

            value_loss_epoch += value_loss.to_vec0::<f32>()?;
            action_loss_epoch += action_loss.to_vec0::<f32>()?;
            entropy_epoch += dist_entropy.to_vec0::<f32>()?;
        }

        buffer.after_update();
        self.n_opts += 1;

        let k = self.ppo_epoch as f32;
        Ok(Record::from_slice(&[
            ("loss_value", RecordValue::Scalar(value_loss_epoch / k)),
            ("loss_action", RecordValue::Scalar(action_loss_epoch / k)),
            ("entropy", RecordValue::Scalar(entropy_epoch / k)),
            ("n_opts", RecordValue::Scalar(self.n_opts as f32)),
        ]))
    }
}

impl<E> Policy<E> for Ppo<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    fn sample(&mut self, obs: &SensorObs) -> DiscreteAct {
        let n = obs.len();
        let hidden = match self.hidden.take() {
            Some(h) => h,
            None => self.model.zero_hidden(n).unwrap(),
        };
        let ones = Tensor::ones((n,), DType::F32, &self.device).unwrap();
        let (logits, _, h) = self.model.forward(obs, &hidden, &ones).unwrap();
        self.hidden = Some(h.detach());
        DiscreteAct(self.pick_actions(&logits).unwrap())
    }

    fn reset_state(&mut self, is_done: Option<&[i8]>) {
        match is_done {
            None => self.hidden = None,
            Some(flags) => {
                if let Some(h) = &self.hidden {
                    let keep: Vec<f32> = flags.iter().map(|&d| 1.0 - d as f32).collect();
                    let m = Tensor::from_slice(&keep[..], (keep.len(), 1), &self.device).unwrap();
                    self.hidden = Some(h.broadcast_mul(&m).unwrap());
                }
            }
        }
    }
}

impl<E> Configurable for Ppo<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    type Config = PpoConfig;

    fn build(config: Self::Config) -> Self {
        let device: Device = config.device.into();
        let model = NavPolicyModel::build(config.model_config, device.clone()).unwrap();

        Self {
            model,
            gamma: config.gamma,
            use_gae: config.use_gae,
            tau: config.tau,
            clip_param: config.clip_param,
            ppo_epoch: config.ppo_epoch,
            value_loss_coef: config.value_loss_coef,
            entropy_coef: config.entropy_coef,
            normalize_advantage: config.normalize_advantage,
            deterministic_eval: config.deterministic_eval,
            train: true,
            device,
            n_opts: 0,
            rng: SmallRng::seed_from_u64(config.seed),
            hidden: None,
            phantom: PhantomData,
        }
    }
}

impl<E> Agent<E, NavRolloutBuffer> for Ppo<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut NavRolloutBuffer) -> Result<Record> {
        self.opt_(buffer)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.model.save(path.join("policy.safetensors"))
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.model.load(path.join("policy.safetensors"))
    }
}

impl<E> RolloutAgent<E, NavRolloutBuffer> for Ppo<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    fn rollout_step(&mut self, env: &mut E, buffer: &mut NavRolloutBuffer) -> Result<Record> {
        // The buffer holds the rollout state, so interleaved evaluation
        // through `Policy::sample` cannot disturb an ongoing rollout.
        let t = buffer.current_step();
        if buffer.obs_at(t).is_err() {
            let obs = env.reset()?;
            let hidden = self.model.zero_hidden(env.num_envs())?;
            buffer.set_init(&obs, Some(&hidden));
        }

        let obs = buffer.obs_at(t)?.clone();
        let hidden = buffer.hidden_at(t)?.clone();
        let masks = masks_to_tensor(buffer.masks_at(t), &self.device)?;
        let (logits, values, h_next) = self.model.forward(&obs, &hidden, &masks)?;

        let act = DiscreteAct(self.pick_actions(&logits)?);
        let act_t = act.to_tensor(&self.device)?;
        let logp = action_log_probs(&logits, &act_t)?.detach().to_vec1::<f32>()?;
        let values = values.detach().to_vec1::<f32>()?;
        let h_next = h_next.detach();

        let (step, _) = env.step(&act);
        let next_mask: Vec<bool> = (0..env.num_envs()).map(|i| !step.is_done(i)).collect();
        buffer.insert(
            &step.obs,
            &act,
            Some(&h_next),
            &step.reward,
            &values,
            &logp,
            &next_mask,
        )?;

        let reward_mean = step.reward.iter().sum::<f32>() / step.reward.len() as f32;
        Ok(Record::from_scalar("reward_step", reward_mean))
    }
}
