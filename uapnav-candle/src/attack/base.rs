//! Perturbation optimization strategies.
use super::{
    config::{AttackConfig, AttackStrategy},
    perturbation::UniversalPerturbation,
};
use crate::{
    model::NavPolicyModel,
    obs::{DiscreteAct, SensorObs},
    util::{action_log_probs, masks_to_tensor, sample_categorical},
};
use anyhow::Result;
use candle_core::{DType, Tensor, Var};
use log::info;
use rand::{rngs::SmallRng, SeedableRng};
use std::{collections::BTreeMap, marker::PhantomData};
use uapnav_core::{error::UapNavError, Env, Info};

/// The loss whose observation gradient a strategy accumulates.
enum GradLoss {
    /// `sum_i exp(log pi(a_i | o_i))`.
    ExpLogProb,

    /// `sum_i log pi(a_i | o_i) * V(o_i)`, values detached.
    ValueWeighted,

    /// `sum_i log pi(a_i | o_i)`.
    LogProb,
}

/// One policy step with gradients taken w.r.t. the observation.
struct GradStep {
    grads: BTreeMap<String, Tensor>,
    act: DiscreteAct,
    next_hidden: Tensor,
}

/// Optimizes a [`UniversalPerturbation`] against a frozen policy model on a
/// vectorized environment.
pub struct UapOptimizer<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    config: AttackConfig,
    rng: SmallRng,
    phantom: PhantomData<E>,
}

impl<E> UapOptimizer<E>
where
    E: Env<Obs = SensorObs, Act = DiscreteAct>,
{
    /// Constructs the optimizer.
    pub fn new(config: AttackConfig) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            phantom: PhantomData,
        }
    }

    /// The attack configuration.
    pub fn config(&self) -> &AttackConfig {
        &self.config
    }

    /// Runs the configured strategy and returns the optimized perturbation.
    ///
    /// The model parameters are never updated; only the noise is. For
    /// [`AttackStrategy::Clean`] the returned perturbation is zero.
    pub fn optimize(&mut self, model: &NavPolicyModel, env: &mut E) -> Result<UniversalPerturbation> {
        match self.config.strategy {
            AttackStrategy::Clean => {
                let obs = env.reset()?;
                UniversalPerturbation::zeros_like(&obs)
            }
            AttackStrategy::Uap => self.optimize_uap(model, env),
            AttackStrategy::RewardUap | AttackStrategy::TrajectoryUap => {
                self.optimize_iterative(model, env)
            }
        }
    }

    /// Samples one action batch and returns the observation gradients of the
    /// chosen loss. The recurrent state is detached between steps so each
    /// backward pass spans a single step.
    fn grad_step(
        &mut self,
        model: &NavPolicyModel,
        obs: &SensorObs,
        hidden: &Tensor,
        masks: &[bool],
        loss_kind: &GradLoss,
    ) -> Result<GradStep> {
        let device = model.device();
        let mut vars: BTreeMap<String, Var> = BTreeMap::new();
        let var_obs = obs.map(|k, t| {
            let v = Var::from_tensor(&t.detach())?;
            let tv = v.as_tensor().clone();
            vars.insert(k.to_string(), v);
            Ok(tv)
        })?;

        let masks_t = masks_to_tensor(masks, device)?;
        let (logits, values, next_hidden) = model.forward(&var_obs, hidden, &masks_t)?;
        let act = DiscreteAct(sample_categorical(&logits, &mut self.rng)?);
        let act_t = act.to_tensor(device)?;
        let logp = action_log_probs(&logits, &act_t)?;

        let loss = match loss_kind {
            GradLoss::ExpLogProb => logp.exp()?.sum_all()?,
            GradLoss::ValueWeighted => (logp * values.detach())?.sum_all()?,
            GradLoss::LogProb => logp.sum_all()?,
        };
        let grad_store = loss.backward()?;

        let mut grads = BTreeMap::new();
        for (k, v) in vars {
            if let Some(g) = grad_store.get(&v) {
                grads.insert(k, g.detach());
            }
        }
        Ok(GradStep {
            grads,
            act,
            next_hidden: next_hidden.detach(),
        })
    }

    /// Plain UAP: descend the summed probability of the clean policy's
    /// actions, then project once onto the budget.
    fn optimize_uap(
        &mut self,
        model: &NavPolicyModel,
        env: &mut E,
    ) -> Result<UniversalPerturbation> {
        let mut obs = env.reset()?;
        let n = env.num_envs();
        let mut noise = UniversalPerturbation::zeros_like(&obs)?;
        let mut hidden = model.zero_hidden(n)?;
        let mut masks = vec![true; n];

        let total = self.config.update_num * self.config.traj_num_each;
        let mut finished = 0;
        while finished < total {
            let gs = self.grad_step(model, &obs, &hidden, &masks, &GradLoss::ExpLogProb)?;
            noise.add(&gs.grads, -1.0)?;

            let (step, _) = env.step(&gs.act);
            for i in 0..n {
                if step.is_done(i) {
                    finished += 1;
                }
            }
            masks = (0..n).map(|i| !step.is_done(i)).collect();
            hidden = gs.next_hidden;
            obs = step.obs;
        }

        noise.project(self.config.eta, &self.config.sensor_ranges)?;
        info!("Optimized perturbation over {} trajectories", finished);
        Ok(noise)
    }

    /// Reward-UAP and Trajectory-UAP: `update_num` rounds of trajectory
    /// collection under the current noise, each followed by a normalized
    /// update of step size `eta / update_num`, and a final projection.
    fn optimize_iterative(
        &mut self,
        model: &NavPolicyModel,
        env: &mut E,
    ) -> Result<UniversalPerturbation> {
        let gated_by_success = self.config.strategy == AttackStrategy::TrajectoryUap;
        let loss_kind = if gated_by_success {
            GradLoss::LogProb
        } else {
            GradLoss::ValueWeighted
        };
        let alpha = self.config.eta / self.config.update_num as f64;
        let gamma = self.config.gamma;

        let mut obs = env.reset()?;
        let n = env.num_envs();
        let mut noise = UniversalPerturbation::zeros_like(&obs)?;
        let zero_acc = |obs: &SensorObs| -> Result<BTreeMap<String, Tensor>> {
            let mut acc = BTreeMap::new();
            for (k, t) in obs.iter() {
                acc.insert(
                    k.clone(),
                    Tensor::zeros(&t.dims()[1..], DType::F32, t.device())?,
                );
            }
            Ok(acc)
        };

        for round in 0..self.config.update_num {
            let mut round_grad = zero_acc(&obs)?;
            // Discounted per-slot accumulators, committed at episode end.
            let mut slot_acc: Vec<BTreeMap<String, Tensor>> = (0..n)
                .map(|_| zero_acc(&obs))
                .collect::<Result<Vec<_>>>()?;
            let mut hidden = model.zero_hidden(n)?;
            let mut masks = vec![true; n];
            let mut finished = 0;

            while finished < self.config.traj_num_each {
                let perturbed = noise.apply(&obs)?;
                let gs = self.grad_step(model, &perturbed, &hidden, &masks, &loss_kind)?;

                if gated_by_success {
                    for i in 0..n {
                        let acc = &mut slot_acc[i];
                        for (k, g) in gs.grads.iter() {
                            if let Some(a) = acc.get_mut(k) {
                                let row = g.narrow(0, i, 1)?.squeeze(0)?;
                                *a = ((a.clone() * gamma)? - row)?;
                            }
                        }
                    }
                } else {
                    for (k, g) in gs.grads.iter() {
                        if let Some(a) = round_grad.get_mut(k) {
                            *a = (a.clone() - g.sum(0)?)?;
                        }
                    }
                }

                let (step, _) = env.step(&gs.act);
                for i in 0..n {
                    if step.is_done(i) {
                        finished += 1;
                        if gated_by_success {
                            let success = step
                                .info
                                .scalars(i)
                                .into_iter()
                                .find(|(k, _)| k == "success")
                                .map(|(_, v)| v)
                                .ok_or_else(|| UapNavError::MissingMetric("success".to_string()))?;
                            for (k, a) in slot_acc[i].iter() {
                                if let Some(r) = round_grad.get_mut(k) {
                                    *r = (r.clone() + (a * success as f64)?)?;
                                }
                            }
                            slot_acc[i] = zero_acc(&obs)?;
                        }
                    }
                }
                masks = (0..n).map(|i| !step.is_done(i)).collect();
                hidden = gs.next_hidden;
                obs = step.obs;
            }

            noise.add_normalized(&round_grad, alpha, &self.config.sensor_ranges)?;
            info!(
                "Attack round {}/{} done ({} trajectories)",
                round + 1,
                self.config.update_num,
                finished
            );
        }

        noise.project(self.config.eta, &self.config.sensor_ranges)?;
        Ok(noise)
    }
}
