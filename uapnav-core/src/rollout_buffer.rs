//! Fixed-horizon trajectory buffer for on-policy optimization.
//!
//! The buffer holds one rollout segment: `H` steps of `N` parallel
//! environments. Observation-like fields (observations, hidden states,
//! not-done masks, value estimates) span `H + 1` timesteps, action-like
//! fields (actions, rewards, returns, log-probabilities) span `H`. All
//! per-environment arrays keep a consistent environment ordering.
//!
//! The buffer is allocated once with fixed shapes, mutated in place via
//! [`RolloutBuffer::insert`], and cyclically reused: after an optimization
//! pass, [`RolloutBuffer::after_update`] copies the last timestep into slot
//! zero and resets the step counter so collection continues seamlessly.
mod config;
mod store;

use crate::error::UapNavError;
pub use config::RolloutBufferConfig;
pub use store::{BatchStore, VecStore};

/// Interface used by the trainer to build and poll a rollout buffer.
pub trait RolloutBufferBase {
    /// Configuration.
    type Config: Clone;

    /// Builds the buffer.
    fn build(config: &Self::Config) -> Self;

    /// Returns `true` when the horizon is exhausted and an optimization
    /// pass is due.
    fn is_full(&self) -> bool;
}

/// Trajectory storage for `H` steps of `N` parallel environments.
///
/// `O`, `A` and `Hid` are the containers for observation, action and
/// recurrent-hidden-state batches. Policies without recurrence use the unit
/// container for `Hid`.
pub struct RolloutBuffer<O, A, Hid = ()>
where
    O: BatchStore,
    A: BatchStore,
    Hid: BatchStore,
{
    num_steps: usize,
    num_envs: usize,

    /// Next step to be written, in `[0, num_steps]`.
    step: usize,

    /// Observations, `H + 1` slots.
    obs: O,

    /// Actions, `H` slots.
    act: A,

    /// Recurrent hidden-state snapshots, `H + 1` slots.
    hidden: Hid,

    /// Per-step rewards, `[H][N]`.
    rewards: Vec<Vec<f32>>,

    /// Value estimates, `[H + 1][N]`; the last slot holds the bootstrap
    /// value written by [`RolloutBuffer::compute_returns`].
    value_preds: Vec<Vec<f32>>,

    /// Returns, `[H][N]`, filled by [`RolloutBuffer::compute_returns`].
    returns: Vec<Vec<f32>>,

    /// Log-probabilities of the taken actions, `[H][N]`.
    action_log_probs: Vec<Vec<f32>>,

    /// Episode-active masks, `[H + 1][N]`. `masks[t + 1][i]` is `false` iff
    /// the episode in slot `i` ended at step `t`; within an episode the mask
    /// stays `true` until that point and `false` afterwards until the slot
    /// is reset.
    masks: Vec<Vec<bool>>,
}

impl<O, A, Hid> RolloutBuffer<O, A, Hid>
where
    O: BatchStore,
    A: BatchStore,
    Hid: BatchStore,
{
    /// Allocates a buffer for `num_steps` steps of `num_envs` environments.
    pub fn new(num_steps: usize, num_envs: usize) -> Self {
        Self {
            num_steps,
            num_envs,
            step: 0,
            obs: O::with_capacity(num_steps + 1),
            act: A::with_capacity(num_steps),
            hidden: Hid::with_capacity(num_steps + 1),
            rewards: vec![vec![0.0; num_envs]; num_steps],
            value_preds: vec![vec![0.0; num_envs]; num_steps + 1],
            returns: vec![vec![0.0; num_envs]; num_steps],
            action_log_probs: vec![vec![0.0; num_envs]; num_steps],
            masks: vec![vec![false; num_envs]; num_steps + 1],
        }
    }

    /// The rollout horizon `H`.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// The number of parallel environments `N`.
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// The next step to be written.
    pub fn current_step(&self) -> usize {
        self.step
    }

    fn check_len(&self, field: &'static str, got: usize) -> Result<(), UapNavError> {
        if got != self.num_envs {
            return Err(UapNavError::LengthMismatch {
                field,
                expected: self.num_envs,
                got,
            });
        }
        Ok(())
    }

    /// Seeds slot zero with the observations (and hidden states) of freshly
    /// reset environments and restarts the step counter.
    pub fn set_init(&mut self, obs: &O::Batch, hidden: Option<&Hid::Batch>) {
        self.obs.write(0, obs);
        if let Some(h) = hidden {
            self.hidden.write(0, h);
        }
        self.masks[0] = vec![true; self.num_envs];
        self.step = 0;
    }

    /// Records one environment step and advances the write position.
    ///
    /// `next_obs`, `next_hidden` and `next_mask` belong to timestep
    /// `step + 1`; the action, reward, value estimate and log-probability
    /// belong to timestep `step`.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        next_obs: &O::Batch,
        act: &A::Batch,
        next_hidden: Option<&Hid::Batch>,
        reward: &[f32],
        value: &[f32],
        action_log_prob: &[f32],
        next_mask: &[bool],
    ) -> Result<(), UapNavError> {
        if self.step >= self.num_steps {
            return Err(UapNavError::BufferFull(self.num_steps));
        }
        self.check_len("reward", reward.len())?;
        self.check_len("value", value.len())?;
        self.check_len("action_log_prob", action_log_prob.len())?;
        self.check_len("next_mask", next_mask.len())?;

        let t = self.step;
        self.act.write(t, act);
        self.rewards[t].copy_from_slice(reward);
        self.value_preds[t].copy_from_slice(value);
        self.action_log_probs[t].copy_from_slice(action_log_prob);

        self.obs.write(t + 1, next_obs);
        if let Some(h) = next_hidden {
            self.hidden.write(t + 1, h);
        }
        self.masks[t + 1].copy_from_slice(next_mask);

        self.step = t + 1;
        Ok(())
    }

    /// Fills the returns from rewards, value estimates and the bootstrap
    /// value of the observation after the last step.
    ///
    /// With `use_gae` the returns are advantage estimates plus values
    /// (lambda-returns); otherwise plain discounted sums cut at episode
    /// boundaries by the masks.
    pub fn compute_returns(
        &mut self,
        next_value: &[f32],
        use_gae: bool,
        gamma: f32,
        tau: f32,
    ) -> Result<(), UapNavError> {
        self.check_len("next_value", next_value.len())?;
        let horizon = self.step;
        self.value_preds[horizon].copy_from_slice(next_value);

        if use_gae {
            let mut gae = vec![0.0f32; self.num_envs];
            for t in (0..horizon).rev() {
                for i in 0..self.num_envs {
                    let mask = self.masks[t + 1][i] as u8 as f32;
                    let delta = self.rewards[t][i] + gamma * self.value_preds[t + 1][i] * mask
                        - self.value_preds[t][i];
                    gae[i] = delta + gamma * tau * mask * gae[i];
                    self.returns[t][i] = gae[i] + self.value_preds[t][i];
                }
            }
        } else {
            let mut ret = next_value.to_vec();
            for t in (0..horizon).rev() {
                for i in 0..self.num_envs {
                    let mask = self.masks[t + 1][i] as u8 as f32;
                    ret[i] = self.rewards[t][i] + gamma * ret[i] * mask;
                    self.returns[t][i] = ret[i];
                }
            }
        }
        Ok(())
    }

    /// Cycles the buffer for reuse: the last written timestep becomes slot
    /// zero and the step counter restarts.
    pub fn after_update(&mut self) {
        let last = self.step;
        self.obs.copy_within(last, 0);
        self.hidden.copy_within(last, 0);
        let m = self.masks[last].clone();
        self.masks[0] = m;
        self.step = 0;
    }

    /// Observations at timestep `t`.
    pub fn obs_at(&self, t: usize) -> Result<&O::Batch, UapNavError> {
        self.obs.get(t).ok_or(UapNavError::EmptySlot(t))
    }

    /// Actions at timestep `t`.
    pub fn act_at(&self, t: usize) -> Result<&A::Batch, UapNavError> {
        self.act.get(t).ok_or(UapNavError::EmptySlot(t))
    }

    /// Hidden-state snapshot at timestep `t`.
    pub fn hidden_at(&self, t: usize) -> Result<&Hid::Batch, UapNavError> {
        self.hidden.get(t).ok_or(UapNavError::EmptySlot(t))
    }

    /// Episode-active masks at timestep `t`.
    pub fn masks_at(&self, t: usize) -> &[bool] {
        &self.masks[t]
    }

    /// Rewards at timestep `t`.
    pub fn rewards_at(&self, t: usize) -> &[f32] {
        &self.rewards[t]
    }

    /// Value estimates at timestep `t`.
    pub fn values_at(&self, t: usize) -> &[f32] {
        &self.value_preds[t]
    }

    /// Returns at timestep `t`.
    pub fn returns_at(&self, t: usize) -> &[f32] {
        &self.returns[t]
    }

    /// Log-probabilities at timestep `t`.
    pub fn log_probs_at(&self, t: usize) -> &[f32] {
        &self.action_log_probs[t]
    }
}

impl<O, A, Hid> RolloutBufferBase for RolloutBuffer<O, A, Hid>
where
    O: BatchStore,
    A: BatchStore,
    Hid: BatchStore,
{
    type Config = RolloutBufferConfig;

    fn build(config: &Self::Config) -> Self {
        Self::new(config.num_steps, config.num_envs)
    }

    fn is_full(&self) -> bool {
        self.step == self.num_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Buf = RolloutBuffer<VecStore, VecStore, ()>;

    fn filled_buffer(num_steps: usize, num_envs: usize) -> Buf {
        let mut buf = Buf::new(num_steps, num_envs);
        buf.set_init(&vec![0.0; num_envs], None);
        for t in 0..num_steps {
            let obs = vec![(t + 1) as f32; num_envs];
            let act = vec![t as f32; num_envs];
            buf.insert(
                &obs,
                &act,
                None,
                &vec![1.0; num_envs],
                &vec![0.5; num_envs],
                &vec![-0.1; num_envs],
                &vec![true; num_envs],
            )
            .unwrap();
        }
        buf
    }

    #[test]
    fn insert_beyond_horizon_fails() {
        let mut buf = filled_buffer(4, 2);
        assert!(buf.is_full());
        let err = buf
            .insert(
                &vec![0.0; 2],
                &vec![0.0; 2],
                None,
                &[0.0; 2],
                &[0.0; 2],
                &[0.0; 2],
                &[true; 2],
            )
            .unwrap_err();
        assert!(matches!(err, UapNavError::BufferFull(4)));
    }

    #[test]
    fn insert_checks_env_count() {
        let mut buf = Buf::new(4, 2);
        buf.set_init(&vec![0.0; 2], None);
        let err = buf
            .insert(
                &vec![0.0; 2],
                &vec![0.0; 2],
                None,
                &[0.0; 3],
                &[0.0; 2],
                &[0.0; 2],
                &[true; 2],
            )
            .unwrap_err();
        assert!(matches!(err, UapNavError::LengthMismatch { field: "reward", .. }));
    }

    #[test]
    fn after_update_wraps_last_step_to_slot_zero() {
        let mut buf = filled_buffer(4, 2);
        let last_obs = buf.obs_at(4).unwrap().clone();
        buf.after_update();
        assert_eq!(buf.current_step(), 0);
        assert!(!buf.is_full());
        assert_eq!(buf.obs_at(0).unwrap(), &last_obs);
        // The buffer accepts a fresh horizon after cycling.
        buf.insert(
            &vec![9.0; 2],
            &vec![0.0; 2],
            None,
            &[0.0; 2],
            &[0.0; 2],
            &[0.0; 2],
            &[true; 2],
        )
        .unwrap();
        assert_eq!(buf.current_step(), 1);
    }

    #[test]
    fn gae_returns_match_hand_computation() {
        let mut buf = Buf::new(2, 1);
        buf.set_init(&vec![0.0], None);
        buf.insert(&vec![1.0], &vec![0.0], None, &[1.0], &[0.5], &[0.0], &[true])
            .unwrap();
        buf.insert(&vec![2.0], &vec![1.0], None, &[2.0], &[1.0], &[0.0], &[true])
            .unwrap();
        buf.compute_returns(&[3.0], true, 0.9, 0.8).unwrap();

        // delta_1 = 2 + 0.9 * 3 - 1 = 3.7; gae_1 = 3.7; ret_1 = 4.7
        // delta_0 = 1 + 0.9 * 1 - 0.5 = 1.4; gae_0 = 1.4 + 0.72 * 3.7 = 4.064
        // ret_0 = 4.064 + 0.5 = 4.564
        assert!((buf.returns_at(1)[0] - 4.7).abs() < 1e-5);
        assert!((buf.returns_at(0)[0] - 4.564).abs() < 1e-5);
    }

    #[test]
    fn discounted_returns_stop_at_episode_boundary() {
        let mut buf = Buf::new(3, 1);
        buf.set_init(&vec![0.0], None);
        buf.insert(&vec![1.0], &vec![0.0], None, &[1.0], &[0.0], &[0.0], &[true])
            .unwrap();
        // Episode ends at step 1: the mask for timestep 2 is false.
        buf.insert(&vec![2.0], &vec![0.0], None, &[1.0], &[0.0], &[0.0], &[false])
            .unwrap();
        buf.insert(&vec![3.0], &vec![0.0], None, &[1.0], &[0.0], &[0.0], &[true])
            .unwrap();
        buf.compute_returns(&[10.0], false, 0.5, 1.0).unwrap();

        // ret_2 bootstraps: 1 + 0.5 * 10 = 6; ret_1 is cut by the boundary.
        assert!((buf.returns_at(2)[0] - 6.0).abs() < 1e-6);
        assert!((buf.returns_at(1)[0] - 1.0).abs() < 1e-6);
        assert!((buf.returns_at(0)[0] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn masks_record_episode_boundaries() {
        let mut buf = Buf::new(2, 2);
        buf.set_init(&vec![0.0; 2], None);
        buf.insert(
            &vec![1.0; 2],
            &vec![0.0; 2],
            None,
            &[0.0; 2],
            &[0.0; 2],
            &[0.0; 2],
            &[true, false],
        )
        .unwrap();
        assert_eq!(buf.masks_at(0), &[true, true]);
        assert_eq!(buf.masks_at(1), &[true, false]);
    }
}
