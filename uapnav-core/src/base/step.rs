//! Environment step.
use super::Env;

/// Additional information attached to a [`Step`].
///
/// Environments expose terminal episode metrics (success, SPL, ...) here:
/// when slot `ix` finished an episode during the step, `scalars(ix)` returns
/// the metrics of that episode, otherwise it returns an empty vector.
pub trait Info {
    /// Scalar metrics of the episode that just finished in slot `ix`.
    fn scalars(&self, ix: usize) -> Vec<(String, f32)> {
        let _ = ix;
        Vec::new()
    }
}

impl Info for () {}

/// The result of one vectorized environment step.
///
/// Carries `(a_t, o_t+1, r_t)` for every slot, with per-slot termination and
/// truncation flags marking episode boundaries.
pub struct Step<E: Env> {
    /// Actions taken.
    pub act: E::Act,

    /// Observations after the step (the first observation of the next
    /// episode for slots that just finished).
    pub obs: E::Obs,

    /// Per-slot rewards.
    pub reward: Vec<f32>,

    /// Per-slot termination flags (1 = episode terminated).
    pub is_terminated: Vec<i8>,

    /// Per-slot truncation flags (1 = step limit reached).
    pub is_truncated: Vec<i8>,

    /// Additional information, including terminal metrics.
    pub info: E::Info,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(
        obs: E::Obs,
        act: E::Act,
        reward: Vec<f32>,
        is_terminated: Vec<i8>,
        is_truncated: Vec<i8>,
        info: E::Info,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
        }
    }

    /// Whether slot `ix` finished its episode at this step.
    #[inline]
    pub fn is_done(&self, ix: usize) -> bool {
        self.is_terminated[ix] == 1 || self.is_truncated[ix] == 1
    }

    /// Per-slot done flags (terminated or truncated).
    pub fn done_flags(&self) -> Vec<i8> {
        (0..self.reward.len())
            .map(|i| self.is_done(i) as i8)
            .collect()
    }
}
