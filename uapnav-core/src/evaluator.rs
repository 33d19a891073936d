//! Evaluate a [`Policy`] over complete episodes.
use crate::{record::Record, Env, Info, Policy};
use anyhow::Result;
mod stats;
pub use stats::{EpisodeStats, EpisodeTracker};

/// Evaluates a [`Policy`].
pub trait Evaluator<E: Env, P: Policy<E>> {
    /// Runs the evaluation and returns aggregated metrics.
    ///
    /// The caller handles the internal mode of `policy`
    /// (training/evaluation).
    fn evaluate(&mut self, policy: &mut P) -> Result<Record>;
}

/// Runs a fixed number of episodes on a vectorized environment and averages
/// per-episode reward and terminal metrics.
///
/// Episodes start from a deterministic index so repeated evaluations see the
/// same episode set.
pub struct EpisodeEvaluator<E: Env> {
    env: E,
    n_episodes: usize,
}

impl<E: Env> EpisodeEvaluator<E> {
    /// Constructs an evaluator running `n_episodes` episodes.
    pub fn new(config: &E::Config, seed: i64, n_episodes: usize) -> Result<Self> {
        Ok(Self {
            env: E::build(config, seed)?,
            n_episodes,
        })
    }

    /// Runs the episodes and returns the per-episode statistics.
    pub fn run<P: Policy<E>>(&mut self, policy: &mut P) -> Result<EpisodeStats> {
        let num_envs = self.env.num_envs();
        let mut tracker = EpisodeTracker::new(num_envs);
        let mut obs = self.env.reset_with_index(0)?;
        policy.reset_state(None);

        while tracker.stats().len() < self.n_episodes {
            let act = policy.sample(&obs);
            let (step, _) = self.env.step(&act);
            tracker.observe(&step.reward);
            for i in 0..num_envs {
                if step.is_done(i) {
                    tracker.finish_episode(i, step.info.scalars(i));
                    log::debug!("Finished evaluation episode {}", tracker.stats().len());
                }
            }
            policy.reset_state(Some(&step.done_flags()));
            obs = step.obs;
        }

        Ok(tracker.into_stats())
    }
}

impl<E, P> Evaluator<E, P> for EpisodeEvaluator<E>
where
    E: Env,
    P: Policy<E>,
{
    fn evaluate(&mut self, policy: &mut P) -> Result<Record> {
        let stats = self.run(policy)?;
        Ok(stats.aggregate())
    }
}
