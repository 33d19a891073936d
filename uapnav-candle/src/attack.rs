//! Universal adversarial perturbations against a trained navigation policy.
//!
//! A perturbation is one noise tensor per sensor, shared across every step of
//! every episode. Three optimization strategies are provided:
//!
//! * [`AttackStrategy::Uap`] accumulates observation gradients that lower the
//!   probability of the actions the clean policy takes, then projects the sum
//!   onto the attack budget.
//! * [`AttackStrategy::RewardUap`] weights those gradients by the critic's
//!   value estimates and applies normalized updates over several rounds, each
//!   round collecting trajectories under the current noise.
//! * [`AttackStrategy::TrajectoryUap`] keeps a discounted per-slot gradient
//!   accumulator and commits it at episode end, scaled by whether the episode
//!   succeeded, so the noise concentrates on trajectories the policy wins.
mod base;
mod config;
mod perturbation;
pub use base::UapOptimizer;
pub use config::{AttackConfig, AttackStrategy};
pub use perturbation::{PerturbedPolicy, UniversalPerturbation};
