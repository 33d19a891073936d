//! Vectorized pointgoal navigation on randomly generated occupancy grids.
//!
//! Each environment slot runs one episode: the agent starts at a random free
//! cell, observes a ray-cast depth image and a GPS+compass vector pointing at
//! the goal, and must call stop within the success radius. Slots auto-reset,
//! exposing terminal metrics (success, SPL, distance to goal) through the
//! step's info.
mod base;
mod config;
mod grid;
pub use base::{PointNavEnv, PointNavInfo};
pub use config::PointNavEnvConfig;
pub use grid::Grid;
