//! Configuration of [`PointNavEnv`](crate::PointNavEnv).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PointNavEnv`](crate::PointNavEnv).
///
/// Distances are in grid cells.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PointNavEnvConfig {
    /// Number of parallel environment slots.
    pub num_envs: usize,

    /// Side length of the square occupancy grid.
    pub map_size: usize,

    /// Fraction of interior cells turned into obstacles.
    pub obstacle_density: f64,

    /// Height and width of the square depth image.
    pub resolution: usize,

    /// Horizontal field of view of the depth sensor, radians.
    pub fov: f32,

    /// Clipping range of the depth sensor.
    pub max_depth: f32,

    /// Episode step limit.
    pub max_steps: usize,

    /// Distance within which calling stop succeeds.
    pub success_distance: f32,

    /// Distance moved by the forward action.
    pub forward_step: f32,

    /// Rotation of the turn actions, radians.
    pub turn_angle: f32,

    /// Per-step reward penalty.
    pub slack_reward: f32,

    /// Reward for stopping within the success radius.
    pub success_reward: f32,
}

impl Default for PointNavEnvConfig {
    fn default() -> Self {
        Self {
            num_envs: 2,
            map_size: 16,
            obstacle_density: 0.1,
            resolution: 64,
            fov: std::f32::consts::FRAC_PI_2,
            max_depth: 10.0,
            max_steps: 100,
            success_distance: 1.0,
            forward_step: 0.5,
            turn_angle: std::f32::consts::FRAC_PI_6,
            slack_reward: -0.01,
            success_reward: 2.5,
        }
    }
}

impl PointNavEnvConfig {
    /// Sets the number of parallel slots.
    pub fn num_envs(mut self, v: usize) -> Self {
        self.num_envs = v;
        self
    }

    /// Sets the grid side length.
    pub fn map_size(mut self, v: usize) -> Self {
        self.map_size = v;
        self
    }

    /// Sets the depth image resolution.
    pub fn resolution(mut self, v: usize) -> Self {
        self.resolution = v;
        self
    }

    /// Sets the episode step limit.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the obstacle density.
    pub fn obstacle_density(mut self, v: f64) -> Self {
        self.obstacle_density = v;
        self
    }

    /// Constructs [`PointNavEnvConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PointNavEnvConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
