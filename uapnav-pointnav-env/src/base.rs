//! The vectorized pointgoal navigation environment.
use crate::{config::PointNavEnvConfig, grid::Grid};
use anyhow::Result;
use candle_core::{Device, Tensor};
use log::trace;
use std::collections::BTreeMap;
use std::f32::consts::PI;
use uapnav_core::{record::Record, Env, Info, Step};
use uapnav_candle::{DiscreteAct, SensorObs};

/// Stop ends the episode; success requires stopping within the success
/// radius.
pub const ACTION_STOP: i64 = 0;
/// Move forward by the configured step, blocked by obstacles.
pub const ACTION_FORWARD: i64 = 1;
/// Rotate left by the configured turn angle.
pub const ACTION_LEFT: i64 = 2;
/// Rotate right by the configured turn angle.
pub const ACTION_RIGHT: i64 = 3;

const EPISODE_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

fn wrap_angle(a: f32) -> f32 {
    let mut a = a;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// One episode in flight.
struct Slot {
    grid: Grid,
    field: Vec<f32>,
    pos: (f32, f32),
    heading: f32,
    goal: (f32, f32),
    steps: usize,
    walked: f32,
    geodesic_start: f32,
}

impl Slot {
    fn new(config: &PointNavEnvConfig, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        // Retry generation until start and goal are connected and the start
        // is outside the success radius.
        for attempt in 0.. {
            let density = if attempt < 100 {
                config.obstacle_density
            } else {
                0.0
            };
            let grid = Grid::generate(config.map_size, density, &mut rng);
            let (start, goal) = match (
                grid.random_free_cell(&mut rng),
                grid.random_free_cell(&mut rng),
            ) {
                (Some(s), Some(g)) => (s, g),
                _ => continue,
            };
            let field = grid.distance_field(goal);
            let geodesic_start = grid.geodesic(&field, start);
            if geodesic_start.is_finite() && geodesic_start > config.success_distance {
                let heading = rng.f32() * 2.0 * PI;
                return Self {
                    grid,
                    field,
                    pos: start,
                    heading,
                    goal,
                    steps: 0,
                    walked: 0.0,
                    geodesic_start,
                };
            }
        }
        unreachable!()
    }

    fn geodesic(&self) -> f32 {
        self.grid.geodesic(&self.field, self.pos)
    }

    fn pointgoal(&self) -> [f32; 2] {
        let (dx, dy) = (self.goal.0 - self.pos.0, self.goal.1 - self.pos.1);
        let distance = (dx * dx + dy * dy).sqrt();
        let angle = wrap_angle(dy.atan2(dx) - self.heading);
        [distance, angle]
    }
}

/// Terminal metrics of episodes that finished during a step.
pub struct PointNavInfo {
    metrics: Vec<Option<Vec<(String, f32)>>>,
}

impl Info for PointNavInfo {
    fn scalars(&self, ix: usize) -> Vec<(String, f32)> {
        self.metrics[ix].clone().unwrap_or_default()
    }
}

/// Vectorized pointgoal navigation over randomly generated occupancy grids.
pub struct PointNavEnv {
    config: PointNavEnvConfig,
    base_seed: u64,
    episode_counter: u64,
    slots: Vec<Slot>,
}

impl PointNavEnv {
    fn next_seed(&mut self) -> u64 {
        self.episode_counter += 1;
        self.base_seed
            .wrapping_add(self.episode_counter.wrapping_mul(EPISODE_SEED_STRIDE))
    }

    fn new_slot(&mut self) -> Slot {
        let seed = self.next_seed();
        Slot::new(&self.config, seed)
    }

    fn observe(&self) -> Result<SensorObs> {
        let n = self.config.num_envs;
        let res = self.config.resolution;
        let mut depth = Vec::with_capacity(n * res * res);
        let mut goal = Vec::with_capacity(n * 2);

        for slot in self.slots.iter() {
            // One ray per column, replicated over rows.
            let mut columns = Vec::with_capacity(res);
            for j in 0..res {
                let angle = slot.heading - self.config.fov / 2.0
                    + self.config.fov * (j as f32 + 0.5) / res as f32;
                let d = slot.grid.raycast(slot.pos, angle, self.config.max_depth);
                columns.push(d / self.config.max_depth);
            }
            for _ in 0..res {
                depth.extend_from_slice(&columns);
            }
            goal.extend_from_slice(&slot.pointgoal());
        }

        Ok(SensorObs::new(BTreeMap::from([
            (
                "depth".to_string(),
                Tensor::from_vec(depth, (n, res, res, 1), &Device::Cpu)?,
            ),
            (
                "pointgoal_with_gps_compass".to_string(),
                Tensor::from_vec(goal, (n, 2), &Device::Cpu)?,
            ),
        ])))
    }
}

impl Env for PointNavEnv {
    type Config = PointNavEnvConfig;
    type Obs = SensorObs;
    type Act = DiscreteAct;
    type Info = PointNavInfo;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        // The longest geodesic on an obstacle-free map runs corner to corner
        // through the interior, 2 * (map_size - 3) cells. Episode generation
        // requires a start beyond the success radius, so smaller maps can
        // never produce a valid episode.
        let reach = 2.0 * config.map_size.saturating_sub(3) as f32;
        anyhow::ensure!(
            reach > config.success_distance,
            "map size {} cannot place a start beyond the success distance {}",
            config.map_size,
            config.success_distance
        );
        let mut env = Self {
            config: config.clone(),
            base_seed: seed as u64,
            episode_counter: 0,
            slots: Vec::new(),
        };
        env.slots = (0..config.num_envs).map(|_| env.new_slot()).collect();
        Ok(env)
    }

    fn num_envs(&self) -> usize {
        self.config.num_envs
    }

    fn step(&mut self, a: &DiscreteAct) -> (Step<Self>, Record) {
        let n = self.config.num_envs;
        let mut reward = vec![0.0f32; n];
        let mut is_terminated = vec![0i8; n];
        let mut is_truncated = vec![0i8; n];
        let mut metrics: Vec<Option<Vec<(String, f32)>>> = (0..n).map(|_| None).collect();

        for i in 0..n {
            let slot = &mut self.slots[i];
            let prev_geodesic = slot.geodesic();
            reward[i] = self.config.slack_reward;

            match a.0[i] {
                ACTION_STOP => {
                    is_terminated[i] = 1;
                }
                ACTION_FORWARD => {
                    let next = (
                        slot.pos.0 + self.config.forward_step * slot.heading.cos(),
                        slot.pos.1 + self.config.forward_step * slot.heading.sin(),
                    );
                    if !slot.grid.occupied_at(next) {
                        slot.pos = next;
                        slot.walked += self.config.forward_step;
                    }
                }
                ACTION_LEFT => slot.heading = wrap_angle(slot.heading - self.config.turn_angle),
                ACTION_RIGHT => slot.heading = wrap_angle(slot.heading + self.config.turn_angle),
                other => trace!("Ignoring unknown action {} in slot {}", other, i),
            }

            slot.steps += 1;
            let distance_to_goal = slot.geodesic();
            reward[i] += prev_geodesic - distance_to_goal;

            if is_terminated[i] == 0 && slot.steps >= self.config.max_steps {
                is_truncated[i] = 1;
            }

            if is_terminated[i] == 1 || is_truncated[i] == 1 {
                let success =
                    is_terminated[i] == 1 && distance_to_goal <= self.config.success_distance;
                if success {
                    reward[i] += self.config.success_reward;
                }
                let success = success as u8 as f32;
                let spl = success * slot.geodesic_start
                    / slot.geodesic_start.max(slot.walked).max(f32::EPSILON);
                metrics[i] = Some(vec![
                    ("success".to_string(), success),
                    ("spl".to_string(), spl),
                    ("distance_to_goal".to_string(), distance_to_goal),
                ]);
            }
        }

        // Auto-reset finished slots before emitting observations.
        for i in 0..n {
            if metrics[i].is_some() {
                self.slots[i] = self.new_slot();
            }
        }

        let obs = self.observe().expect("observation assembly failed");
        let step = Step::new(
            obs,
            a.clone(),
            reward,
            is_terminated,
            is_truncated,
            PointNavInfo { metrics },
        );
        (step, Record::empty())
    }

    fn reset(&mut self) -> Result<SensorObs> {
        self.slots = (0..self.config.num_envs)
            .map(|_| self.new_slot())
            .collect::<Vec<_>>();
        self.observe()
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<SensorObs> {
        self.episode_counter = (ix as u64).wrapping_mul(1_000_003);
        self.reset()
    }
}
