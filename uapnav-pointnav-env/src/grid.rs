//! Occupancy grid with ray casting and geodesic distances.
use std::collections::VecDeque;

const RAY_STEP: f32 = 0.05;

/// A square occupancy grid. Cell `(x, y)` covers the unit square with corner
/// `(x, y)`; the outermost ring is always walled.
#[derive(Clone, Debug)]
pub struct Grid {
    size: usize,
    cells: Vec<bool>,
}

impl Grid {
    /// Generates a bordered grid whose interior cells are obstacles with
    /// probability `density`.
    pub fn generate(size: usize, density: f64, rng: &mut fastrand::Rng) -> Self {
        let mut cells = vec![false; size * size];
        for y in 0..size {
            for x in 0..size {
                let border = x == 0 || y == 0 || x == size - 1 || y == size - 1;
                cells[y * size + x] = border || (rng.f64() < density);
            }
        }
        Self { size, cells }
    }

    /// Builds a grid from explicit occupancy flags (row-major).
    pub fn from_cells(size: usize, cells: Vec<bool>) -> Self {
        assert_eq!(cells.len(), size * size);
        Self { size, cells }
    }

    /// Side length of the grid.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the cell at integer coordinates is an obstacle. Out-of-bounds
    /// coordinates count as occupied.
    pub fn occupied(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.size as i64 || y >= self.size as i64 {
            return true;
        }
        self.cells[y as usize * self.size + x as usize]
    }

    /// Whether the cell containing a continuous position is an obstacle.
    pub fn occupied_at(&self, pos: (f32, f32)) -> bool {
        self.occupied(pos.0.floor() as i64, pos.1.floor() as i64)
    }

    /// Picks a uniformly random free cell center.
    pub fn random_free_cell(&self, rng: &mut fastrand::Rng) -> Option<(f32, f32)> {
        let free: Vec<usize> = (0..self.cells.len()).filter(|&i| !self.cells[i]).collect();
        if free.is_empty() {
            return None;
        }
        let i = free[rng.usize(..free.len())];
        let (x, y) = (i % self.size, i / self.size);
        Some((x as f32 + 0.5, y as f32 + 0.5))
    }

    /// Distance to the first obstacle along a ray, clipped to `max_depth`.
    pub fn raycast(&self, origin: (f32, f32), angle: f32, max_depth: f32) -> f32 {
        let (dx, dy) = (angle.cos(), angle.sin());
        let mut t = RAY_STEP;
        while t < max_depth {
            let p = (origin.0 + t * dx, origin.1 + t * dy);
            if self.occupied_at(p) {
                return t;
            }
            t += RAY_STEP;
        }
        max_depth
    }

    /// Geodesic distances (in cells, 4-connected) from every cell to `goal`.
    /// Unreachable cells get `f32::INFINITY`.
    pub fn distance_field(&self, goal: (f32, f32)) -> Vec<f32> {
        let mut dist = vec![f32::INFINITY; self.cells.len()];
        let (gx, gy) = (goal.0.floor() as i64, goal.1.floor() as i64);
        if self.occupied(gx, gy) {
            return dist;
        }
        let mut queue = VecDeque::new();
        dist[gy as usize * self.size + gx as usize] = 0.0;
        queue.push_back((gx, gy));
        while let Some((x, y)) = queue.pop_front() {
            let d = dist[y as usize * self.size + x as usize];
            for (nx, ny) in [(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)] {
                if !self.occupied(nx, ny) {
                    let i = ny as usize * self.size + nx as usize;
                    if dist[i].is_infinite() {
                        dist[i] = d + 1.0;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }
        dist
    }

    /// Geodesic distance from a continuous position, read off the field.
    pub fn geodesic(&self, field: &[f32], pos: (f32, f32)) -> f32 {
        let (x, y) = (pos.0.floor() as i64, pos.1.floor() as i64);
        if x < 0 || y < 0 || x >= self.size as i64 || y >= self.size as i64 {
            return f32::INFINITY;
        }
        field[y as usize * self.size + x as usize]
    }
}
