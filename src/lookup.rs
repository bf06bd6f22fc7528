// src/lookup.rs
//
// Discretization of the correction volume and the per-node lookup table.
//
// The z axis is single-sided: nodes run over [0, z_max] and every node is
// evaluated twice, once per drift side. Filling the table is the dominant
// one-time cost (nx·ny·nz·2 trajectory integrations) and each node is
// independent, so the build fans out over rayon.

use rayon::prelude::*;
use thiserror::Error;

use crate::constants::DRIFT_LENGTH_CM;
use crate::field::FieldMap;

/// Start points on the cathode plane are nudged to this |z| (cm) before
/// integration; the plane itself is a degenerate start.
const CATHODE_EPS_CM: f64 = 1e-4;

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("correction grid needs at least 2 nodes per axis, got {nx}x{ny}x{nz}")]
    TooFewNodes { nx: usize, ny: usize, nz: usize },
    #[error("correction grid {axis} range is empty or inverted: [{min}, {max}]")]
    EmptyRange { axis: char, min: f64, max: f64 },
    #[error("correction grid z_max must be positive, got {z_max}")]
    NonPositiveZMax { z_max: f64 },
}

/// Node layout of the correction volume (bounds in cm).
#[derive(Debug, Clone, Copy)]
pub struct Grid3 {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// z nodes span [0, z_max]; the drift side carries the sign.
    pub z_max: f64,
}

impl Grid3 {
    pub fn new(
        (nx, ny, nz): (usize, usize, usize),
        x_range: (f64, f64),
        y_range: (f64, f64),
        z_max: f64,
    ) -> Result<Self, GridError> {
        if nx < 2 || ny < 2 || nz < 2 {
            return Err(GridError::TooFewNodes { nx, ny, nz });
        }
        for (axis, (min, max)) in [('x', x_range), ('y', y_range)] {
            if !(max > min) {
                return Err(GridError::EmptyRange { axis, min, max });
            }
        }
        if !(z_max > 0.0) {
            return Err(GridError::NonPositiveZMax { z_max });
        }
        Ok(Self {
            nx,
            ny,
            nz,
            x_min: x_range.0,
            x_max: x_range.1,
            y_min: y_range.0,
            y_max: y_range.1,
            z_max,
        })
    }

    /// Grid over the nominal chamber envelope, ±250 cm on every axis.
    pub fn nominal(nodes: (usize, usize, usize)) -> Result<Self, GridError> {
        Self::new(
            nodes,
            (-DRIFT_LENGTH_CM, DRIFT_LENGTH_CM),
            (-DRIFT_LENGTH_CM, DRIFT_LENGTH_CM),
            DRIFT_LENGTH_CM,
        )
    }

    /// Grid aligned to a field map's mesh: bounds snap outward to the nearest
    /// mesh point at or beyond the nominal ±250 cm envelope, and the node
    /// spacing is the map's own. A map that cannot reach past z = 0 is a
    /// configuration error, not something to clamp away.
    pub fn from_map_bounds(map: &FieldMap) -> Result<Self, GridError> {
        let (dx, dy, dz) = (map.del_x(), map.del_y(), map.del_z());

        let x_min = map.x_min() - ((map.x_min() + DRIFT_LENGTH_CM) / dx).ceil() * dx;
        let x_max = map.x_max() - ((map.x_max() - DRIFT_LENGTH_CM) / dx).floor() * dx;
        let y_min = map.y_min() - ((map.y_min() + DRIFT_LENGTH_CM) / dy).ceil() * dy;
        let y_max = map.y_max() - ((map.y_max() - DRIFT_LENGTH_CM) / dy).floor() * dy;
        let z_max = map.z_max() - ((map.z_max() - DRIFT_LENGTH_CM) / dz).floor() * dz;

        let nx = ((x_max - x_min) / dx + 1.1) as usize;
        let ny = ((y_max - y_min) / dy + 1.1) as usize;
        let nz = (z_max / dz + 1.1) as usize;

        Self::new((nx, ny, nz), (x_min, x_max), (y_min, y_max), z_max)
    }

    #[inline]
    pub fn node_x(&self, i: usize) -> f64 {
        self.x_min + (self.x_max - self.x_min) / (self.nx - 1) as f64 * i as f64
    }

    #[inline]
    pub fn node_y(&self, j: usize) -> f64 {
        self.y_min + (self.y_max - self.y_min) / (self.ny - 1) as f64 * j as f64
    }

    #[inline]
    pub fn node_z(&self, k: usize) -> f64 {
        self.z_max / (self.nz - 1) as f64 * k as f64
    }

    pub fn n_nodes(&self) -> usize {
        self.nx * self.ny * self.nz
    }
}

/// Per-node corrected positions for both drift sides, in one flat arena.
/// `node_index` is the only place that computes offsets into it.
pub struct LookupTable {
    nx: usize,
    ny: usize,
    nz: usize,
    data: Vec<[f64; 3]>,
}

impl LookupTable {
    /// Evaluate `eval` at every node and both drift sides. `side` 1 is the
    /// z > 0 half, `side` 0 its mirror; the node z is nudged off the cathode
    /// plane before mirroring. Nodes are filled in parallel; each flat index
    /// owns exactly one slot.
    pub fn build<F>(grid: &Grid3, eval: F) -> Self
    where
        F: Fn([f64; 3]) -> [f64; 3] + Sync,
    {
        let nz = grid.nz;
        let ny = grid.ny;
        let data: Vec<[f64; 3]> = (0..grid.n_nodes() * 2)
            .into_par_iter()
            .map(|flat| {
                let side = flat % 2;
                let node = flat / 2;
                let iz = node % nz;
                let iy = (node / nz) % ny;
                let ix = node / (nz * ny);

                let z = grid.node_z(iz).max(CATHODE_EPS_CM);
                let z = if side == 0 { -z } else { z };
                eval([grid.node_x(ix), grid.node_y(iy), z])
            })
            .collect();
        Self {
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            data,
        }
    }

    /// Flat index of a node: `((ix·ny + iy)·nz + iz)·2 + side`.
    #[inline]
    pub fn node_index(&self, ix: usize, iy: usize, iz: usize, side: usize) -> usize {
        debug_assert!(ix < self.nx && iy < self.ny && iz < self.nz && side < 2);
        ((ix * self.ny + iy) * self.nz + iz) * 2 + side
    }

    #[inline]
    pub fn get(&self, ix: usize, iy: usize, iz: usize, side: usize) -> [f64; 3] {
        self.data[self.node_index(ix, iy, iz, side)]
    }
}
