// src/correct.rs
//
// The externally consumed API: build a corrector once, then call correct()
// for every reconstructed space point. correct() is a pure read of the
// lookup table, re-entrant and allocation-free.

use serde::Serialize;
use thiserror::Error;

use crate::constants::{DRIFT_FIELD, DRIFT_LENGTH_CM, EM, INNER_RADIUS_CM, OUTER_RADIUS_CM};
use crate::field::FieldSource;
use crate::integrate::TrajectoryIntegrator;
use crate::lookup::{Grid3, GridError, LookupTable};
use crate::motion::{electric_field, langevin_velocity};

/// How the lookup table is filled. Both strategies produce the same table
/// layout; only the per-node evaluation differs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum BuildStrategy {
    /// Integrate the full equation of motion from every node.
    Exact { steps: usize },
    /// Average B along the nominal straight drift line to the readout plane
    /// and apply the closed-form Langevin displacement for that mean field.
    /// Exact for uniform fields, first-order otherwise, and much cheaper.
    MeanField { samples: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum GridSpec {
    /// Explicit node counts over the nominal ±250 cm envelope.
    Nodes { nx: usize, ny: usize, nz: usize },
    /// Derive bounds and node counts from the field map's own mesh, snapped
    /// outward past the chamber envelope. Requires a map backend.
    FromMap,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CorrectorSettings {
    /// Nominal electron drift velocity (m/s).
    pub drift_velocity: f64,
    pub strategy: BuildStrategy,
    pub grid: GridSpec,
}

impl Default for CorrectorSettings {
    fn default() -> Self {
        Self {
            drift_velocity: 2.66e4, // ~2.66 cm/us
            strategy: BuildStrategy::Exact { steps: 100 },
            grid: GridSpec::Nodes {
                nx: 100,
                ny: 100,
                nz: 100,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("GridSpec::FromMap needs a measured field map, not an analytic model")]
    MapRequired,
    #[error("drift velocity must be positive, got {0}")]
    BadDriftVelocity(f64),
    #[error("the build strategy needs a nonzero step/sample count")]
    EmptyStrategy,
}

/// Owns one immutable lookup table and answers correction queries against it.
pub struct DistortionCorrector {
    grid: Grid3,
    table: LookupTable,
}

impl DistortionCorrector {
    /// Build the table. This is the expensive part: nx·ny·nz·2 node
    /// evaluations, fanned out over rayon. The field source is only needed
    /// here; re-parameterizing drift velocity or field means rebuilding.
    pub fn build(source: &FieldSource, settings: &CorrectorSettings) -> Result<Self, BuildError> {
        if !(settings.drift_velocity > 0.0) {
            return Err(BuildError::BadDriftVelocity(settings.drift_velocity));
        }
        let grid = match settings.grid {
            GridSpec::Nodes { nx, ny, nz } => Grid3::nominal((nx, ny, nz))?,
            GridSpec::FromMap => {
                let map = source.as_map().ok_or(BuildError::MapRequired)?;
                Grid3::from_map_bounds(map)?
            }
        };
        let table = match settings.strategy {
            BuildStrategy::Exact { steps } => {
                if steps == 0 {
                    return Err(BuildError::EmptyStrategy);
                }
                let integ = TrajectoryIntegrator::new(source, settings.drift_velocity, steps);
                LookupTable::build(&grid, |start| integ.corrected(start))
            }
            BuildStrategy::MeanField { samples } => {
                if samples == 0 {
                    return Err(BuildError::EmptyStrategy);
                }
                let vd = settings.drift_velocity;
                LookupTable::build(&grid, |start| {
                    mean_field_endpoint(source, vd, samples, start)
                })
            }
        };
        Ok(Self { grid, table })
    }

    pub fn grid(&self) -> &Grid3 {
        &self.grid
    }

    /// Whether a point is inside the active volume the corrector covers.
    pub fn in_volume(position: [f64; 3]) -> bool {
        let r = (position[0] * position[0] + position[1] * position[1]).sqrt();
        position[2].abs() <= DRIFT_LENGTH_CM && (INNER_RADIUS_CM..=OUTER_RADIUS_CM).contains(&r)
    }

    /// Correct a reconstructed space point (cm). Points outside the active
    /// volume pass through unchanged; everything else is the trilinear
    /// weighted sum over the 8 surrounding table nodes, with the lower cell
    /// index clamped to [0, N−2] so edge queries never leave the table.
    pub fn correct(&self, position: [f64; 3]) -> [f64; 3] {
        if !Self::in_volume(position) {
            return position;
        }
        let g = &self.grid;

        let (xi, fx) = cell(
            (position[0] - g.x_min) / (g.x_max - g.x_min) * (g.nx - 1) as f64,
            g.nx,
        );
        let (yi, fy) = cell(
            (position[1] - g.y_min) / (g.y_max - g.y_min) * (g.ny - 1) as f64,
            g.ny,
        );

        // z folds onto the single-sided axis; the side picks the table half
        let mut z = position[2] / g.z_max * (g.nz - 1) as f64;
        let side = if z > 0.0 {
            1
        } else {
            z = -z;
            0
        };
        let (zi, fz) = cell(z, g.nz);

        let mut out = [0.0; 3];
        for (ix, wx) in [(xi, 1.0 - fx), (xi + 1, fx)] {
            for (iy, wy) in [(yi, 1.0 - fy), (yi + 1, fy)] {
                for (iz, wz) in [(zi, 1.0 - fz), (zi + 1, fz)] {
                    let node = self.table.get(ix, iy, iz, side);
                    let w = wx * wy * wz;
                    for i in 0..3 {
                        out[i] += w * node[i];
                    }
                }
            }
        }
        out
    }
}

/// Lower cell index (clamped to [0, n−2]) and the fractional weight toward
/// the upper node. The fraction is left unclamped so points between the
/// outermost node and the volume boundary extrapolate, as the table's edge
/// cells are built to cover them.
#[inline]
fn cell(s: f64, n: usize) -> (usize, f64) {
    let i = (s as isize).clamp(0, n as isize - 2) as usize;
    (i, s - i as f64)
}

/// Mean-field table entry: B averaged along the nominal straight drift line
/// from the start to the readout plane, then the closed-form displacement
/// for that constant field, with the same drift-time z and fold-back
/// conventions as the exact integrator.
fn mean_field_endpoint(
    source: &FieldSource,
    drift_velocity: f64,
    samples: usize,
    start_cm: [f64; 3],
) -> [f64; 3] {
    if start_cm[2].abs() >= DRIFT_LENGTH_CM {
        return start_cm;
    }
    let plane_sign = if start_cm[2] < 0.0 { -1.0 } else { 1.0 };
    let z_end = plane_sign * DRIFT_LENGTH_CM;

    let mut b_mean = [0.0; 3];
    for k in 0..samples {
        let f = (k as f64 + 0.5) / samples as f64;
        let z = start_cm[2] + f * (z_end - start_cm[2]);
        let b = source.field([start_cm[0], start_cm[1], z]);
        for i in 0..3 {
            b_mean[i] += b[i];
        }
    }
    for i in 0..3 {
        b_mean[i] /= samples as f64;
    }

    let tau = drift_velocity / DRIFT_FIELD / EM;
    let e_raw = electric_field([0.0, 0.0, start_cm[2] * 0.01]);
    let w = [EM * b_mean[0], EM * b_mean[1], EM * b_mean[2]];
    let e = [EM * e_raw[0], EM * e_raw[1], EM * e_raw[2]];
    let v = langevin_velocity(w, e, tau);

    // time to cover the remaining axial drift at velocity v (SI)
    let t_cross = (z_end - start_cm[2]) * 0.01 / v[2];
    let xd = start_cm[0] + v[0] * t_cross * 100.0;
    let yd = start_cm[1] + v[1] * t_cross * 100.0;
    let time_sign = if start_cm[2] > 0.0 { -1.0 } else { 1.0 };
    let zd = time_sign * t_cross * drift_velocity * 100.0 + plane_sign * DRIFT_LENGTH_CM;

    [
        start_cm[0] - (xd - start_cm[0]),
        start_cm[1] - (yd - start_cm[1]),
        zd,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldMap, UniformField};

    fn model(b: [f64; 3]) -> FieldSource {
        FieldSource::Model(Box::new(UniformField(b)))
    }

    fn small_settings() -> CorrectorSettings {
        CorrectorSettings {
            drift_velocity: 2.66e4,
            strategy: BuildStrategy::Exact { steps: 30 },
            grid: GridSpec::Nodes { nx: 5, ny: 5, nz: 5 },
        }
    }

    #[test]
    fn build_rejects_bad_configuration() {
        let src = model([0.0, 0.0, 0.5]);

        let mut s = small_settings();
        s.drift_velocity = 0.0;
        assert!(matches!(
            DistortionCorrector::build(&src, &s),
            Err(BuildError::BadDriftVelocity(_))
        ));

        let mut s = small_settings();
        s.strategy = BuildStrategy::Exact { steps: 0 };
        assert!(matches!(
            DistortionCorrector::build(&src, &s),
            Err(BuildError::EmptyStrategy)
        ));

        let mut s = small_settings();
        s.grid = GridSpec::Nodes { nx: 1, ny: 5, nz: 5 };
        assert!(matches!(
            DistortionCorrector::build(&src, &s),
            Err(BuildError::Grid(GridError::TooFewNodes { .. }))
        ));

        let mut s = small_settings();
        s.grid = GridSpec::FromMap;
        assert!(matches!(
            DistortionCorrector::build(&src, &s),
            Err(BuildError::MapRequired)
        ));
    }

    #[test]
    fn from_map_grid_uses_the_map_mesh() {
        let map = FieldMap::from_fn(
            (13, 13, 7),
            (-300.0, 300.0),
            (-300.0, 300.0),
            (0.0, 300.0),
            |_| [0.0, 0.0, 0.5],
        )
        .unwrap();
        let src = FieldSource::Map(map);
        let mut s = small_settings();
        s.grid = GridSpec::FromMap;

        let corrector = DistortionCorrector::build(&src, &s).unwrap();
        let g = corrector.grid();
        assert!(g.x_min <= -250.0 && g.x_max >= 250.0);
        assert!(g.z_max >= 250.0);
    }

    #[test]
    fn volume_predicate_matches_the_acceptance() {
        assert!(DistortionCorrector::in_volume([150.0, 0.0, 100.0]));
        assert!(DistortionCorrector::in_volume([90.0, 0.0, -250.0]));
        assert!(!DistortionCorrector::in_volume([150.0, 0.0, 250.1]));
        assert!(!DistortionCorrector::in_volume([50.0, 0.0, 0.0])); // r < 90
        assert!(!DistortionCorrector::in_volume([200.0, 200.0, 0.0])); // r > 250
    }

    #[test]
    fn cell_clamps_to_the_last_interior_index() {
        assert_eq!(cell(-0.5, 5), (0, -0.5));
        assert_eq!(cell(0.0, 5), (0, 0.0));
        let (i, f) = cell(2.25, 5);
        assert_eq!(i, 2);
        assert!((f - 0.25).abs() < 1e-12);
        assert_eq!(cell(4.0, 5), (3, 1.0));
        // beyond the last node: index stays clamped, the fraction extrapolates
        let (i, f) = cell(4.7, 5);
        assert_eq!(i, 3);
        assert!((f - 1.7).abs() < 1e-12);
    }
}
