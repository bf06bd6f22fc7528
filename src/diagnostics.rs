// src/diagnostics.rs
//
// Offline validation: sweep a coarse 3D grid over the chamber, correct every
// point through the lookup table AND through direct integration, and write
// per-point residuals as CSV (cartesian deltas plus radial/azimuthal views).
// QA utility only, nothing here runs in the hot path.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::constants::DRIFT_LENGTH_CM;
use crate::correct::DistortionCorrector;
use crate::field::FieldSource;
use crate::integrate::TrajectoryIntegrator;

#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    /// Scan pitch (cm) on every axis.
    pub spacing: f64,
    /// Step count for the reference integration.
    pub steps: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            spacing: 10.0,
            steps: 100,
        }
    }
}

/// Table-vs-integration residual statistics over the in-volume scan points.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSummary {
    pub points: usize,
    /// max |table − exact| per component (cm)
    pub max_abs: [f64; 3],
    /// rms of the same (cm)
    pub rms: [f64; 3],
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(())
}

/// Scan the chamber volume and write one CSV row per point. Out-of-volume
/// points are written too (both corrections pass them through); the returned
/// summary covers only the in-volume ones.
pub fn write_residual_scan(
    path: &Path,
    source: &FieldSource,
    corrector: &DistortionCorrector,
    drift_velocity: f64,
    scan: &ScanSettings,
) -> std::io::Result<ScanSummary> {
    ensure_parent_dir(path)?;
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    let integ = TrajectoryIntegrator::new(source, drift_velocity, scan.steps);

    writeln!(w, "x0,x1,x2,dx,dy,dz,dnlx,dnly,dnlz,r,phi,dr,drphi")?;

    let n = (2.0 * DRIFT_LENGTH_CM / scan.spacing) as usize + 1;
    let mut summary = ScanSummary::default();
    let mut sum_sq = [0.0; 3];

    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let x = [
                    -DRIFT_LENGTH_CM + scan.spacing * i as f64,
                    -DRIFT_LENGTH_CM + scan.spacing * j as f64,
                    -DRIFT_LENGTH_CM + scan.spacing * k as f64,
                ];
                let d = corrector.correct(x);
                let dnl = integ.corrected(x);

                let r = (x[0] * x[0] + x[1] * x[1]).sqrt();
                let rd = (d[0] * d[0] + d[1] * d[1]).sqrt();
                let dr = r - rd;
                let phi = x[0].atan2(x[1]);
                let phid = d[0].atan2(d[1]);
                let mut dphi = phi - phid;
                if dphi < 0.0 {
                    dphi += std::f64::consts::TAU;
                }
                if dphi > std::f64::consts::PI {
                    dphi = std::f64::consts::TAU - dphi;
                }
                let drphi = r * dphi;

                writeln!(
                    w,
                    "{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e}",
                    x[0],
                    x[1],
                    x[2],
                    x[0] - d[0],
                    x[1] - d[1],
                    x[2] - d[2],
                    x[0] - dnl[0],
                    x[1] - dnl[1],
                    x[2] - dnl[2],
                    r,
                    phi,
                    dr,
                    drphi
                )?;

                if DistortionCorrector::in_volume(x) {
                    summary.points += 1;
                    for c in 0..3 {
                        let res = (d[c] - dnl[c]).abs();
                        if res > summary.max_abs[c] {
                            summary.max_abs[c] = res;
                        }
                        sum_sq[c] += res * res;
                    }
                }
            }
        }
    }

    if summary.points > 0 {
        for c in 0..3 {
            summary.rms[c] = (sum_sq[c] / summary.points as f64).sqrt();
        }
    }
    w.flush()?;
    Ok(summary)
}
