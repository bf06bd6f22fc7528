// src/integrate.rs
//
// Fixed-step Euler integration of one drift electron from its production
// point to the readout plane. The accuracy trade-off is step count, not
// integrator order; with the default few hundred steps the residual is well
// below the lookup-table resolution.

use crate::constants::DRIFT_LENGTH_CM;
use crate::field::FieldSource;
use crate::motion::MotionModel;

pub struct TrajectoryIntegrator<'a> {
    motion: MotionModel<'a>,
    drift_velocity: f64,
    steps: usize,
}

impl<'a> TrajectoryIntegrator<'a> {
    /// `steps` is the number of Euler steps that nominally traverse the full
    /// drift length; the step size is derived from it.
    pub fn new(source: &'a FieldSource, drift_velocity: f64, steps: usize) -> Self {
        Self {
            motion: MotionModel::new(source, drift_velocity),
            drift_velocity,
            steps,
        }
    }

    /// Where a hit produced at `start_cm` is actually observed.
    ///
    /// x and y come from the trajectory's end-plane crossing, found by linear
    /// interpolation of the overshooting step. z is reconstructed from the
    /// elapsed drift time, which is numerically more stable along the drift
    /// axis than extrapolating the last spatial step. If the start is already
    /// at or past the readout plane the input is returned unchanged.
    pub fn distorted(&self, start_cm: [f64; 3]) -> [f64; 3] {
        let half = 0.01 * DRIFT_LENGTH_CM; // m
        let h = 0.01 * DRIFT_LENGTH_CM / self.drift_velocity / self.steps as f64;

        let mut t = 0.0;
        let mut xt = [start_cm[0] * 0.01, start_cm[1] * 0.01, start_cm[2] * 0.01];
        let mut xo = xt;
        while xt[2].abs() < half {
            xo = xt;
            let v = self.motion.velocity(xt);
            for i in 0..3 {
                xt[i] += h * v[i];
            }
            t += h;
        }
        if t == 0.0 {
            return start_cm;
        }

        // fraction of the last step up to the exact |z| = half crossing
        let z_end = if xt[2] < 0.0 { -half } else { half };
        let p = (z_end - xo[2]) / (xt[2] - xo[2]);

        let mut dist = [0.0; 3];
        dist[0] = (xo[0] + p * (xt[0] - xo[0])) * 100.0;
        dist[1] = (xo[1] + p * (xt[1] - xo[1])) * 100.0;
        let t_cross = t - h + p * h;
        let time_sign = if start_cm[2] > 0.0 { -1.0 } else { 1.0 };
        let plane_sign = if start_cm[2] < 0.0 { -1.0 } else { 1.0 };
        dist[2] = time_sign * t_cross * self.drift_velocity * 100.0 + plane_sign * DRIFT_LENGTH_CM;
        dist
    }

    /// Lookup-table entry for `start_cm`: the forward distortion folded back
    /// around the start, `corrected = start − (distorted − start)` in x and y.
    /// The z component keeps the drift-time reconstruction as is.
    pub fn corrected(&self, start_cm: [f64; 3]) -> [f64; 3] {
        let d = self.distorted(start_cm);
        [
            start_cm[0] - (d[0] - start_cm[0]),
            start_cm[1] - (d[1] - start_cm[1]),
            d[2],
        ]
    }
}
