// src/constants.rs
//
// Shared physical constants. All integration happens in SI units; the public
// API speaks centimeters (see integrate.rs for the conversion points).

/// Electron charge-to-mass ratio e/m (C/kg).
pub const EM: f64 = 1.602176487e-19 / 9.10938215e-31;

/// Magnitude of the axial drift field (V/m). The sign flips across the
/// central cathode plane at z = 0.
pub const DRIFT_FIELD: f64 = 40.0e3;

/// Drift length from the central cathode to either readout plane (cm).
pub const DRIFT_LENGTH_CM: f64 = 250.0;

/// Inner radius of the active volume (cm); points below pass through
/// uncorrected.
pub const INNER_RADIUS_CM: f64 = 90.0;

/// Outer radius of the active volume (cm).
pub const OUTER_RADIUS_CM: f64 = 250.0;
