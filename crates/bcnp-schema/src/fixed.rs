//! Fixed-point encoding of physical quantities.
//!
//! Floats travel as `round(value * scale)` in a big-endian `i32`. Rounding is
//! half-away-from-zero so that `v` and `-v` quantize symmetrically.

use crate::error::FixedPointError;

/// Scale for linear velocity fields (1e-4 m/s resolution).
pub const LINEAR_VELOCITY_SCALE: f64 = 10_000.0;

/// Scale for angular rate fields (1e-4 rad/s resolution).
pub const ANGULAR_VELOCITY_SCALE: f64 = 10_000.0;

/// Convert a float to its fixed-point representation.
///
/// Fails instead of saturating when the scaled value leaves the `i32` range.
pub fn to_fixed(value: f64, scale: f64) -> Result<i32, FixedPointError> {
    if !value.is_finite() || !scale.is_finite() {
        return Err(FixedPointError::NonFinite { value, scale });
    }

    let scaled = (value * scale).round();
    if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
        return Err(FixedPointError::Overflow { value, scale });
    }

    Ok(scaled as i32)
}

/// Convert a fixed-point integer back to a float.
pub fn from_fixed(raw: i32, scale: f64) -> f64 {
    f64::from(raw) / scale
}

/// Largest error a value can pick up from a `to_fixed`/`from_fixed` round trip.
pub fn resolution(scale: f64) -> f64 {
    0.5 / scale
}

/// Scales must be finite and strictly positive.
pub fn is_valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0
}
