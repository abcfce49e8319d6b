//! Angle normalization helpers (degrees).

/// Wrap `value` into `[-limit, limit]` by whole steps of `2 * limit`.
///
/// With `limit = 45` this resolves the 90° symmetry of a rectangle, with
/// `limit = 180` it is the usual signed angle range.
pub fn angle_norm(value: f64, limit: f64) -> f64 {
    let span = 2.0 * limit;
    if !value.is_finite() || span <= 0.0 {
        return value;
    }
    let mut v = value;
    if v > limit || v < -limit {
        v = (v + limit).rem_euclid(span) - limit;
        // rem_euclid maps +limit to -limit; keep the sign of the input there.
        if v == -limit && value > 0.0 {
            v = limit;
        }
    }
    v
}

/// Wrap into `[-180, 180)`.
pub fn wrap_half_open(value: f64) -> f64 {
    (value + 180.0).rem_euclid(360.0) - 180.0
}

/// Wrap into `(-180, 180]`.
pub fn wrap_upper_closed(value: f64) -> f64 {
    let v = wrap_half_open(value);
    if v == -180.0 {
        180.0
    } else {
        v
    }
}

/// Counter-clockwise angular distance from `from` to `to`, in `[0, 360)`.
pub fn angle_diff_ccw(from: f64, to: f64) -> f64 {
    (to - from).rem_euclid(360.0)
}
