//! Geometry primitives shared by every calibration stage.

pub mod angle;
mod pose;
mod units;

pub use angle::{angle_diff_ccw, angle_norm, wrap_half_open, wrap_upper_closed};
pub use pose::{Pose, RotationRange};
pub use units::{Length, LengthUnit};
