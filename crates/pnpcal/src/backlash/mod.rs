//! Per-axis backlash calibration.
//!
//! The calibrator approaches a fiducial from both sides of an axis at
//! several speed factors, estimating the backlash at each speed with damped
//! corrections, then picks a compensation method from how consistent the
//! estimates are across speeds.

mod calibrator;
mod settings;

pub use calibrator::{
    backlash_pass, select_backlash_method, AxisBacklashCalibrator, BacklashConfig, BacklashRig,
    PassOutcome, SpeedResult,
};
pub use settings::{AxisSpec, BacklashAxes, BacklashMethod, BacklashSettings, MovingBody};
