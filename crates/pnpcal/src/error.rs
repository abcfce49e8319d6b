//! Crate-wide error type for calibrations and alignment.

use crate::fit::FitError;
use crate::machine::MachineError;

/// Failure of a calibration or alignment run.
///
/// Precondition variants are returned before any motion is issued.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("{0} is disabled")]
    Disabled(String),
    #[error("machine is not homed")]
    NotHomed,
    #[error("nozzle {nozzle} carries tip {loaded:?}, calibration is set up for tip {expected}")]
    TipMismatch {
        nozzle: String,
        expected: String,
        loaded: Option<String>,
    },
    #[error("nozzle {0} has no runout calibration yet; calibrate the nozzle tip first")]
    NotCalibrated(String),
    #[error("a calibration is already in progress")]
    AlreadyCalibrating,
    #[error("height of part {0} is unknown and no auto focus is available")]
    PartHeightUnknown(String),

    #[error("insufficient vision results: {got} valid, {needed} needed")]
    InsufficientVisionResults { got: usize, needed: usize },
    #[error("camera {0} did not detect the feature")]
    NoDetection(String),
    #[error("expected a {expected} from the vision pipeline, got a {got}")]
    UnexpectedPipelineResult {
        expected: &'static str,
        got: &'static str,
    },

    #[error(
        "incorrect part size for {part}: measured {measured_px:.1?} px, expected {expected_px:.1?} px within {tolerance_percent}%"
    )]
    IncorrectPartSize {
        part: String,
        /// `[longer, shorter]` side of the detected outline.
        measured_px: [f64; 2],
        /// `[longer, shorter]` side expected from the footprint.
        expected_px: [f64; 2],
        tolerance_percent: f64,
    },
    #[error(
        "axis {axis} backlash: first-pass error {error_mm:.4} mm at speed {speed} is outside the {tolerance_mm:.4} mm tolerance; cannot compensate; check acceleration/jerk control"
    )]
    AxisCannotBeCompensated {
        axis: String,
        /// Slowest speed factor whose result broke consistency.
        speed: f64,
        /// Error measured on the first pass at `speed`.
        error_mm: f64,
        tolerance_mm: f64,
    },

    #[error(transparent)]
    Machine(#[from] MachineError),
    #[error(transparent)]
    Fit(#[from] FitError),

    #[error("calibration cancelled")]
    Cancelled,
}
