//! Point-set fitting used by the runout models.

mod kasa;

pub use kasa::{fit_circle_kasa, CircleFit, MIN_CIRCLE_POINTS};

/// Errors that can occur during fitting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    /// Too few points for the requested operation.
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints {
        /// Required minimum number of points.
        needed: usize,
        /// Provided number of points.
        got: usize,
    },
}
