//! Motion capabilities the calibrations drive.
//!
//! The crate never talks to a controller directly. Calibrations receive
//! `&mut dyn` handles implementing these traits and issue strictly ordered,
//! blocking moves through them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geometry::Pose;

/// Failure reported by a motion or vision collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MachineError {
    /// A move did not complete.
    #[error("motion of {id} failed: {message}")]
    Motion { id: String, message: String },
    /// Capture or pipeline processing failed.
    #[error("vision on camera {camera} failed: {message}")]
    Vision { camera: String, message: String },
    /// Auto focus could not settle on a height.
    #[error("auto focus failed: {0}")]
    Focus(String),
}

/// Anything the machine can position: a nozzle, a head-mounted camera.
pub trait Movable {
    /// Stable identity, used as the key of per-tool tables.
    fn id(&self) -> &str;

    /// Current commanded location.
    fn location(&self) -> Pose;

    /// Move to `pose` at `speed` (fraction of the nominal feed rate, `0..=1`)
    /// and wait until the move completes.
    fn move_to(&mut self, pose: &Pose, speed: f64) -> Result<(), MachineError>;

    /// Raise to the safe travel height, keeping X/Y and rotation.
    fn move_to_safe_z(&mut self) -> Result<(), MachineError>;
}

/// A nozzle with an exchangeable tip.
pub trait Nozzle: Movable {
    /// Name of the tip currently loaded, `None` when bare.
    fn loaded_tip(&self) -> Option<&str>;
}

/// Cooperative cancellation shared between a calibration and its caller.
///
/// Calibrations check the token between steps; the cleanup of a cancelled
/// calibration still runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let seen_by_worker = token.clone();
        assert!(!seen_by_worker.is_cancelled());
        token.cancel();
        assert!(seen_by_worker.is_cancelled());
    }

    #[test]
    fn machine_error_messages_name_the_collaborator() {
        let err = MachineError::Motion {
            id: "N1".to_string(),
            message: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "motion of N1 failed: timeout");
    }
}
