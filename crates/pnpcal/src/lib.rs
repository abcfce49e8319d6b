//! pnpcal — calibration and vision-guided alignment engine for
//! pick-and-place machines.
//!
//! The crate turns noisy vision measurements into corrections for the
//! mechanical imperfections of a placement head:
//!
//! 1. **Runout** – nozzle-tip rotational runout: sweep, circle fit, and a
//!    per-tool compensation table queried on every move.
//! 2. **Bottom vision** – iterative pose correction of a part held over an
//!    up-looking camera.
//! 3. **Backlash** – bidirectional approach tests across speed factors and
//!    selection of a compensation method per axis.
//! 4. **Symmetry** – the circular-symmetry detector used to locate nozzle
//!    tips and round fiducials.
//!
//! Motion and image capture stay outside the crate. Calibrations drive them
//! through the [`machine::Movable`], [`machine::Nozzle`] and
//! [`vision::VisionPipeline`] traits.

pub mod backlash;
pub mod bottom_vision;
pub mod config;
pub mod error;
pub mod fit;
pub mod geometry;
pub mod machine;
pub mod runout;
pub mod symmetry;
pub mod vision;

#[cfg(test)]
mod test_utils;

pub use config::{CalibrationConfig, ConfigError};
pub use error::CalibrationError;
pub use geometry::{Length, LengthUnit, Pose};
pub use symmetry::{find_circular_symmetry, SymmetryCircle, SymmetryParams};
