//! Nozzle-tip rotational runout: models, per-tool table and calibration.
//!
//! A nozzle tip that is not perfectly concentric with its rotation axis
//! describes a circle as the nozzle turns. [`NozzleRunoutCalibrator`] sweeps
//! the nozzle through a range of angles above a camera, records the detected
//! tip offsets and fits a [`RunoutCompensation`]. The motion layer later asks
//! [`CompensationTable::offset`] for the correction at each commanded angle.

mod calibrator;
mod model;
mod table;

use serde::{Deserialize, Serialize};

pub use calibrator::{
    CalibrationFlag, CalibrationFlagGuard, NozzleRunoutCalibrator, RunoutCalibrationConfig,
    RunoutOutcome, RunoutRig,
};
pub use model::{phase_shift, CircleModel, RunoutCompensation, RunoutMethod, RunoutSample};
pub use table::CompensationTable;

/// When a stored runout calibration is dropped so it gets redone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalibrationTrigger {
    /// Only on explicit request.
    Manual,
    /// Whenever the tip is unloaded from the nozzle.
    #[default]
    NozzleTipChange,
    /// After every homing cycle.
    MachineHome,
}
