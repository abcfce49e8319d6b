//! Rotation sweep that measures nozzle-tip runout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::model::{CircleModel, RunoutCompensation, RunoutMethod, RunoutSample};
use super::table::CompensationTable;
use super::RecalibrationTrigger;
use crate::error::CalibrationError;
use crate::fit::MIN_CIRCLE_POINTS;
use crate::geometry::{Length, Pose};
use crate::machine::{CancelToken, Movable, Nozzle};
use crate::vision::{Camera, PipelineResult, VisionPipeline, VisionPurpose, VisionRequest};

/// Runout calibration settings of one nozzle tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunoutCalibrationConfig {
    pub enabled: bool,
    /// Variant stored after a nozzle sweep.
    pub method: RunoutMethod,
    /// First commanded angle of the sweep, degrees.
    pub angle_start: f64,
    /// Last commanded angle of the sweep, degrees.
    pub angle_stop: f64,
    /// Number of angular steps between start and stop.
    pub subdivisions: usize,
    /// Sweep positions that may come back without a detection.
    pub allowed_misdetections: usize,
    /// Added to the camera Z to get the calibration height.
    pub calibration_z_offset: Length,
    /// Orbit radius around the camera center when calibrating the camera.
    pub camera_orbit_radius: Length,
    /// Speed factor for every move of the sweep.
    pub motion_speed: f64,
    pub recalibration: RecalibrationTrigger,
}

impl Default for RunoutCalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: RunoutMethod::Model,
            angle_start: -180.0,
            angle_stop: 180.0,
            subdivisions: 6,
            allowed_misdetections: 0,
            calibration_z_offset: Length::mm(0.0),
            camera_orbit_radius: Length::mm(1.0),
            motion_speed: 1.0,
            recalibration: RecalibrationTrigger::NozzleTipChange,
        }
    }
}

/// "Calibration in progress" marker shared with the motion layer.
///
/// Moves issued while the flag is set must not trigger an automatic
/// recalibration of their own.
#[derive(Debug, Clone, Default)]
pub struct CalibrationFlag(Arc<AtomicBool>);

impl CalibrationFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag; `None` if it was already set.
    pub fn try_acquire(&self) -> Option<CalibrationFlagGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CalibrationFlagGuard(self))
    }
}

/// Clears the [`CalibrationFlag`] when dropped.
#[derive(Debug)]
pub struct CalibrationFlagGuard<'a>(&'a CalibrationFlag);

impl Drop for CalibrationFlagGuard<'_> {
    fn drop(&mut self) {
        self.0 .0.store(false, Ordering::SeqCst);
    }
}

/// Collaborators of one calibration run.
pub struct RunoutRig<'a> {
    pub nozzle: &'a mut dyn Nozzle,
    /// Camera looking up at the nozzle; updated in camera mode.
    pub camera: &'a mut Camera,
    pub vision: &'a mut dyn VisionPipeline,
    pub table: &'a mut CompensationTable,
    pub machine_homed: bool,
    pub cancel: CancelToken,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunoutOutcome {
    /// Nozzle mode: the model now stored in the table.
    Stored(RunoutCompensation),
    /// Camera mode: corrections applied to the camera location.
    CameraCorrected {
        location_delta: Pose,
        rotation_delta: f64,
        fit: CircleModel,
    },
}

/// Moves the nozzle back to the calibration pose and up to safe Z on drop.
struct ReturnToSafety<'a> {
    nozzle: &'a mut dyn Nozzle,
    pose: Pose,
    speed: f64,
}

impl Drop for ReturnToSafety<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.nozzle.move_to(&self.pose, self.speed) {
            tracing::warn!(nozzle = self.nozzle.id(), "return to calibration pose failed: {e}");
        }
        if let Err(e) = self.nozzle.move_to_safe_z() {
            tracing::warn!(nozzle = self.nozzle.id(), "move to safe Z failed: {e}");
        }
    }
}

/// Runout calibration for one nozzle tip.
#[derive(Debug, Clone)]
pub struct NozzleRunoutCalibrator {
    tip: String,
    config: RunoutCalibrationConfig,
    flag: CalibrationFlag,
}

impl NozzleRunoutCalibrator {
    pub fn new(tip: impl Into<String>, config: RunoutCalibrationConfig) -> Self {
        Self {
            tip: tip.into(),
            config,
            flag: CalibrationFlag::default(),
        }
    }

    /// Tip this calibration belongs to.
    pub fn tip(&self) -> &str {
        &self.tip
    }

    pub fn config(&self) -> &RunoutCalibrationConfig {
        &self.config
    }

    /// Handle on the in-progress flag.
    pub fn calibration_flag(&self) -> CalibrationFlag {
        self.flag.clone()
    }

    /// Commanded angles of one sweep. A span of exactly 360° drops the last
    /// angle, which would repeat the first.
    pub fn sweep_angles(&self) -> Vec<f64> {
        let n = self.config.subdivisions.max(1);
        let start = self.config.angle_start;
        let span = self.config.angle_stop - start;
        let count = if (span.abs() - 360.0).abs() < 1e-9 {
            n
        } else {
            n + 1
        };
        (0..count)
            .map(|i| start + span * i as f64 / n as f64)
            .collect()
    }

    /// Valid samples a sweep must produce.
    pub fn min_valid_samples(&self) -> usize {
        let count = self.sweep_angles().len();
        MIN_CIRCLE_POINTS.max(count.saturating_sub(self.config.allowed_misdetections))
    }

    /// Whether `tool` should be calibrated before its next move.
    pub fn needs_calibration(&self, table: &CompensationTable, tool: &str) -> bool {
        self.config.enabled
            && self.config.recalibration != RecalibrationTrigger::Manual
            && !self.flag.is_set()
            && table.get(tool).is_none()
    }

    fn check_preconditions(
        &self,
        nozzle: &dyn Nozzle,
        machine_homed: bool,
        homing_in_progress: bool,
    ) -> Result<(), CalibrationError> {
        if !self.config.enabled {
            return Err(CalibrationError::Disabled(format!(
                "runout calibration of tip {}",
                self.tip
            )));
        }
        if !machine_homed && !homing_in_progress {
            return Err(CalibrationError::NotHomed);
        }
        if nozzle.loaded_tip() != Some(self.tip.as_str()) {
            return Err(CalibrationError::TipMismatch {
                nozzle: nozzle.id().to_string(),
                expected: self.tip.clone(),
                loaded: nozzle.loaded_tip().map(str::to_string),
            });
        }
        Ok(())
    }

    /// Run a calibration sweep.
    ///
    /// In nozzle mode (`calibrate_camera == false`) the tool's stored model is
    /// dropped before the sweep and the new one stored on success; a failed
    /// run puts the previous model back. In camera mode the tool must already
    /// be calibrated; the nozzle orbits the camera center and the fitted
    /// center and phase shift correct the camera location and rotation.
    ///
    /// The nozzle returns to the calibration pose and safe Z on every exit
    /// path once motion has started.
    pub fn calibrate(
        &self,
        rig: RunoutRig<'_>,
        homing_in_progress: bool,
        calibrate_camera: bool,
    ) -> Result<RunoutOutcome, CalibrationError> {
        let RunoutRig {
            nozzle,
            camera,
            vision,
            table,
            machine_homed,
            cancel,
        } = rig;
        self.check_preconditions(&*nozzle, machine_homed, homing_in_progress)?;
        let tool = nozzle.id().to_string();
        if calibrate_camera && table.get(&tool).is_none() {
            return Err(CalibrationError::NotCalibrated(tool));
        }
        let _busy = self
            .flag
            .try_acquire()
            .ok_or(CalibrationError::AlreadyCalibrating)?;

        let units = camera.location.units;
        let lift = Pose::new(
            units,
            0.0,
            0.0,
            self.config.calibration_z_offset.to_units(units),
            0.0,
        );
        let baseline = camera.location.with_rotation(0.0).add(&lift);
        let previous = if calibrate_camera {
            None
        } else {
            table.reset(&tool)
        };
        tracing::info!(
            nozzle = %tool,
            tip = %self.tip,
            camera_mode = calibrate_camera,
            "runout calibration started"
        );

        let outcome = self
            .measure(nozzle, camera, vision, baseline, calibrate_camera, &cancel)
            .and_then(|(samples, orbit_center)| {
                if calibrate_camera {
                    correct_camera(camera, &samples, &orbit_center.subtract(&baseline))
                } else {
                    let model = RunoutCompensation::from_samples(self.config.method, &samples)?;
                    Ok(RunoutOutcome::Stored(model))
                }
            });

        match outcome {
            Ok(RunoutOutcome::Stored(model)) => {
                if let Some(circle) = model.circle() {
                    tracing::info!(
                        nozzle = %tool,
                        radius = circle.radius,
                        phase_shift = circle.phase_shift,
                        rms_error = circle.rms_error,
                        "runout model stored"
                    );
                } else {
                    tracing::info!(nozzle = %tool, "runout table stored");
                }
                table.insert(tool, model.clone());
                Ok(RunoutOutcome::Stored(model))
            }
            Ok(corrected) => Ok(corrected),
            Err(e) => {
                tracing::warn!(nozzle = %tool, "runout calibration failed: {e}");
                if let Some(previous) = previous {
                    table.insert(tool, previous);
                }
                Err(e)
            }
        }
    }

    /// Motion and detection part of a run; all samples or nothing.
    ///
    /// Returns the samples and the pose the sweep was centered on.
    fn measure(
        &self,
        nozzle: &mut dyn Nozzle,
        camera: &Camera,
        vision: &mut dyn VisionPipeline,
        baseline: Pose,
        calibrate_camera: bool,
        cancel: &CancelToken,
    ) -> Result<(Vec<RunoutSample>, Pose), CalibrationError> {
        let speed = self.config.motion_speed;
        let mut safety = ReturnToSafety {
            nozzle,
            pose: baseline,
            speed,
        };

        // Camera mode orbits the spot where the reference detection places
        // the camera center, so the tip stays in view whatever the mounting
        // error.
        let (center, orbit) = if calibrate_camera {
            safety.nozzle.move_to(&baseline, speed)?;
            let reference = detect_offset(camera, vision)?
                .ok_or_else(|| CalibrationError::NoDetection(camera.name.clone()))?;
            tracing::debug!(offset = %reference, "camera calibration reference");
            let orbit = Pose::xy(
                baseline.units,
                self.config.camera_orbit_radius.to_units(baseline.units),
                0.0,
            );
            (baseline.subtract(&reference), orbit)
        } else {
            (baseline, Pose::zero(baseline.units))
        };

        let angles = self.sweep_angles();
        if let Some(&first) = angles.first() {
            safety
                .nozzle
                .move_to(&center.add(&orbit.rotate_xy(first)).with_rotation(first), speed)?;
        }

        let mut samples = Vec::with_capacity(angles.len());
        for angle in angles {
            if cancel.is_cancelled() {
                return Err(CalibrationError::Cancelled);
            }
            let target = center.add(&orbit.rotate_xy(angle)).with_rotation(angle);
            safety.nozzle.move_to(&target, speed)?;
            match detect_offset(camera, vision)? {
                Some(offset) => {
                    tracing::debug!(angle, offset = %offset, "runout sample");
                    samples.push(RunoutSample::new(angle, offset));
                }
                None => tracing::warn!(angle, "no nozzle tip detected"),
            }
        }

        let needed = self.min_valid_samples();
        if samples.len() < needed {
            return Err(CalibrationError::InsufficientVisionResults {
                got: samples.len(),
                needed,
            });
        }
        Ok((samples, center))
    }
}

/// Camera location and rotation error from an orbit sweep.
///
/// The phase shift is the camera rotation error `ε`; the fitted center is
/// the orbit center minus the true camera position, seen through `ε`. With
/// the orbit center `shift` away from the configured location, the location
/// correction is `shift - R(ε)·center`.
fn correct_camera(
    camera: &mut Camera,
    samples: &[RunoutSample],
    shift: &Pose,
) -> Result<RunoutOutcome, CalibrationError> {
    let fit = CircleModel::fit(samples)?;
    let rotation_delta = fit.phase_shift;
    let location_delta = shift.subtract(&fit.center().rotate_xy(rotation_delta));
    camera.location = camera
        .location
        .add(&location_delta)
        .with_rotation(camera.location.rotation + rotation_delta);
    tracing::info!(
        camera = %camera.name,
        dx = location_delta.x,
        dy = location_delta.y,
        rotation = rotation_delta,
        "camera position and rotation corrected"
    );
    Ok(RunoutOutcome::CameraCorrected {
        location_delta,
        rotation_delta,
        fit,
    })
}

/// Physical offset of the detected tip from the camera center.
fn detect_offset(
    camera: &Camera,
    vision: &mut dyn VisionPipeline,
) -> Result<Option<Pose>, CalibrationError> {
    let request = VisionRequest::new(VisionPurpose::NozzleTip);
    match vision.process(camera, &request)? {
        None => Ok(None),
        Some(PipelineResult::Circle { center, .. })
        | Some(PipelineResult::KeyPoint { point: center }) => {
            Ok(Some(camera.pixel_center_offset(center[0], center[1])))
        }
        Some(other) => Err(CalibrationError::UnexpectedPipelineResult {
            expected: "circle",
            got: other.kind(),
        }),
    }
}
