//! Bidirectional approach test and compensation selection.

use serde::{Deserialize, Serialize};

use super::settings::{AxisSpec, BacklashAxes, BacklashSettings, MovingBody};
use crate::error::CalibrationError;
use crate::geometry::{Length, LengthUnit, Pose};
use crate::machine::{CancelToken, Movable};
use crate::vision::{Camera, VisionPipeline, VisionPurpose, VisionRequest};

/// Backlash calibration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklashConfig {
    /// Approach passes per speed.
    pub passes: u32,
    /// Distance each approach starts from, on either side of the fiducial.
    pub overshoot: Length,
    /// Fraction of the measured error folded into the estimate per pass.
    pub dampening: f64,
    /// One-sided offsets are scaled by this factor.
    pub safety_factor: f64,
    /// Speed factors tested, ascending.
    pub speeds: Vec<f64>,
    /// Speed of the moves to the approach start points.
    pub move_speed: f64,
}

impl Default for BacklashConfig {
    fn default() -> Self {
        Self {
            passes: 6,
            overshoot: Length::mm(1.0),
            dampening: 0.8,
            safety_factor: 1.1,
            speeds: vec![0.25, 0.5, 0.75, 1.0],
            move_speed: 1.0,
        }
    }
}

/// Result of one approach pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassOutcome {
    /// Updated backlash estimate, mm.
    pub estimate: f64,
    /// The axis overshoots without any compensation.
    pub overshoot: bool,
    /// No further pass is needed at this speed.
    pub done: bool,
}

/// Fold the residual error of pass `pass` into `estimate` (all in mm).
pub fn backlash_pass(
    estimate: f64,
    error: f64,
    pass: u32,
    tolerance: f64,
    dampening: f64,
) -> PassOutcome {
    if pass == 0 && error < -tolerance {
        return PassOutcome {
            estimate,
            overshoot: true,
            done: true,
        };
    }
    PassOutcome {
        estimate: estimate + error * dampening,
        overshoot: false,
        done: error.abs() < tolerance,
    }
}

/// Final estimate at one speed factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedResult {
    pub speed: f64,
    /// Backlash offset, mm.
    pub offset: f64,
    /// Residual error of the first, uncompensated pass, mm.
    pub first_error: f64,
    pub overshoot: bool,
}

/// Choose the compensation from per-speed results ordered by speed.
///
/// Speeds are consistent while they do not overshoot and stay within
/// `tolerance` of the first one; the first inconsistent speed ends the run.
pub fn select_backlash_method(
    results: &[SpeedResult],
    tolerance: f64,
    safety_factor: f64,
    axis: &str,
) -> Result<BacklashSettings, CalibrationError> {
    let Some(first) = results.first() else {
        return Err(no_speeds(axis));
    };
    let consistent = results
        .iter()
        .take_while(|r| !r.overshoot && (r.offset - first.offset).abs() <= tolerance)
        .count();
    if consistent == 0 {
        return Err(CalibrationError::AxisCannotBeCompensated {
            axis: axis.to_string(),
            speed: first.speed,
            error_mm: first.first_error,
            tolerance_mm: tolerance,
        });
    }
    let speed = results[consistent - 1].speed;

    if consistent == results.len() {
        let mean = results.iter().map(|r| r.offset).sum::<f64>() / results.len() as f64;
        if mean.abs() < tolerance {
            return Ok(BacklashSettings::none());
        }
        return Ok(BacklashSettings::directional(Length::mm(mean), speed));
    }

    let largest = results
        .iter()
        .filter(|r| !r.overshoot)
        .map(|r| r.offset)
        .fold(0.0f64, |acc, o| if o.abs() > acc.abs() { o } else { acc });
    Ok(BacklashSettings::one_sided(
        Length::mm(largest * safety_factor),
        speed,
    ))
}

fn no_speeds(axis: &str) -> CalibrationError {
    CalibrationError::Disabled(format!("backlash calibration of axis {axis} without test speeds"))
}

/// Collaborators of one backlash calibration.
pub struct BacklashRig<'a> {
    /// Carrier of the moving body, centered on the fiducial.
    pub mover: &'a mut dyn Movable,
    pub camera: &'a Camera,
    pub vision: &'a mut dyn VisionPipeline,
    pub axes: &'a mut dyn BacklashAxes,
    pub cancel: CancelToken,
}

/// Measures and configures the backlash compensation of an axis.
#[derive(Debug, Clone, Default)]
pub struct AxisBacklashCalibrator {
    pub config: BacklashConfig,
}

impl AxisBacklashCalibrator {
    pub fn new(config: BacklashConfig) -> Self {
        Self { config }
    }

    /// Smallest error, in mm, the calibration can tell apart from zero.
    pub fn tolerance(&self, camera: &Camera, axis: &AxisSpec) -> f64 {
        let pitch = camera.pixel_pitch_along(&axis.unit_vector()).to_mm();
        axis.resolution.to_mm().max(1.1 * pitch)
    }

    /// Calibrate `axis` and store the selected setting on it.
    ///
    /// The mover must start centered on the calibration fiducial and is
    /// returned there. On failure the previous axis setting is restored.
    pub fn calibrate_axis_backlash(
        &self,
        rig: BacklashRig<'_>,
        axis: &AxisSpec,
        moving_body: MovingBody,
    ) -> Result<BacklashSettings, CalibrationError> {
        let BacklashRig {
            mover,
            camera,
            vision,
            axes,
            cancel,
        } = rig;
        if self.config.speeds.is_empty() {
            return Err(no_speeds(&axis.name));
        }
        let previous = axes.backlash(&axis.name);
        let home = mover.location();
        let tolerance = self.tolerance(camera, axis);
        tracing::info!(axis = %axis.name, tolerance, ?moving_body, "backlash calibration");

        let mut gauge = AxisGauge {
            mover: &mut *mover,
            camera,
            vision,
            home,
            unit: axis.unit_vector(),
            moving_body,
        };
        let outcome = self
            .measure_speeds(&mut gauge, &mut *axes, &cancel, axis, tolerance)
            .and_then(|results| {
                select_backlash_method(&results, tolerance, self.config.safety_factor, &axis.name)
            })
            .and_then(|settings| {
                axes.set_backlash(&axis.name, settings)?;
                Ok(settings)
            });

        match &outcome {
            Ok(settings) => tracing::info!(
                axis = %axis.name,
                method = ?settings.method,
                offset = %settings.offset,
                speed = settings.speed_factor,
                "backlash calibrated"
            ),
            Err(e) => {
                tracing::warn!(axis = %axis.name, "backlash calibration failed: {e}");
                if let Err(e) = axes.set_backlash(&axis.name, previous) {
                    tracing::warn!(axis = %axis.name, "restoring backlash setting failed: {e}");
                }
            }
        }
        if let Err(e) = mover.move_to(&home, self.config.move_speed) {
            tracing::warn!(axis = %axis.name, "return to fiducial failed: {e}");
        }
        outcome
    }

    fn measure_speeds(
        &self,
        gauge: &mut AxisGauge<'_>,
        axes: &mut dyn BacklashAxes,
        cancel: &CancelToken,
        axis: &AxisSpec,
        tolerance: f64,
    ) -> Result<Vec<SpeedResult>, CalibrationError> {
        let mut results = Vec::with_capacity(self.config.speeds.len());
        for &speed in &self.config.speeds {
            axes.set_backlash(&axis.name, BacklashSettings::none())?;
            let mut estimate = 0.0;
            let mut first_error = 0.0;
            let mut overshoot = false;
            for pass in 0..self.config.passes {
                if cancel.is_cancelled() {
                    return Err(CalibrationError::Cancelled);
                }
                let m0 = gauge.approach(-1.0, speed, self.config.overshoot, self.config.move_speed)?;
                let m1 = gauge.approach(1.0, speed, self.config.overshoot, self.config.move_speed)?;
                let error = gauge.residual(&m0, &m1);
                if pass == 0 {
                    first_error = error;
                }
                let step = backlash_pass(estimate, error, pass, tolerance, self.config.dampening);
                tracing::debug!(axis = %axis.name, speed, pass, error, estimate = step.estimate, "backlash pass");
                if step.overshoot {
                    overshoot = true;
                    break;
                }
                estimate = step.estimate;
                axes.set_backlash(
                    &axis.name,
                    BacklashSettings::directional(Length::mm(estimate), speed),
                )?;
                if step.done {
                    break;
                }
            }
            if overshoot {
                tracing::warn!(axis = %axis.name, speed, "axis overshoots at this speed");
            }
            results.push(SpeedResult {
                speed,
                offset: estimate,
                first_error,
                overshoot,
            });
        }
        Ok(results)
    }
}

/// Fiducial measurements from either side of the home location.
struct AxisGauge<'a> {
    mover: &'a mut dyn Movable,
    camera: &'a Camera,
    vision: &'a mut dyn VisionPipeline,
    home: Pose,
    unit: Pose,
    moving_body: MovingBody,
}

impl AxisGauge<'_> {
    /// Approach home from `side` (−1 below, +1 above) and return the
    /// detected fiducial location in mm.
    fn approach(
        &mut self,
        side: f64,
        speed: f64,
        overshoot: Length,
        move_speed: f64,
    ) -> Result<Pose, CalibrationError> {
        let start = self.home.add(&self.unit.scale(side * overshoot.to_mm()));
        self.mover.move_to(&start, move_speed)?;
        self.mover.move_to(&self.home, speed)?;

        let mut view = self.camera.clone();
        if self.moving_body == MovingBody::Camera {
            let at = self.mover.location().convert_to(view.location.units);
            view.location.x = at.x;
            view.location.y = at.y;
        }
        let request = VisionRequest::new(VisionPurpose::Fiducial);
        let result = self
            .vision
            .process(&view, &request)?
            .ok_or_else(|| CalibrationError::NoDetection(view.name.clone()))?;
        let [px, py] = result.center();
        Ok(view
            .location
            .add(&view.pixel_center_offset(px, py))
            .convert_to(LengthUnit::Millimeters))
    }

    /// Signed error along the axis between approaches from below (`m0`)
    /// and above (`m1`), positive when compensation must grow.
    fn residual(&self, m0: &Pose, m1: &Pose) -> f64 {
        let diff = m1.subtract(m0).dot_xy(&self.unit);
        match self.moving_body {
            MovingBody::Camera => -diff,
            MovingBody::Subject => diff,
        }
    }
}
