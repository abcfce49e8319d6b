//! Vision-guided pose correction of a part held on a nozzle.

use serde::{Deserialize, Serialize};

use super::footprint::Part;
use super::settings::{AlignmentMode, BottomVisionSettings, PartSizeCheck};
use crate::error::CalibrationError;
use crate::geometry::{angle_norm, Length, Pose, RotationRange};
use crate::machine::{MachineError, Movable, Nozzle};
use crate::vision::{
    Camera, PipelineResult, RotatedRect, VisionPipeline, VisionPurpose, VisionRequest,
};

/// Measures the height of a part whose height is not configured.
pub trait AutoFocus {
    fn focus_part_height(
        &mut self,
        camera: &Camera,
        nozzle: &mut dyn Nozzle,
        part: &Part,
    ) -> Result<Length, MachineError>;
}

/// Collaborators of one alignment.
pub struct AlignmentRig<'a> {
    pub nozzle: &'a mut dyn Nozzle,
    pub camera: &'a Camera,
    pub vision: &'a mut dyn VisionPipeline,
    pub auto_focus: Option<&'a mut dyn AutoFocus>,
}

/// Aligner-wide motion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Speed factor of the moves over the camera.
    pub motion_speed: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self { motion_speed: 1.0 }
    }
}

/// Correction of the part pose relative to the nozzle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartAlignmentOffset {
    /// XY offset of the part and its rotation error.
    pub offset: Pose,
    /// The part was measured at its placement angle.
    pub pre_rotated: bool,
    /// `false` when bottom vision is disabled and `offset` is zero.
    pub applied: bool,
    /// Vision passes used.
    pub passes: u32,
}

/// Detected outline in machine terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineMeasurement {
    /// Offset of the outline center from the camera center.
    pub center_offset: Pose,
    /// Offset of the first outline corner from the camera center.
    pub corner_offset: Pose,
    /// Machine rotation of the outline, degrees.
    pub angle: f64,
}

impl OutlineMeasurement {
    pub fn from_rect(camera: &Camera, rect: &RotatedRect) -> Self {
        let [cx, cy] = rect.center;
        let [kx, ky] = rect.corners()[0];
        Self {
            center_offset: camera.pixel_center_offset(cx, cy),
            corner_offset: camera.pixel_center_offset(kx, ky),
            angle: camera.pixel_angle(rect.angle),
        }
    }
}

/// One pre-rotate pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassStep {
    /// Nozzle pose that cancels the measured error.
    pub next_pose: Pose,
    /// Correction applied this pass, rotation included.
    pub offsets: Pose,
    /// Measured angle error, folded into the max-rotation range.
    pub angle_offset: f64,
    /// The measurement is within every tolerance.
    pub accepted: bool,
}

/// Fold a measured error into the next nozzle pose and judge it.
///
/// The XY error is rotated back by the angle error because turning the
/// nozzle to fix the angle also turns any residual XY offset.
pub fn pre_rotate_step(
    nozzle: &Pose,
    measurement: &OutlineMeasurement,
    wanted_angle: f64,
    settings: &BottomVisionSettings,
) -> PassStep {
    let angle_offset = angle_norm(
        measurement.angle - wanted_angle,
        settings.max_rotation.limit(),
    );
    let offsets = measurement
        .center_offset
        .rotate_xy(-angle_offset)
        .with_rotation(angle_offset);
    let next_pose = nozzle.subtract_with_rotation(&offsets);

    let units = measurement.center_offset.units;
    let max_linear = settings.max_linear_offset.to_units(units);
    let center_error = measurement.center_offset.xy_length().to_units(units);
    // Turning the nozzle swings the corner around the part center.
    let corner = measurement.corner_offset.convert_to(units);
    let corner_shift =
        corner.linear_distance_to(&corner.rotate_xy_about(&measurement.center_offset, angle_offset));
    let accepted = center_error <= max_linear
        && corner_shift <= max_linear
        && angle_offset.abs() <= settings.max_angular_offset;

    PassStep {
        next_pose,
        offsets,
        angle_offset,
        accepted,
    }
}

/// Runs bottom vision for a part held on a nozzle.
#[derive(Debug, Clone, Default)]
pub struct BottomVisionAligner {
    pub config: AlignerConfig,
}

impl BottomVisionAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    /// Measure how `part` sits on the nozzle for a placement at
    /// `placement_target`.
    ///
    /// Pre-rotate mode keeps correcting until every tolerance is met or the
    /// pass budget is spent; the last measurement is used in the latter case.
    /// A part-size mismatch fails immediately.
    pub fn find_offsets(
        &self,
        rig: AlignmentRig<'_>,
        part: &Part,
        placement_target: &Pose,
        settings: &BottomVisionSettings,
    ) -> Result<PartAlignmentOffset, CalibrationError> {
        let AlignmentRig {
            nozzle,
            camera,
            vision,
            auto_focus,
        } = rig;
        let units = camera.location.units;
        if !settings.enabled {
            return Ok(PartAlignmentOffset {
                offset: Pose::zero(units),
                pre_rotated: false,
                applied: false,
                passes: 0,
            });
        }

        let height = match (part.height, auto_focus) {
            (Some(h), _) => h,
            (None, Some(af)) => af.focus_part_height(camera, &mut *nozzle, part)?,
            (None, None) => return Err(CalibrationError::PartHeightUnknown(part.id.clone())),
        };
        let lift = Pose::new(units, 0.0, 0.0, height.to_units(units), 0.0);
        let over_camera = camera.location.add(&lift);

        let result = match settings.mode {
            AlignmentMode::PreRotate => {
                self.pre_rotate(nozzle, camera, vision, part, over_camera, placement_target, settings)
            }
            AlignmentMode::PostRotate => {
                self.post_rotate(nozzle, camera, vision, part, over_camera, settings)
            }
        }?;
        tracing::info!(
            part = %part.id,
            offset = %result.offset,
            pre_rotated = result.pre_rotated,
            passes = result.passes,
            "bottom vision offsets"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn pre_rotate(
        &self,
        nozzle: &mut dyn Nozzle,
        camera: &Camera,
        vision: &mut dyn VisionPipeline,
        part: &Part,
        over_camera: Pose,
        placement_target: &Pose,
        settings: &BottomVisionSettings,
    ) -> Result<PartAlignmentOffset, CalibrationError> {
        let speed = self.config.motion_speed;
        let wanted_angle = angle_norm(placement_target.rotation, 180.0);
        let wanted = over_camera.with_rotation(wanted_angle);
        let max_passes = settings.max_vision_passes.max(1);

        let mut pose = wanted;
        nozzle.move_to(&pose, speed)?;
        let mut passes = 0;
        loop {
            let rect = measure_outline(camera, vision)?;
            check_part_size(camera, &rect, part, settings)?;
            let measurement = OutlineMeasurement::from_rect(camera, &rect);
            let step = pre_rotate_step(&pose, &measurement, wanted_angle, settings);
            pose = step.next_pose;
            passes += 1;
            tracing::debug!(
                pass = passes,
                dx = step.offsets.x,
                dy = step.offsets.y,
                angle = step.angle_offset,
                accepted = step.accepted,
                "bottom vision pass"
            );
            if step.accepted {
                break;
            }
            if passes >= max_passes {
                tracing::warn!(
                    part = %part.id,
                    passes,
                    "bottom vision out of tolerance after the last pass; using last measurement"
                );
                break;
            }
            nozzle.move_to(&pose, speed)?;
        }

        let offset = wanted
            .subtract_with_rotation(&pose)
            .subtract(&settings.vision_offset.rotate_xy(wanted_angle))
            .normalized_rotation(RotationRange::Symmetric180);
        Ok(PartAlignmentOffset {
            offset: Pose { z: 0.0, ..offset },
            pre_rotated: true,
            applied: true,
            passes,
        })
    }

    fn post_rotate(
        &self,
        nozzle: &mut dyn Nozzle,
        camera: &Camera,
        vision: &mut dyn VisionPipeline,
        part: &Part,
        over_camera: Pose,
        settings: &BottomVisionSettings,
    ) -> Result<PartAlignmentOffset, CalibrationError> {
        nozzle.move_to(&over_camera.with_rotation(0.0), self.config.motion_speed)?;
        let rect = measure_outline(camera, vision)?;
        check_part_size(camera, &rect, part, settings)?;
        let measurement = OutlineMeasurement::from_rect(camera, &rect);
        let angle = angle_norm(measurement.angle, settings.max_rotation.limit());
        let offset = measurement
            .center_offset
            .with_rotation(angle)
            .subtract(&settings.vision_offset.rotate_xy(angle));
        Ok(PartAlignmentOffset {
            offset,
            pre_rotated: false,
            applied: true,
            passes: 1,
        })
    }
}

fn measure_outline(
    camera: &Camera,
    vision: &mut dyn VisionPipeline,
) -> Result<RotatedRect, CalibrationError> {
    match vision.process(camera, &VisionRequest::new(VisionPurpose::PartOutline))? {
        Some(PipelineResult::RotatedRect(rect)) => Ok(rect),
        Some(other) => Err(CalibrationError::UnexpectedPipelineResult {
            expected: "rotated rectangle",
            got: other.kind(),
        }),
        None => Err(CalibrationError::NoDetection(camera.name.clone())),
    }
}

/// Compare the outline with the footprint, longer side with longer side.
fn check_part_size(
    camera: &Camera,
    rect: &RotatedRect,
    part: &Part,
    settings: &BottomVisionSettings,
) -> Result<(), CalibrationError> {
    let expected = match settings.part_size_check {
        PartSizeCheck::Disabled => return Ok(()),
        PartSizeCheck::BodySize => Some(part.footprint.body_size()),
        PartSizeCheck::PadExtents => part.footprint.pad_extents(),
    };
    let Some([w, h]) = expected else {
        tracing::warn!(part = %part.id, "footprint has no pads; part size check skipped");
        return Ok(());
    };
    let (ew, eh) = (camera.length_to_pixels(w), camera.length_to_pixels(h));
    let expected_px = [ew.max(eh), ew.min(eh)];
    let (longer, shorter) = rect.longer_shorter();
    let tolerance = settings.part_size_tolerance_percent / 100.0;
    let within = |measured: f64, expected: f64| (measured - expected).abs() <= expected * tolerance;
    if within(longer, expected_px[0]) && within(shorter, expected_px[1]) {
        return Ok(());
    }
    Err(CalibrationError::IncorrectPartSize {
        part: part.id.clone(),
        measured_px: [longer, shorter],
        expected_px,
        tolerance_percent: settings.part_size_tolerance_percent,
    })
}
