//! Vision round trip: typed pipeline results and the camera they come from.
//!
//! A [`VisionPipeline`] captures a frame and reports what it found in pixel
//! coordinates. An empty result means "no fix this attempt"; the caller
//! decides whether that is tolerable.

mod camera;
mod symmetry_pipeline;

use serde::{Deserialize, Serialize};

pub use camera::Camera;
pub use symmetry_pipeline::{FrameSource, SymmetryPipeline};

use crate::machine::MachineError;

/// What a pipeline is asked to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionPurpose {
    /// Nozzle tip seen from a bottom camera.
    NozzleTip,
    /// Calibration fiducial.
    Fiducial,
    /// Outline of a part held on a nozzle.
    PartOutline,
}

/// One request to a vision pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionRequest {
    pub purpose: VisionPurpose,
    /// Expected pixel position of the feature; image center when `None`.
    pub roi_hint: Option<[f64; 2]>,
}

impl VisionRequest {
    pub fn new(purpose: VisionPurpose) -> Self {
        Self {
            purpose,
            roi_hint: None,
        }
    }
}

/// Rotated rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    /// Center `[x, y]` in pixels.
    pub center: [f64; 2],
    /// `[width, height]` in pixels.
    pub size: [f64; 2],
    /// Angle in degrees, clockwise positive in image coordinates.
    pub angle: f64,
}

impl RotatedRect {
    /// Corner points, starting with the corner at `(-w/2, +h/2)` in the
    /// rectangle's own frame.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        let (s, c) = self.angle.to_radians().sin_cos();
        let hw = self.size[0] / 2.0;
        let hh = self.size[1] / 2.0;
        [(-hw, hh), (-hw, -hh), (hw, -hh), (hw, hh)].map(|(x, y)| {
            [
                self.center[0] + x * c - y * s,
                self.center[1] + x * s + y * c,
            ]
        })
    }

    /// `(longer, shorter)` side length.
    pub fn longer_shorter(&self) -> (f64, f64) {
        let [w, h] = self.size;
        (w.max(h), w.min(h))
    }
}

/// Typed pipeline output, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineResult {
    Circle { center: [f64; 2], diameter: f64 },
    RotatedRect(RotatedRect),
    KeyPoint { point: [f64; 2] },
}

impl PipelineResult {
    /// Short name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Circle { .. } => "circle",
            Self::RotatedRect(_) => "rotated rectangle",
            Self::KeyPoint { .. } => "key point",
        }
    }

    /// Pixel position of the result.
    pub fn center(&self) -> [f64; 2] {
        match self {
            Self::Circle { center, .. } => *center,
            Self::RotatedRect(rect) => rect.center,
            Self::KeyPoint { point } => *point,
        }
    }
}

/// Capture-and-process round trip.
pub trait VisionPipeline {
    /// Capture a frame from `camera` and run the pipeline configured for
    /// `request`. `Ok(None)` when nothing was found.
    fn process(
        &mut self,
        camera: &Camera,
        request: &VisionRequest,
    ) -> Result<Option<PipelineResult>, MachineError>;
}
