//! [`VisionPipeline`] backed by the circular-symmetry detector.

use image::GrayImage;

use super::{Camera, PipelineResult, VisionPipeline, VisionRequest};
use crate::machine::MachineError;
use crate::symmetry::{find_circular_symmetry, SymmetryError, SymmetryParams};

/// Source of camera frames.
pub trait FrameSource {
    fn capture(&mut self, camera: &Camera) -> Result<GrayImage, MachineError>;
}

/// Locates round features (nozzle tips, fiducials) in captured frames.
#[derive(Debug, Clone)]
pub struct SymmetryPipeline<F> {
    pub frames: F,
    pub params: SymmetryParams,
    /// Detections scoring below this are reported as "nothing found".
    pub min_score: f64,
}

impl<F: FrameSource> SymmetryPipeline<F> {
    pub fn new(frames: F, params: SymmetryParams) -> Self {
        Self {
            frames,
            params,
            min_score: 0.0,
        }
    }
}

impl<F: FrameSource> VisionPipeline for SymmetryPipeline<F> {
    fn process(
        &mut self,
        camera: &Camera,
        request: &VisionRequest,
    ) -> Result<Option<PipelineResult>, MachineError> {
        let frame = self.frames.capture(camera)?;
        let [sx, sy] = request
            .roi_hint
            .unwrap_or([frame.width() as f64 / 2.0, frame.height() as f64 / 2.0]);
        let found = find_circular_symmetry(
            &frame,
            sx.round() as i32,
            sy.round() as i32,
            &self.params,
        );
        match found {
            Ok(circle) if circle.score >= self.min_score => {
                tracing::debug!(
                    camera = %camera.name,
                    x = circle.center[0],
                    y = circle.center[1],
                    diameter = circle.diameter,
                    score = circle.score,
                    "circular symmetry found"
                );
                Ok(Some(PipelineResult::Circle {
                    center: circle.center,
                    diameter: circle.diameter,
                }))
            }
            Ok(circle) => {
                tracing::debug!(
                    camera = %camera.name,
                    score = circle.score,
                    min_score = self.min_score,
                    "circular symmetry too weak"
                );
                Ok(None)
            }
            Err(e @ SymmetryError::WindowOutsideImage { .. }) => {
                tracing::warn!(camera = %camera.name, "{e}");
                Ok(None)
            }
            Err(e) => Err(MachineError::Vision {
                camera: camera.name.clone(),
                message: e.to_string(),
            }),
        }
    }
}
