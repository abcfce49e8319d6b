//! Pixel ↔ machine conversion for a calibrated camera.

use serde::{Deserialize, Serialize};

use crate::geometry::{Length, LengthUnit, Pose};

/// Camera description used to turn pixel results into physical offsets.
///
/// Image coordinates have their origin in the top-left corner with `y`
/// pointing down; machine coordinates have `y` pointing up. The camera is
/// mounted rotated by `location.rotation` degrees relative to the machine axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    /// Machine location of the image center, with the mounting rotation.
    pub location: Pose,
    /// Physical size of one pixel along the image X and Y axes.
    pub units_per_pixel: Pose,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Camera {
    pub fn new(
        name: impl Into<String>,
        location: Pose,
        units_per_pixel: Pose,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            units_per_pixel,
            width,
            height,
        }
    }

    fn units(&self) -> LengthUnit {
        self.location.units
    }

    fn upp(&self) -> Pose {
        self.units_per_pixel.convert_to(self.units())
    }

    /// Physical offset of pixel `(px, py)` from the image center, in machine
    /// axes and the units of the camera location.
    pub fn pixel_center_offset(&self, px: f64, py: f64) -> Pose {
        let upp = self.upp();
        let x = (px - self.width as f64 / 2.0) * upp.x;
        let y = (self.height as f64 / 2.0 - py) * upp.y;
        Pose::xy(self.units(), x, y).rotate_xy(self.location.rotation)
    }

    /// Machine rotation of a feature whose image-space angle is
    /// `image_angle_deg` (clockwise positive, as image libraries report it).
    pub fn pixel_angle(&self, image_angle_deg: f64) -> f64 {
        self.location.rotation - image_angle_deg
    }

    /// Inverse of [`Camera::pixel_center_offset`].
    pub fn to_pixels(&self, offset: &Pose) -> [f64; 2] {
        let upp = self.upp();
        let local = offset
            .convert_to(self.units())
            .rotate_xy(-self.location.rotation);
        [
            local.x / upp.x + self.width as f64 / 2.0,
            self.height as f64 / 2.0 - local.y / upp.y,
        ]
    }

    /// Length expressed in pixels, using the mean of the X and Y pitch.
    pub fn length_to_pixels(&self, length: Length) -> f64 {
        let upp = self.upp();
        length.to_units(self.units()) / ((upp.x.abs() + upp.y.abs()) / 2.0)
    }

    /// Pixel pitch projected on a machine direction (unit vector in `direction`).
    pub fn pixel_pitch_along(&self, direction: &Pose) -> Length {
        let upp = self.upp();
        let local = direction.rotate_xy(-self.location.rotation);
        let pitch = (local.x * upp.x).hypot(local.y * upp.y);
        Length::new(pitch, self.units())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera(rotation: f64) -> Camera {
        Camera::new(
            "bottom",
            Pose::mm(100.0, 50.0, -20.0, rotation),
            Pose::mm(0.02, 0.02, 0.0, 0.0),
            640,
            480,
        )
    }

    #[test]
    fn image_center_maps_to_zero_offset() {
        let off = camera(0.0).pixel_center_offset(320.0, 240.0);
        assert_relative_eq!(off.x, 0.0);
        assert_relative_eq!(off.y, 0.0);
    }

    #[test]
    fn image_y_points_down() {
        let off = camera(0.0).pixel_center_offset(330.0, 230.0);
        assert_relative_eq!(off.x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(off.y, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn mounting_rotation_turns_offsets() {
        let off = camera(90.0).pixel_center_offset(330.0, 240.0);
        assert_relative_eq!(off.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(off.y, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn to_pixels_inverts_center_offset() {
        let cam = camera(7.5);
        let px = cam.to_pixels(&Pose::mm(0.31, -0.12, 0.0, 0.0));
        let back = cam.pixel_center_offset(px[0], px[1]);
        assert_relative_eq!(back.x, 0.31, epsilon = 1e-12);
        assert_relative_eq!(back.y, -0.12, epsilon = 1e-12);
    }

    #[test]
    fn pixel_angle_flips_image_sense() {
        assert_relative_eq!(camera(0.0).pixel_angle(10.0), -10.0);
        assert_relative_eq!(camera(2.0).pixel_angle(-3.0), 5.0);
    }

    #[test]
    fn lengths_convert_to_pixels() {
        let cam = camera(0.0);
        assert_relative_eq!(cam.length_to_pixels(Length::mm(1.0)), 50.0, epsilon = 1e-9);
        assert_relative_eq!(
            cam.pixel_pitch_along(&Pose::xy(LengthUnit::Millimeters, 1.0, 0.0)).to_mm(),
            0.02,
            epsilon = 1e-12
        );
    }
}
