//! Per-axis backlash compensation settings and the axes they live on.

use serde::{Deserialize, Serialize};

use crate::geometry::{Length, LengthUnit, Pose};
use crate::machine::MachineError;

/// How the motion layer compensates an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklashMethod {
    #[default]
    None,
    /// Shift every target by half the offset against the travel direction.
    Directional,
    /// Always finish moves from the same side, overshooting by the offset.
    OneSided,
}

/// Backlash setting of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklashSettings {
    pub method: BacklashMethod,
    /// Signed backlash offset.
    pub offset: Length,
    /// Highest speed factor (`0..=1`) at which `offset` was validated.
    pub speed_factor: f64,
}

impl Default for BacklashSettings {
    fn default() -> Self {
        Self::none()
    }
}

impl BacklashSettings {
    /// No compensation.
    pub fn none() -> Self {
        Self {
            method: BacklashMethod::None,
            offset: Length::mm(0.0),
            speed_factor: 1.0,
        }
    }

    pub fn directional(offset: Length, speed_factor: f64) -> Self {
        Self {
            method: BacklashMethod::Directional,
            offset,
            speed_factor,
        }
    }

    pub fn one_sided(offset: Length, speed_factor: f64) -> Self {
        Self {
            method: BacklashMethod::OneSided,
            offset,
            speed_factor,
        }
    }
}

/// Access to the backlash settings the motion layer applies.
pub trait BacklashAxes {
    /// Current setting of `axis`.
    fn backlash(&self, axis: &str) -> BacklashSettings;

    /// Replace the setting of `axis`; later moves use it.
    fn set_backlash(&mut self, axis: &str, settings: BacklashSettings) -> Result<(), MachineError>;
}

/// Linear axis under calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub name: String,
    /// Machine-XY angle of the positive axis direction, degrees.
    pub direction_deg: f64,
    /// Smallest step the axis resolves.
    pub resolution: Length,
}

impl AxisSpec {
    pub fn new(name: impl Into<String>, direction_deg: f64, resolution: Length) -> Self {
        Self {
            name: name.into(),
            direction_deg,
            resolution,
        }
    }

    pub fn x(name: impl Into<String>, resolution: Length) -> Self {
        Self::new(name, 0.0, resolution)
    }

    pub fn y(name: impl Into<String>, resolution: Length) -> Self {
        Self::new(name, 90.0, resolution)
    }

    /// Unit vector of the positive direction, in millimeters.
    pub fn unit_vector(&self) -> Pose {
        let (s, c) = self.direction_deg.to_radians().sin_cos();
        Pose::xy(LengthUnit::Millimeters, c, s)
    }
}

/// What the axis carries relative to the calibration fiducial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovingBody {
    /// A head-mounted camera moves over a fixed fiducial.
    #[default]
    Camera,
    /// The fiducial moves over a fixed camera.
    Subject,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn y_axis_points_up() {
        let u = AxisSpec::y("Y", Length::mm(0.01)).unit_vector();
        assert_relative_eq!(u.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(u.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn settings_json_uses_snake_case_methods() {
        let s = BacklashSettings::one_sided(Length::mm(0.05), 0.5);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"one_sided\""));
        let back: BacklashSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, BacklashMethod::OneSided);
        assert_relative_eq!(back.offset.to_mm(), 0.05);
    }
}
