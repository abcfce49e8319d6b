//! Bottom-vision settings and their part → package → machine inheritance.

use serde::{Deserialize, Serialize};

use crate::geometry::{Length, Pose};

/// When the part is turned to its placement angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Rotate first, then measure and correct iteratively.
    #[default]
    PreRotate,
    /// Measure once at 0°, rotate during placement.
    PostRotate,
}

/// Range the detected outline angle is folded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxRotation {
    /// ±45°: the smallest turn that squares a rectangle up.
    #[default]
    Adjust,
    /// ±180°: the part may be picked in any orientation.
    Full,
}

impl MaxRotation {
    pub fn limit(self) -> f64 {
        match self {
            Self::Adjust => 45.0,
            Self::Full => 180.0,
        }
    }
}

/// Footprint dimension the detected outline is compared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartSizeCheck {
    #[default]
    Disabled,
    BodySize,
    PadExtents,
}

/// Per-part bottom-vision settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottomVisionSettings {
    pub enabled: bool,
    pub mode: AlignmentMode,
    /// Measurements per alignment in pre-rotate mode.
    pub max_vision_passes: u32,
    /// Accepted residual center offset, and corner shift caused by the
    /// residual angle.
    pub max_linear_offset: Length,
    /// Accepted residual angle, degrees.
    pub max_angular_offset: f64,
    pub max_rotation: MaxRotation,
    pub part_size_check: PartSizeCheck,
    pub part_size_tolerance_percent: f64,
    /// Offset of the vision center from the part origin.
    pub vision_offset: Pose,
}

impl Default for BottomVisionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AlignmentMode::PreRotate,
            max_vision_passes: 3,
            max_linear_offset: Length::mm(0.1),
            max_angular_offset: 10.0,
            max_rotation: MaxRotation::Adjust,
            part_size_check: PartSizeCheck::Disabled,
            part_size_tolerance_percent: 20.0,
            vision_offset: Pose::default(),
        }
    }
}

/// Settings in effect for a part: its own, else its package's, else the
/// machine default.
pub fn resolve_settings<'a>(
    machine_default: &'a BottomVisionSettings,
    package: Option<&'a BottomVisionSettings>,
    part: Option<&'a BottomVisionSettings>,
) -> &'a BottomVisionSettings {
    part.or(package).unwrap_or(machine_default)
}
