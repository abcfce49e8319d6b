//! Unit-tagged machine pose: a point `(x, y, z)` plus a rotation about Z.

use serde::{Deserialize, Serialize};

use super::angle::{wrap_half_open, wrap_upper_closed};
use super::units::{Length, LengthUnit};

/// Range a pose rotation is wrapped into by [`Pose::normalized_rotation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationRange {
    /// `(-180, 180]`.
    #[default]
    Symmetric180,
    /// `[0, 360)`.
    Positive360,
}

/// Immutable machine pose.
///
/// Rotation is in degrees, counter-clockwise positive. Binary operations
/// convert the right-hand operand into the units of `self`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub units: LengthUnit,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotation: f64,
}

impl Pose {
    pub fn new(units: LengthUnit, x: f64, y: f64, z: f64, rotation: f64) -> Self {
        Self {
            units,
            x,
            y,
            z,
            rotation,
        }
    }

    /// Pose in millimeters.
    pub fn mm(x: f64, y: f64, z: f64, rotation: f64) -> Self {
        Self::new(LengthUnit::Millimeters, x, y, z, rotation)
    }

    /// XY-only pose (z and rotation zero).
    pub fn xy(units: LengthUnit, x: f64, y: f64) -> Self {
        Self::new(units, x, y, 0.0, 0.0)
    }

    /// All-zero pose in the given units.
    pub fn zero(units: LengthUnit) -> Self {
        Self::new(units, 0.0, 0.0, 0.0, 0.0)
    }

    /// Same physical pose expressed in `units`.
    pub fn convert_to(&self, units: LengthUnit) -> Self {
        if units == self.units {
            return *self;
        }
        Self {
            units,
            x: self.units.convert(self.x, units),
            y: self.units.convert(self.y, units),
            z: self.units.convert(self.z, units),
            rotation: self.rotation,
        }
    }

    /// Copy with selected fields replaced.
    pub fn derive(
        &self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        rotation: Option<f64>,
    ) -> Self {
        Self {
            units: self.units,
            x: x.unwrap_or(self.x),
            y: y.unwrap_or(self.y),
            z: z.unwrap_or(self.z),
            rotation: rotation.unwrap_or(self.rotation),
        }
    }

    /// Copy with the rotation replaced.
    pub fn with_rotation(&self, rotation: f64) -> Self {
        self.derive(None, None, None, Some(rotation))
    }

    /// Add XYZ of `other`; the rotation of `self` is kept.
    pub fn add(&self, other: &Pose) -> Self {
        let o = other.convert_to(self.units);
        Self {
            x: self.x + o.x,
            y: self.y + o.y,
            z: self.z + o.z,
            ..*self
        }
    }

    /// Subtract XYZ of `other`; the rotation of `self` is kept.
    pub fn subtract(&self, other: &Pose) -> Self {
        let o = other.convert_to(self.units);
        Self {
            x: self.x - o.x,
            y: self.y - o.y,
            z: self.z - o.z,
            ..*self
        }
    }

    /// Add all four components, rotation included.
    pub fn add_with_rotation(&self, other: &Pose) -> Self {
        let mut p = self.add(other);
        p.rotation = self.rotation + other.rotation;
        p
    }

    /// Subtract all four components, rotation included.
    pub fn subtract_with_rotation(&self, other: &Pose) -> Self {
        let mut p = self.subtract(other);
        p.rotation = self.rotation - other.rotation;
        p
    }

    /// Multiply XYZ by `factor`; rotation is kept.
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
            ..*self
        }
    }

    /// Rotate the XY component about the origin by `angle_deg`.
    pub fn rotate_xy(&self, angle_deg: f64) -> Self {
        if angle_deg == 0.0 {
            return *self;
        }
        let (s, c) = angle_deg.to_radians().sin_cos();
        Self {
            x: self.x * c - self.y * s,
            y: self.x * s + self.y * c,
            ..*self
        }
    }

    /// Rotate the XY component about `center` by `angle_deg`.
    pub fn rotate_xy_about(&self, center: &Pose, angle_deg: f64) -> Self {
        let c = center.convert_to(self.units);
        let local = Self {
            x: self.x - c.x,
            y: self.y - c.y,
            ..*self
        }
        .rotate_xy(angle_deg);
        Self {
            x: local.x + c.x,
            y: local.y + c.y,
            ..local
        }
    }

    /// Euclidean XY distance to `other`, in the units of `self`.
    pub fn linear_distance_to(&self, other: &Pose) -> f64 {
        let o = other.convert_to(self.units);
        (self.x - o.x).hypot(self.y - o.y)
    }

    /// Length of the XY vector as a [`Length`].
    pub fn xy_length(&self) -> Length {
        Length::new(self.x.hypot(self.y), self.units)
    }

    /// XY dot product, in `self.units²`.
    pub fn dot_xy(&self, other: &Pose) -> f64 {
        let o = other.convert_to(self.units);
        self.x * o.x + self.y * o.y
    }

    /// Copy with the rotation wrapped into `range`.
    pub fn normalized_rotation(&self, range: RotationRange) -> Self {
        let rotation = match range {
            RotationRange::Symmetric180 => wrap_upper_closed(self.rotation),
            RotationRange::Positive360 => wrap_half_open(self.rotation - 180.0) + 180.0,
        };
        Self { rotation, ..*self }
    }

    /// `true` when all components are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.rotation.is_finite()
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.4}, {:.3}°) {}",
            self.x, self.y, self.z, self.rotation, self.units
        )
    }
}
