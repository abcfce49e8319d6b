//! Length units carried by machine poses.

use serde::{Deserialize, Serialize};

/// Length unit tag for [`Pose`](super::Pose) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    Millimeters,
    Centimeters,
    Meters,
    Microns,
    Inches,
    Feet,
    Mils,
}

impl LengthUnit {
    /// Size of one unit in millimeters.
    pub fn millimeters_per_unit(self) -> f64 {
        match self {
            Self::Millimeters => 1.0,
            Self::Centimeters => 10.0,
            Self::Meters => 1000.0,
            Self::Microns => 0.001,
            Self::Inches => 25.4,
            Self::Feet => 304.8,
            Self::Mils => 0.0254,
        }
    }

    /// Convert `value` expressed in `self` into `target` units.
    #[inline]
    pub fn convert(self, value: f64, target: LengthUnit) -> f64 {
        if self == target {
            return value;
        }
        value * self.millimeters_per_unit() / target.millimeters_per_unit()
    }

    /// Short symbol used in log output.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Millimeters => "mm",
            Self::Centimeters => "cm",
            Self::Meters => "m",
            Self::Microns => "um",
            Self::Inches => "in",
            Self::Feet => "ft",
            Self::Mils => "mil",
        }
    }
}

impl std::fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A scalar length with its unit, used for tolerances and distances in settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Length {
    pub value: f64,
    pub units: LengthUnit,
}

impl Length {
    pub fn new(value: f64, units: LengthUnit) -> Self {
        Self { value, units }
    }

    pub fn mm(value: f64) -> Self {
        Self::new(value, LengthUnit::Millimeters)
    }

    /// Value expressed in `units`.
    pub fn to_units(self, units: LengthUnit) -> f64 {
        self.units.convert(self.value, units)
    }

    pub fn to_mm(self) -> f64 {
        self.to_units(LengthUnit::Millimeters)
    }
}

impl Default for Length {
    fn default() -> Self {
        Self::mm(0.0)
    }
}

impl std::fmt::Display for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}{}", self.value, self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inch_to_mm() {
        assert_relative_eq!(
            LengthUnit::Inches.convert(1.0, LengthUnit::Millimeters),
            25.4
        );
        assert_relative_eq!(
            LengthUnit::Millimeters.convert(25.4, LengthUnit::Mils),
            1000.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn length_to_units() {
        let l = Length::new(2.0, LengthUnit::Centimeters);
        assert_relative_eq!(l.to_mm(), 20.0);
        assert_relative_eq!(l.to_units(LengthUnit::Microns), 20_000.0, epsilon = 1e-9);
    }
}
