//! Part geometry used by the bottom-vision size check.

use serde::{Deserialize, Serialize};

use crate::geometry::{Length, LengthUnit};

/// Rectangular pad of a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pad {
    /// Center `[x, y]` relative to the part origin.
    pub center: [f64; 2],
    pub width: f64,
    pub height: f64,
    /// Degrees, counter-clockwise.
    #[serde(default)]
    pub rotation: f64,
}

impl Pad {
    fn corners(&self) -> [[f64; 2]; 4] {
        let (s, c) = self.rotation.to_radians().sin_cos();
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
            .map(|(x, y)| [self.center[0] + x * c - y * s, self.center[1] + x * s + y * c])
    }
}

/// Body outline and pads of a package.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Footprint {
    pub units: LengthUnit,
    pub body_width: f64,
    pub body_height: f64,
    pub pads: Vec<Pad>,
}

impl Footprint {
    /// `[width, height]` of the body.
    pub fn body_size(&self) -> [Length; 2] {
        [
            Length::new(self.body_width, self.units),
            Length::new(self.body_height, self.units),
        ]
    }

    /// `[width, height]` of the axis-aligned box around every rotated pad,
    /// `None` without pads.
    pub fn pad_extents(&self) -> Option<[Length; 2]> {
        let mut corners = self.pads.iter().flat_map(Pad::corners);
        let first = corners.next()?;
        let (mut min, mut max) = (first, first);
        for [x, y] in corners {
            min = [min[0].min(x), min[1].min(y)];
            max = [max[0].max(x), max[1].max(y)];
        }
        Some([
            Length::new(max[0] - min[0], self.units),
            Length::new(max[1] - min[1], self.units),
        ])
    }
}

/// A part to align: its footprint and, when known, its height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    /// Height of the part body; `None` asks for auto focus.
    pub height: Option<Length>,
    pub footprint: Footprint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pad_extents_cover_rotated_pads() {
        let fp = Footprint {
            units: LengthUnit::Millimeters,
            body_width: 2.0,
            body_height: 1.25,
            pads: vec![
                Pad {
                    center: [-1.0, 0.0],
                    width: 0.6,
                    height: 1.0,
                    rotation: 0.0,
                },
                Pad {
                    center: [1.0, 0.0],
                    width: 0.6,
                    height: 1.0,
                    rotation: 90.0,
                },
            ],
        };
        let [w, h] = fp.pad_extents().unwrap();
        // Left pad spans x in [-1.3, -0.7]; right pad rotated spans [0.5, 1.5].
        assert_relative_eq!(w.to_mm(), 2.8, epsilon = 1e-12);
        assert_relative_eq!(h.to_mm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn no_pads_no_extents() {
        assert!(Footprint::default().pad_extents().is_none());
    }
}
