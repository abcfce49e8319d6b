//! Runout compensation variants built from a rotation sweep.

use serde::{Deserialize, Serialize};

use crate::fit::{fit_circle_kasa, FitError, MIN_CIRCLE_POINTS};
use crate::geometry::{angle_diff_ccw, wrap_half_open, wrap_upper_closed, LengthUnit, Pose};

/// Detected tip offset at one commanded rotation.
///
/// `offset.rotation` carries the commanded angle as well.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunoutSample {
    pub angle: f64,
    pub offset: Pose,
}

impl RunoutSample {
    pub fn new(angle: f64, offset: Pose) -> Self {
        Self {
            angle,
            offset: offset.with_rotation(angle),
        }
    }
}

/// Variant built by a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunoutMethod {
    /// Interpolate the raw samples.
    Table,
    /// Fitted circle, re-centered on the fitted axis.
    #[default]
    Model,
    /// Fitted circle without the axis offset.
    ModelNoOffset,
    /// Fitted circle; the axis offset becomes a camera offset.
    ModelCameraOffset,
}

/// Fitted runout circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleModel {
    pub units: LengthUnit,
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    /// Commanded angle minus the angle of the tip on the circle, degrees.
    pub phase_shift: f64,
    /// RMS distance between the samples and the model prediction.
    pub rms_error: f64,
    /// Largest distance between a sample and the model prediction.
    pub peak_error: f64,
}

impl CircleModel {
    /// Fit a circle through the sample offsets and derive the phase shift.
    pub fn fit(samples: &[RunoutSample]) -> Result<Self, FitError> {
        let Some(first) = samples.first() else {
            return Err(FitError::TooFewPoints {
                needed: MIN_CIRCLE_POINTS,
                got: 0,
            });
        };
        let units = first.offset.units;
        let points: Vec<[f64; 2]> = samples
            .iter()
            .map(|s| {
                let p = s.offset.convert_to(units);
                [p.x, p.y]
            })
            .collect();
        let circle = fit_circle_kasa(&points)?;
        let phase_shift = if circle.radius > 0.0 {
            phase_shift([circle.cx, circle.cy], samples, units)
        } else {
            0.0
        };

        let mut model = Self {
            units,
            center_x: circle.cx,
            center_y: circle.cy,
            radius: circle.radius,
            phase_shift,
            rms_error: 0.0,
            peak_error: 0.0,
        };
        let errors: Vec<f64> = samples
            .iter()
            .zip(&points)
            .map(|(s, p)| {
                let predicted = model.center().add(&model.circle_point(s.angle));
                (p[0] - predicted.x).hypot(p[1] - predicted.y)
            })
            .collect();
        model.rms_error = (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt();
        model.peak_error = errors.iter().copied().fold(0.0, f64::max);
        Ok(model)
    }

    /// Fitted rotation axis position.
    pub fn center(&self) -> Pose {
        Pose::xy(self.units, self.center_x, self.center_y)
    }

    /// Runout vector at `angle`, relative to the fitted axis.
    pub fn circle_point(&self, angle: f64) -> Pose {
        let t = (angle - self.phase_shift).to_radians();
        Pose::xy(self.units, self.radius * t.cos(), self.radius * t.sin())
    }
}

/// Mean phase shift between commanded angles and the angles of the samples
/// around `center`, normalized into `(-180, 180]`.
///
/// Per-sample differences are unwrapped into ±180° around the first one
/// before averaging, so shifts close to ±180° do not cancel out.
pub fn phase_shift(center: [f64; 2], samples: &[RunoutSample], units: LengthUnit) -> f64 {
    let mut diffs = samples.iter().map(|s| {
        let p = s.offset.convert_to(units);
        let measured = (p.y - center[1]).atan2(p.x - center[0]).to_degrees();
        s.angle - measured
    });
    let Some(first) = diffs.next().map(wrap_upper_closed) else {
        return 0.0;
    };
    let mut sum = first;
    let mut n = 1usize;
    for d in diffs {
        sum += first + wrap_upper_closed(d - first);
        n += 1;
    }
    wrap_upper_closed(sum / n as f64)
}

/// Angle-dependent nozzle tip offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RunoutCompensation {
    /// Samples sorted by angle in `[-180, 180)`.
    Table { samples: Vec<RunoutSample> },
    Model(CircleModel),
    ModelNoOffset(CircleModel),
    ModelCameraOffset(CircleModel),
}

impl RunoutCompensation {
    /// Build the `method` variant from a sweep.
    pub fn from_samples(method: RunoutMethod, samples: &[RunoutSample]) -> Result<Self, FitError> {
        if samples.len() < MIN_CIRCLE_POINTS {
            return Err(FitError::TooFewPoints {
                needed: MIN_CIRCLE_POINTS,
                got: samples.len(),
            });
        }
        Ok(match method {
            RunoutMethod::Table => Self::table(samples),
            RunoutMethod::Model => Self::Model(CircleModel::fit(samples)?),
            RunoutMethod::ModelNoOffset => Self::ModelNoOffset(CircleModel::fit(samples)?),
            RunoutMethod::ModelCameraOffset => Self::ModelCameraOffset(CircleModel::fit(samples)?),
        })
    }

    fn table(samples: &[RunoutSample]) -> Self {
        let units = samples[0].offset.units;
        let mut sorted: Vec<RunoutSample> = samples
            .iter()
            .map(|s| {
                let angle = wrap_half_open(s.angle);
                RunoutSample::new(angle, s.offset.convert_to(units))
            })
            .collect();
        sorted.sort_by(|a, b| a.angle.total_cmp(&b.angle));
        Self::Table { samples: sorted }
    }

    pub fn method(&self) -> RunoutMethod {
        match self {
            Self::Table { .. } => RunoutMethod::Table,
            Self::Model(_) => RunoutMethod::Model,
            Self::ModelNoOffset(_) => RunoutMethod::ModelNoOffset,
            Self::ModelCameraOffset(_) => RunoutMethod::ModelCameraOffset,
        }
    }

    /// Fitted circle, `None` for the table variant.
    pub fn circle(&self) -> Option<&CircleModel> {
        match self {
            Self::Table { .. } => None,
            Self::Model(m) | Self::ModelNoOffset(m) | Self::ModelCameraOffset(m) => Some(m),
        }
    }

    fn units(&self) -> LengthUnit {
        match self {
            Self::Table { samples } => samples
                .first()
                .map(|s| s.offset.units)
                .unwrap_or_default(),
            Self::Model(m) | Self::ModelNoOffset(m) | Self::ModelCameraOffset(m) => m.units,
        }
    }

    /// Tip offset to compensate at nozzle rotation `angle` (XY only).
    pub fn offset(&self, angle: f64) -> Pose {
        match self {
            Self::Table { samples } => interpolate_table(samples, angle),
            Self::Model(m) => m.center().add(&m.circle_point(angle)),
            Self::ModelNoOffset(m) | Self::ModelCameraOffset(m) => m.circle_point(angle),
        }
    }

    /// Tool-specific camera mounting offset.
    pub fn camera_offset(&self) -> Pose {
        match self {
            Self::ModelCameraOffset(m) => m.center(),
            _ => Pose::zero(self.units()),
        }
    }

    /// Rotation axis offset, `None` when the variant does not model one.
    pub fn axis_offset(&self) -> Option<Pose> {
        self.circle().map(CircleModel::center)
    }
}

fn interpolate_table(samples: &[RunoutSample], angle: f64) -> Pose {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Pose::zero(LengthUnit::default());
    };
    if samples.len() == 1 {
        return first.offset.with_rotation(0.0);
    }
    let q = wrap_half_open(angle);
    let hi = samples.iter().position(|s| s.angle > q);
    let (a, b) = match hi {
        Some(0) | None => (last, first),
        Some(i) => (&samples[i - 1], &samples[i]),
    };
    let span = angle_diff_ccw(a.angle, b.angle);
    let t = if span > 0.0 {
        angle_diff_ccw(a.angle, q) / span
    } else {
        0.0
    };
    let b_off = b.offset.convert_to(a.offset.units);
    Pose::xy(
        a.offset.units,
        a.offset.x + t * (b_off.x - a.offset.x),
        a.offset.y + t * (b_off.y - a.offset.y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn circle_samples(center: [f64; 2], r: f64, shift: f64, angles: &[f64]) -> Vec<RunoutSample> {
        angles
            .iter()
            .map(|&a| {
                let t = (a - shift).to_radians();
                RunoutSample::new(
                    a,
                    Pose::xy(
                        LengthUnit::Millimeters,
                        center[0] + r * t.cos(),
                        center[1] + r * t.sin(),
                    ),
                )
            })
            .collect()
    }

    fn sweep(n: usize) -> Vec<f64> {
        (0..n).map(|i| -180.0 + 360.0 * i as f64 / n as f64).collect()
    }

    #[test]
    fn phase_shift_is_recovered_for_any_sample_count() {
        for shift in [0.0, 25.0, -70.0, 135.0, 179.0, 180.0, -179.0] {
            for n in [3, 4, 7, 12] {
                let samples = circle_samples([0.3, -0.1], 0.05, shift, &sweep(n));
                let model = CircleModel::fit(&samples).unwrap();
                let err = wrap_upper_closed(model.phase_shift - shift);
                assert!(err.abs() < 1e-6, "shift {shift}, n {n}: {}", model.phase_shift);
            }
        }
    }

    #[test]
    fn model_reproduces_samples() {
        let samples = circle_samples([0.02, 0.04], 0.08, 40.0, &sweep(6));
        let model = RunoutCompensation::from_samples(RunoutMethod::Model, &samples).unwrap();
        for s in &samples {
            let o = model.offset(s.angle);
            assert_relative_eq!(o.x, s.offset.x, epsilon = 1e-9);
            assert_relative_eq!(o.y, s.offset.y, epsilon = 1e-9);
        }
        let circle = model.circle().unwrap();
        assert!(circle.rms_error < 1e-9);
        assert!(circle.peak_error < 1e-9);
    }

    #[test]
    fn variants_split_center_and_runout() {
        let samples = circle_samples([0.5, -0.25], 0.1, 10.0, &sweep(8));
        let full = RunoutCompensation::from_samples(RunoutMethod::Model, &samples).unwrap();
        let no_off =
            RunoutCompensation::from_samples(RunoutMethod::ModelNoOffset, &samples).unwrap();
        let cam =
            RunoutCompensation::from_samples(RunoutMethod::ModelCameraOffset, &samples).unwrap();

        let a = 33.0;
        let diff = full.offset(a).subtract(&no_off.offset(a));
        assert_relative_eq!(diff.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(diff.y, -0.25, epsilon = 1e-9);
        assert_eq!(no_off.offset(a), cam.offset(a));

        assert_eq!(full.camera_offset(), Pose::zero(LengthUnit::Millimeters));
        let c = cam.camera_offset();
        assert_relative_eq!(c.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(c.y, -0.25, epsilon = 1e-9);
        assert!(full.axis_offset().is_some());
    }

    #[test]
    fn degenerate_samples_give_constant_offset() {
        let samples: Vec<RunoutSample> = sweep(5)
            .into_iter()
            .map(|a| RunoutSample::new(a, Pose::xy(LengthUnit::Millimeters, 0.1, 0.2)))
            .collect();
        let model = RunoutCompensation::from_samples(RunoutMethod::Model, &samples).unwrap();
        let circle = model.circle().unwrap();
        assert_eq!(circle.radius, 0.0);
        assert_eq!(circle.phase_shift, 0.0);
        let o = model.offset(77.0);
        assert_relative_eq!(o.x, 0.1);
        assert_relative_eq!(o.y, 0.2);
    }

    fn table_of(points: &[(f64, f64, f64)]) -> RunoutCompensation {
        let samples: Vec<RunoutSample> = points
            .iter()
            .map(|&(a, x, y)| RunoutSample::new(a, Pose::xy(LengthUnit::Millimeters, x, y)))
            .collect();
        RunoutCompensation::from_samples(RunoutMethod::Table, &samples).unwrap()
    }

    #[test]
    fn table_interpolates_midpoint_and_hits_samples_exactly() {
        let table = table_of(&[(0.0, 1.0, 0.0), (90.0, 0.0, 1.0), (-90.0, 0.0, -1.0)]);
        let mid = table.offset(45.0);
        assert_relative_eq!(mid.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(mid.y, 0.5, epsilon = 1e-12);
        let exact = table.offset(90.0);
        assert_eq!((exact.x, exact.y), (0.0, 1.0));
        assert!(table.axis_offset().is_none());
    }

    #[test]
    fn table_wraps_from_last_to_first() {
        let table = table_of(&[(-120.0, 0.0, 0.0), (0.0, 3.0, 0.0), (120.0, 6.0, 0.0)]);
        // Between 120 and -120 (= 240), ccw distance 120.
        let o = table.offset(180.0);
        assert_relative_eq!(o.x, 3.0, epsilon = 1e-12);
        let o = table.offset(-150.0);
        assert_relative_eq!(o.x, 1.5, epsilon = 1e-12);
        // Same angle written outside [-180, 180).
        let o = table.offset(210.0);
        assert_relative_eq!(o.x, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn table_sorts_unordered_samples() {
        let table = table_of(&[(170.0, 1.0, 0.0), (-10.0, 2.0, 0.0), (350.0, 3.0, 0.0)]);
        let RunoutCompensation::Table { samples } = &table else {
            panic!("expected table");
        };
        let angles: Vec<f64> = samples.iter().map(|s| s.angle).collect();
        assert_eq!(angles, vec![-10.0, -10.0, 170.0]);
    }

    #[test]
    fn serde_keeps_variant() {
        let samples = circle_samples([0.0, 0.0], 0.1, 5.0, &sweep(4));
        let model =
            RunoutCompensation::from_samples(RunoutMethod::ModelCameraOffset, &samples).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"method\":\"model_camera_offset\""));
        let back: RunoutCompensation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method(), RunoutMethod::ModelCameraOffset);
        let (a, b) = (model.circle().unwrap(), back.circle().unwrap());
        assert_relative_eq!(a.radius, b.radius, epsilon = 1e-12);
        assert_relative_eq!(a.phase_shift, b.phase_shift, epsilon = 1e-9);
    }
}
