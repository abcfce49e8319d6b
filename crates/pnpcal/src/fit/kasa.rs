//! Algebraic least-squares circle fit (Kasa, 1976).

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use super::FitError;

/// Minimum number of points accepted by [`fit_circle_kasa`].
pub const MIN_CIRCLE_POINTS: usize = 3;

/// Result of a circle fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleFit {
    /// Center x.
    pub cx: f64,
    /// Center y.
    pub cy: f64,
    /// Radius; `0.0` for the degenerate fallback.
    pub radius: f64,
    /// `true` when the fit fell back to "first point, zero radius".
    pub degenerate: bool,
}

impl CircleFit {
    /// Radial residual `|p - c| - r` for each point.
    pub fn residuals<'a>(&'a self, points: &'a [[f64; 2]]) -> impl Iterator<Item = f64> + 'a {
        points
            .iter()
            .map(move |p| (p[0] - self.cx).hypot(p[1] - self.cy) - self.radius)
    }

    /// RMS radial residual over `points`.
    pub fn rms_residual(&self, points: &[[f64; 2]]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.residuals(points).map(|e| e * e).sum();
        (sum_sq / points.len() as f64).sqrt()
    }

    /// Largest absolute radial residual over `points`.
    pub fn peak_residual(&self, points: &[[f64; 2]]) -> f64 {
        self.residuals(points).map(f64::abs).fold(0.0, f64::max)
    }
}

/// Fit a circle to `points` with the Kasa method.
///
/// The points are centered on their mean, the 2x2 normal equations built from
/// the second moments (`Mxx`, `Myy`, `Mxy`) and the mixed moments with the
/// squared radius (`Mxz`, `Myz`) are solved with a Cholesky factorization.
///
/// If the factorization fails or produces a non-finite value (all points
/// coincident, or collinear), the result is the first point with radius 0,
/// i.e. "no runout, constant offset".
pub fn fit_circle_kasa(points: &[[f64; 2]]) -> Result<CircleFit, FitError> {
    let n = points.len();
    if n < MIN_CIRCLE_POINTS {
        return Err(FitError::TooFewPoints {
            needed: MIN_CIRCLE_POINTS,
            got: n,
        });
    }

    let nf = n as f64;
    let mean_x = points.iter().map(|p| p[0]).sum::<f64>() / nf;
    let mean_y = points.iter().map(|p| p[1]).sum::<f64>() / nf;

    let (mut mxx, mut myy, mut mxy, mut mxz, mut myz) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let xi = p[0] - mean_x;
        let yi = p[1] - mean_y;
        let zi = xi * xi + yi * yi;
        mxx += xi * xi;
        myy += yi * yi;
        mxy += xi * yi;
        mxz += xi * zi;
        myz += yi * zi;
    }
    mxx /= nf;
    myy /= nf;
    mxy /= nf;
    mxz /= nf;
    myz /= nf;

    let degenerate = || CircleFit {
        cx: points[0][0],
        cy: points[0][1],
        radius: 0.0,
        degenerate: true,
    };

    // [Mxx Mxy; Mxy Myy] · [2B; 2C] = [Mxz; Myz]
    let normal = Matrix2::new(mxx, mxy, mxy, myy);
    let Some(chol) = normal.cholesky() else {
        return Ok(degenerate());
    };
    let sol = chol.solve(&Vector2::new(mxz, myz));
    let b = 0.5 * sol[0];
    let c = 0.5 * sol[1];

    let fit = CircleFit {
        cx: b + mean_x,
        cy: c + mean_y,
        radius: (b * b + c * c + mxx + myy).sqrt(),
        degenerate: false,
    };
    if fit.cx.is_finite() && fit.cy.is_finite() && fit.radius.is_finite() {
        Ok(fit)
    } else {
        Ok(degenerate())
    }
}
