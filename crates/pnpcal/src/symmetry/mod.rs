//! Circular-symmetry detection.
//!
//! Finds the center and diameter of the strongest circular contrast feature
//! near a seed position: a nozzle tip seen from below, a round fiducial, a
//! drilled hole. Around each candidate center the detector reads concentric
//! bands of pixels. A circular feature makes every band internally uniform
//! while the disc as a whole has high contrast, so the score
//!
//! ```text
//! score = overall variance / Σ band variance
//! ```
//!
//! peaks at the feature center. It peaks sharply: one pixel off center the
//! score is already no better than a background spot whose outer band clips
//! the feature. Coarse grids therefore rank candidates by the variance the
//! band means explain, which falls off smoothly around the center, and only
//! the final single-pixel level ranks by the score. Bands are always read at
//! full resolution; only the candidate grid is thinned. The search is fully
//! deterministic.

mod rings;

use image::{ImageBuffer, Pixel};
use serde::{Deserialize, Serialize};

use rings::{score_candidate, strongest_edge_radius, CandidateScore, Planes, RingLayout};

/// Pixels kept free between the search window and the image border.
const WINDOW_MARGIN_PX: i32 = 1;

/// Search parameters, all in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetryParams {
    /// Largest feature diameter considered.
    pub max_diameter: u32,
    /// Smallest feature diameter considered.
    pub min_diameter: u32,
    /// Maximum distance of the feature center from the seed.
    pub max_search_distance: u32,
    /// Grid step of the coarse center search; refined down to 1.
    pub sub_sampling: u32,
}

impl Default for SymmetryParams {
    fn default() -> Self {
        Self {
            max_diameter: 60,
            min_diameter: 10,
            max_search_distance: 40,
            sub_sampling: 4,
        }
    }
}

/// Detected circular feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymmetryCircle {
    /// Center `[x, y]` in image pixels.
    pub center: [f64; 2],
    /// Diameter in pixels.
    pub diameter: f64,
    /// Symmetry score of the winning candidate.
    pub score: f64,
}

/// Errors from [`find_circular_symmetry`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SymmetryError {
    /// The seed, search distance and diameter do not fit inside the image.
    #[error(
        "search window around ({center_x}, {center_y}) with reach {reach}px does not fit inside the {width}x{height} image"
    )]
    WindowOutsideImage {
        center_x: i32,
        center_y: i32,
        reach: i32,
        width: u32,
        height: u32,
    },
    /// Inconsistent parameters (zero diameter, min above max, ...).
    #[error("invalid circular symmetry parameters: {0}")]
    InvalidParameters(String),
}

/// Find the strongest circular-symmetry feature around `(center_x, center_y)`.
///
/// Works on any 8-bit image (`GrayImage`, `RgbImage`, ...); variances are
/// computed per channel and summed.
pub fn find_circular_symmetry<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    center_x: i32,
    center_y: i32,
    params: &SymmetryParams,
) -> Result<SymmetryCircle, SymmetryError>
where
    P: Pixel<Subpixel = u8>,
{
    validate(params)?;
    let (width, height) = image.dimensions();
    let planes = Planes {
        raw: image.as_raw(),
        width: width as usize,
        height: height as usize,
        channels: P::CHANNEL_COUNT as usize,
    };
    let r_min = params.min_diameter / 2;
    let r_max = params.max_diameter.div_ceil(2);

    let layout = RingLayout::new(r_min, r_max);
    let reach = layout.reach;
    let mut search = params.max_search_distance as i32;
    if free_room(planes, center_x, center_y) < search + reach {
        return Err(SymmetryError::WindowOutsideImage {
            center_x,
            center_y,
            reach: search + reach,
            width,
            height,
        });
    }

    let mut cx = center_x;
    let mut cy = center_y;
    let mut best = None;
    for step in refinement_steps(params.sub_sampling) {
        let rank = if step == 1 {
            Rank::Score
        } else {
            Rank::Concentric
        };
        let (bx, by, score) = search_level(planes, &layout, cx, cy, search, step, rank);
        tracing::trace!(
            step,
            search,
            x = bx,
            y = by,
            score = score.score,
            "circular symmetry level"
        );
        // The next level looks one coarse step (plus one pixel) around the
        // winner, limited so every ring stays inside the image.
        search = (step as i32 + 1).min(free_room(planes, bx, by) - reach);
        cx = bx;
        cy = by;
        best = Some(score);
    }

    let Some(score) = best else {
        return Err(SymmetryError::InvalidParameters(
            "no refinement level".to_string(),
        ));
    };
    let radius = strongest_edge_radius(&layout, &score.band_means).unwrap_or(r_min as f64);
    Ok(SymmetryCircle {
        center: [cx as f64, cy as f64],
        diameter: 2.0 * radius,
        score: score.score,
    })
}

/// Grid steps from `sub_sampling` halving down to 1.
fn refinement_steps(sub_sampling: u32) -> Vec<u32> {
    let mut steps = Vec::new();
    let mut step = sub_sampling.max(1);
    loop {
        steps.push(step);
        if step == 1 {
            return steps;
        }
        step = (step / 2).max(1);
    }
}

/// Candidate ranking used by a search level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rank {
    Concentric,
    Score,
}

impl Rank {
    fn key(self, candidate: &CandidateScore) -> f64 {
        match self {
            Rank::Concentric => candidate.concentric_variance,
            Rank::Score => candidate.score,
        }
    }
}

fn validate(params: &SymmetryParams) -> Result<(), SymmetryError> {
    if params.max_diameter == 0 {
        return Err(SymmetryError::InvalidParameters(
            "max_diameter must be positive".to_string(),
        ));
    }
    if params.min_diameter > params.max_diameter {
        return Err(SymmetryError::InvalidParameters(format!(
            "min_diameter {} exceeds max_diameter {}",
            params.min_diameter, params.max_diameter
        )));
    }
    if params.sub_sampling == 0 {
        return Err(SymmetryError::InvalidParameters(
            "sub_sampling must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Distance from `(x, y)` to the nearest usable border pixel.
fn free_room(planes: Planes<'_>, x: i32, y: i32) -> i32 {
    let w = planes.width as i32;
    let h = planes.height as i32;
    let left = x - WINDOW_MARGIN_PX;
    let right = w - 1 - WINDOW_MARGIN_PX - x;
    let top = y - WINDOW_MARGIN_PX;
    let bottom = h - 1 - WINDOW_MARGIN_PX - y;
    left.min(right).min(top).min(bottom)
}

/// Score every candidate on the `step` grid within `search` of `(cx, cy)`.
///
/// Ties keep the first candidate in row-major scan order.
fn search_level(
    planes: Planes<'_>,
    layout: &RingLayout,
    cx: i32,
    cy: i32,
    search: i32,
    step: u32,
    rank: Rank,
) -> (i32, i32, CandidateScore) {
    let s = step as i32;
    let lim = search / s * s;
    let mut best = (cx, cy, score_candidate(planes, layout, cx, cy));
    let mut dy = -lim;
    while dy <= lim {
        let mut dx = -lim;
        while dx <= lim {
            if dx * dx + dy * dy <= search * search && (dx, dy) != (0, 0) {
                let candidate = score_candidate(planes, layout, cx + dx, cy + dy);
                if rank.key(&candidate) > rank.key(&best.2) {
                    best = (cx + dx, cy + dy, candidate);
                }
            }
            dx += s;
        }
        dy += s;
    }
    best
}
