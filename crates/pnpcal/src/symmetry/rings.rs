//! Concentric sampling bands and per-candidate symmetry scoring.

/// One concentric band of pixel offsets.
#[derive(Debug, Clone)]
pub(super) struct Band {
    /// Inner radius of the band (pixels).
    pub inner_radius: f64,
    /// Pixel offsets `(dx, dy)` from the candidate center.
    pub offsets: Vec<(i32, i32)>,
}

/// One-pixel-wide bands around a candidate center.
///
/// Every pixel offset in range is read, whatever grid the candidate centers
/// are searched on. Empty bands are dropped.
#[derive(Debug, Clone)]
pub(super) struct RingLayout {
    pub bands: Vec<Band>,
    /// Largest absolute offset along either axis.
    pub reach: i32,
}

impl RingLayout {
    /// Bands covering `[r_min - 1, r_max + 1)`, clamped at zero.
    ///
    /// The extra band on each side lets a feature whose diameter sits
    /// exactly on a bound still show its edge against the neighbouring band.
    pub fn new(r_min: u32, r_max: u32) -> Self {
        let start = r_min.saturating_sub(1);
        let outer = r_max + 1;
        let mut bands: Vec<Band> = (start..outer)
            .map(|r| Band {
                inner_radius: r as f64,
                offsets: Vec::new(),
            })
            .collect();

        let lim = outer as i32;
        let mut reach = 0;
        for dy in -lim..=lim {
            for dx in -lim..=lim {
                let d = ((dx * dx + dy * dy) as f64).sqrt();
                if d >= start as f64 && d < outer as f64 {
                    let k = (d.floor() as u32 - start) as usize;
                    if let Some(band) = bands.get_mut(k) {
                        band.offsets.push((dx, dy));
                        reach = reach.max(dx.abs()).max(dy.abs());
                    }
                }
            }
        }
        bands.retain(|b| !b.offsets.is_empty());
        Self { bands, reach }
    }
}

/// Interleaved 8-bit pixel data with a fixed channel count.
#[derive(Clone, Copy)]
pub(super) struct Planes<'a> {
    pub raw: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl Planes<'_> {
    #[inline]
    fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let i = (y * self.width + x) * self.channels;
        &self.raw[i..i + self.channels]
    }
}

/// Score of one candidate center.
#[derive(Debug, Clone)]
pub(super) struct CandidateScore {
    /// Overall disc variance divided by the summed per-band variance.
    pub score: f64,
    /// Share of the overall variance explained by the band means: overall
    /// variance minus the pixel-weighted mean of the band variances.
    ///
    /// Unlike `score` it falls off smoothly as the candidate leaves the
    /// feature center, so it ranks the coarse grid.
    pub concentric_variance: f64,
    /// Mean brightness (averaged over channels) per band.
    pub band_means: Vec<f64>,
}

const MAX_CHANNELS: usize = 4;
const RING_VARIANCE_FLOOR: f64 = 1e-9;

/// Score the candidate at `(cx, cy)`.
///
/// The caller guarantees that every offset of `layout` stays inside the image.
pub(super) fn score_candidate(
    planes: Planes<'_>,
    layout: &RingLayout,
    cx: i32,
    cy: i32,
) -> CandidateScore {
    let ch = planes.channels.min(MAX_CHANNELS);
    let mut all_sum = [0.0f64; MAX_CHANNELS];
    let mut all_sq = [0.0f64; MAX_CHANNELS];
    let mut all_n = 0usize;
    let mut ring_variance = 0.0f64;
    let mut within_sum = 0.0f64;
    let mut band_means = Vec::with_capacity(layout.bands.len());

    for band in &layout.bands {
        let mut sum = [0.0f64; MAX_CHANNELS];
        let mut sq = [0.0f64; MAX_CHANNELS];
        for &(dx, dy) in &band.offsets {
            let px = planes.pixel((cx + dx) as usize, (cy + dy) as usize);
            for c in 0..ch {
                let v = px[c] as f64;
                sum[c] += v;
                sq[c] += v * v;
            }
        }
        let n = band.offsets.len() as f64;
        let mut mean_acc = 0.0;
        for c in 0..ch {
            let mean = sum[c] / n;
            let variance = (sq[c] / n - mean * mean).max(0.0);
            ring_variance += variance;
            within_sum += variance * n;
            mean_acc += mean;
            all_sum[c] += sum[c];
            all_sq[c] += sq[c];
        }
        all_n += band.offsets.len();
        band_means.push(mean_acc / ch as f64);
    }

    let mut overall_variance = 0.0;
    let mut within_variance = 0.0;
    if all_n > 0 {
        let n = all_n as f64;
        for c in 0..ch {
            let mean = all_sum[c] / n;
            overall_variance += (all_sq[c] / n - mean * mean).max(0.0);
        }
        within_variance = within_sum / n;
    }

    CandidateScore {
        score: overall_variance / (ring_variance + RING_VARIANCE_FLOOR),
        concentric_variance: overall_variance - within_variance,
        band_means,
    }
}

/// Boundary radius with the largest mean-brightness jump between
/// consecutive bands; `None` with fewer than two bands.
pub(super) fn strongest_edge_radius(layout: &RingLayout, band_means: &[f64]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for k in 0..band_means.len().saturating_sub(1) {
        let jump = (band_means[k + 1] - band_means[k]).abs();
        if best.map_or(true, |(j, _)| jump > j) {
            best = Some((jump, layout.bands[k + 1].inner_radius));
        }
    }
    best.map(|(_, r)| r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_step_layout_covers_every_pixel_once() {
        let layout = RingLayout::new(0, 5);
        let n: usize = layout.bands.iter().map(|b| b.offsets.len()).sum();
        // All integer offsets with distance < 6.
        let mut expected = 0;
        for dy in -6i32..=6 {
            for dx in -6i32..=6 {
                if (((dx * dx + dy * dy) as f64).sqrt()) < 6.0 {
                    expected += 1;
                }
            }
        }
        assert_eq!(n, expected);
        assert_eq!(layout.reach, 5);
        assert_eq!(layout.bands[0].inner_radius, 0.0);
    }

    #[test]
    fn bands_are_one_pixel_wide_around_the_bounds() {
        let layout = RingLayout::new(4, 12);
        assert_eq!(layout.bands.first().map(|b| b.inner_radius), Some(3.0));
        assert_eq!(layout.bands.last().map(|b| b.inner_radius), Some(12.0));
        for band in &layout.bands {
            for &(dx, dy) in &band.offsets {
                let d = ((dx * dx + dy * dy) as f64).sqrt();
                assert!(d >= band.inner_radius && d < band.inner_radius + 1.0);
            }
        }
        assert_eq!(layout.reach, 12);
    }

    #[test]
    fn concentric_variance_peaks_at_disc_center() {
        let img = crate::test_utils::draw_disc_image(60, 60, [30.0, 30.0], 6.0, 230, 30);
        let planes = Planes {
            raw: img.as_raw(),
            width: 60,
            height: 60,
            channels: 1,
        };
        let layout = RingLayout::new(6, 20);
        let center = score_candidate(planes, &layout, 30, 30);
        let mut last = center.concentric_variance;
        for dx in 1..=4 {
            let off = score_candidate(planes, &layout, 30 + dx, 30);
            assert!(off.concentric_variance < last, "dx={dx}");
            last = off.concentric_variance;
        }
    }

    #[test]
    fn strongest_edge_picks_largest_jump() {
        let layout = RingLayout::new(2, 5);
        let means: Vec<f64> = layout
            .bands
            .iter()
            .map(|b| if b.inner_radius < 4.0 { 200.0 } else { 20.0 })
            .collect();
        assert_eq!(strongest_edge_radius(&layout, &means), Some(4.0));
    }
}
