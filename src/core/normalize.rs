//! Radiometric normalization of dB-scale imagery into the 8-bit display range.
//!
//! Two steps: a robust percentile window mapped linearly onto `0..=255`,
//! followed by contrast-limited adaptive histogram equalization (CLAHE) over
//! a grid of non-overlapping blocks. The clip limit bounds how much a block's
//! histogram can stretch, which keeps residual speckle in near-uniform
//! regions such as open water from being amplified.

use crate::types::{NormalizedImage, SarError, SarResult};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

const HIST_SIZE: usize = 256;

/// Normalization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerParams {
    /// Lower percentile of the clipping window (0-100)
    pub low_percentile: f64,
    /// Upper percentile of the clipping window (0-100)
    pub high_percentile: f64,
    /// CLAHE clip limit, as a multiple of the mean histogram bin height
    pub clip_limit: f64,
    /// CLAHE block grid as (rows, columns)
    pub tile_grid: (usize, usize),
}

impl Default for NormalizerParams {
    fn default() -> Self {
        Self {
            low_percentile: 1.0,
            high_percentile: 99.0,
            clip_limit: 3.0,
            tile_grid: (8, 8),
        }
    }
}

impl NormalizerParams {
    pub fn validate(&self) -> SarResult<()> {
        let in_range = |p: f64| p.is_finite() && (0.0..=100.0).contains(&p);
        if !in_range(self.low_percentile) || !in_range(self.high_percentile) {
            return Err(SarError::Configuration(format!(
                "Percentiles must lie in [0, 100], got {} and {}",
                self.low_percentile, self.high_percentile
            )));
        }
        if self.low_percentile >= self.high_percentile {
            return Err(SarError::Configuration(format!(
                "Low percentile {} must be below high percentile {}",
                self.low_percentile, self.high_percentile
            )));
        }
        if !(self.clip_limit.is_finite() && self.clip_limit > 0.0) {
            return Err(SarError::Configuration(format!(
                "CLAHE clip limit must be positive, got {}",
                self.clip_limit
            )));
        }
        if self.tile_grid.0 == 0 || self.tile_grid.1 == 0 {
            return Err(SarError::Configuration(format!(
                "CLAHE tile grid must be non-zero, got {:?}",
                self.tile_grid
            )));
        }
        Ok(())
    }
}

/// Why an image could not be stretched and fell back to all zeros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degeneracy {
    /// Every pixel was NaN or infinite
    NoFiniteValues,
    /// The percentile window collapsed to a single value
    ZeroDynamicRange,
}

/// Result of normalizing one image
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub image: NormalizedImage,
    /// `(p_low, p_high)` used for the linear stretch, when one existed
    pub window: Option<(f64, f64)>,
    pub degenerate: Option<Degeneracy>,
}

/// Percentile clip + linear stretch + CLAHE
pub struct RadiometricNormalizer {
    params: NormalizerParams,
}

impl RadiometricNormalizer {
    pub fn new() -> Self {
        Self {
            params: NormalizerParams::default(),
        }
    }

    pub fn with_params(params: NormalizerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &NormalizerParams {
        &self.params
    }

    /// Normalize a dB-scale image to 8 bits.
    ///
    /// Degenerate inputs (no finite pixel, or a constant image) yield an
    /// all-zero output of the same shape instead of an error.
    pub fn normalize(&self, image: &Array2<f32>) -> SarResult<NormalizeOutcome> {
        self.params.validate()?;
        log::debug!("Normalizer parameters: {:?}", self.params);

        let dim = image.dim();
        let window = match self.percentile_window(image) {
            Some(window) => window,
            None => {
                log::warn!("No finite pixels in {:?} image, emitting all-zero output", dim);
                return Ok(NormalizeOutcome {
                    image: Array2::zeros(dim),
                    window: None,
                    degenerate: Some(Degeneracy::NoFiniteValues),
                });
            }
        };

        let (p_low, p_high) = window;
        if p_high <= p_low {
            log::warn!(
                "Percentile window [{}, {}] has no dynamic range, emitting all-zero output",
                p_low,
                p_high
            );
            return Ok(NormalizeOutcome {
                image: Array2::zeros(dim),
                window: Some(window),
                degenerate: Some(Degeneracy::ZeroDynamicRange),
            });
        }

        log::debug!(
            "Stretching [{:.3}, {:.3}] (p{} / p{}) to 0..255",
            p_low,
            p_high,
            self.params.low_percentile,
            self.params.high_percentile
        );

        let stretched = rescale_to_u8(image, p_low, p_high);
        let equalized = clahe(&stretched, self.params.clip_limit, self.params.tile_grid);

        Ok(NormalizeOutcome {
            image: equalized,
            window: Some(window),
            degenerate: None,
        })
    }

    /// Configured percentile pair over the finite pixels, if there are any
    pub fn percentile_window(&self, image: &Array2<f32>) -> Option<(f64, f64)> {
        let mut values: Vec<f64> = image
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| v as f64)
            .collect();
        if values.is_empty() {
            return None;
        }

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            values.par_sort_unstable_by(f64::total_cmp);
        }

        #[cfg(not(feature = "parallel"))]
        values.sort_unstable_by(f64::total_cmp);

        Some((
            percentile_sorted(&values, self.params.low_percentile),
            percentile_sorted(&values, self.params.high_percentile),
        ))
    }
}

impl Default for RadiometricNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile of already-sorted values with linear interpolation between ranks
pub fn percentile_sorted(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (percentile.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let fraction = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

/// Clip to `[p_low, p_high]` and map linearly onto `0..=255`, rounding to nearest.
///
/// NaN maps to 0; infinities saturate at the ends of the range.
pub fn rescale_to_u8(image: &Array2<f32>, p_low: f64, p_high: f64) -> NormalizedImage {
    let span = p_high - p_low;
    image.mapv(|v| {
        if v.is_nan() || !(span > 0.0) {
            return 0;
        }
        let clipped = (v as f64).clamp(p_low, p_high);
        ((clipped - p_low) / span * 255.0).round().clamp(0.0, 255.0) as u8
    })
}

/// Contrast-limited adaptive histogram equalization of an 8-bit image.
///
/// The image is split into a `tile_grid` of blocks (fewer if the image has
/// fewer rows or columns than the grid). Each block histogram is clipped at
/// `clip_limit` times its mean bin height, the excess is spread evenly over
/// all bins, and pixels are remapped by bilinear interpolation between the
/// lookup tables of the four nearest block centres.
pub fn clahe(image: &NormalizedImage, clip_limit: f64, tile_grid: (usize, usize)) -> NormalizedImage {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return image.clone();
    }

    let tile_h = (height + tile_grid.0.clamp(1, height) - 1) / tile_grid.0.clamp(1, height);
    let tile_w = (width + tile_grid.1.clamp(1, width) - 1) / tile_grid.1.clamp(1, width);
    // Ceiling division can leave trailing blocks empty, so recount
    let grid_rows = (height + tile_h - 1) / tile_h;
    let grid_cols = (width + tile_w - 1) / tile_w;

    let mut luts = Vec::with_capacity(grid_rows * grid_cols);
    for ty in 0..grid_rows {
        let r0 = ty * tile_h;
        let r1 = (r0 + tile_h).min(height);
        for tx in 0..grid_cols {
            let c0 = tx * tile_w;
            let c1 = (c0 + tile_w).min(width);
            let block = image.slice(ndarray::s![r0..r1, c0..c1]);

            let mut hist = [0usize; HIST_SIZE];
            for &v in block.iter() {
                hist[v as usize] += 1;
            }
            luts.push(block_lut(&mut hist, block.len(), clip_limit));
        }
    }

    let mut output = Array2::<u8>::zeros((height, width));
    let remap = |(r, c): (usize, usize), out: &mut u8, &v: &u8| {
        let (ty0, ty1, wy) = neighbours(r, tile_h, grid_rows);
        let (tx0, tx1, wx) = neighbours(c, tile_w, grid_cols);
        let v = v as usize;

        let top = luts[ty0 * grid_cols + tx0][v] as f64 * (1.0 - wx)
            + luts[ty0 * grid_cols + tx1][v] as f64 * wx;
        let bottom = luts[ty1 * grid_cols + tx0][v] as f64 * (1.0 - wx)
            + luts[ty1 * grid_cols + tx1][v] as f64 * wx;
        *out = (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;
    };

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut output).and(image).par_for_each(remap);

    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut output).and(image).for_each(remap);

    output
}

/// Clip a block histogram, redistribute the excess and build its lookup table
fn block_lut(hist: &mut [usize; HIST_SIZE], area: usize, clip_limit: f64) -> [u8; HIST_SIZE] {
    let limit = ((clip_limit * area as f64 / HIST_SIZE as f64) as usize).max(1);

    let mut excess = 0usize;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let batch = excess / HIST_SIZE;
    let mut residual = excess - batch * HIST_SIZE;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (HIST_SIZE / residual).max(1);
        let mut i = 0;
        while i < HIST_SIZE && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }

    let scale = 255.0 / area.max(1) as f64;
    let mut lut = [0u8; HIST_SIZE];
    let mut cumulative = 0usize;
    for (entry, &bin) in lut.iter_mut().zip(hist.iter()) {
        cumulative += bin;
        *entry = (cumulative as f64 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Two nearest block indices along one axis and the weight of the second
#[inline]
fn neighbours(pos: usize, block: usize, blocks: usize) -> (usize, usize, f64) {
    let f = (pos as f64 + 0.5) / block as f64 - 0.5;
    let lower = f.floor();
    let weight = f - lower;
    let last = blocks as isize - 1;
    let i0 = (lower as isize).clamp(0, last) as usize;
    let i1 = (lower as isize + 1).clamp(0, last) as usize;
    (i0, i1, weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    fn gradient(height: usize, width: usize) -> Array2<f32> {
        Array::from_shape_fn((height, width), |(i, j)| -40.0 + (i * width + j) as f32 * 0.01)
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let sorted: Vec<f64> = (1..=5).map(|v| v as f64).collect();
        assert_abs_diff_eq!(percentile_sorted(&sorted, 0.0), 1.0);
        assert_abs_diff_eq!(percentile_sorted(&sorted, 50.0), 3.0);
        assert_abs_diff_eq!(percentile_sorted(&sorted, 100.0), 5.0);
        assert_abs_diff_eq!(percentile_sorted(&sorted, 10.0), 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_percentiles_ignore_non_finite() {
        let image = array![[f32::NAN, 1.0, 2.0], [f32::INFINITY, 3.0, f32::NEG_INFINITY]];
        let normalizer = RadiometricNormalizer::with_params(NormalizerParams {
            low_percentile: 0.0,
            high_percentile: 100.0,
            ..Default::default()
        });
        assert_eq!(normalizer.percentile_window(&image), Some((1.0, 3.0)));
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let image = array![[0.0f32, 0.5, 1.0, 2.0, -1.0, f32::NAN]];
        let scaled = rescale_to_u8(&image, 0.0, 1.0);
        assert_eq!(scaled, array![[0u8, 128, 255, 255, 0, 0]]);
    }

    #[test]
    fn test_output_in_range_and_shape_preserved() {
        let image = gradient(100, 100);
        let outcome = RadiometricNormalizer::new().normalize(&image).unwrap();
        assert_eq!(outcome.image.dim(), (100, 100));
        assert!(outcome.degenerate.is_none());
        // u8 already bounds the range; check the stretch actually used it
        assert!(outcome.image.iter().any(|&v| v > 200));
        assert!(outcome.image.iter().any(|&v| v < 50));
    }

    #[test]
    fn test_constant_image_yields_zeros() {
        let image = Array2::<f32>::from_elem((20, 20), -12.5);
        let outcome = RadiometricNormalizer::new().normalize(&image).unwrap();
        assert_eq!(outcome.degenerate, Some(Degeneracy::ZeroDynamicRange));
        assert!(outcome.image.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_all_non_finite_yields_zeros() {
        let image = Array2::<f32>::from_elem((8, 8), f32::NAN);
        let outcome = RadiometricNormalizer::new().normalize(&image).unwrap();
        assert_eq!(outcome.degenerate, Some(Degeneracy::NoFiniteValues));
        assert_eq!(outcome.window, None);
        assert_eq!(outcome.image.dim(), (8, 8));
        assert!(outcome.image.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let image = gradient(64, 48);
        let normalizer = RadiometricNormalizer::new();
        let first = normalizer.normalize(&image).unwrap().image;
        let second = normalizer.normalize(&image).unwrap().image;
        assert_eq!(first, second);
    }

    #[test]
    fn test_clahe_handles_images_smaller_than_grid() {
        let image = array![[0u8, 255], [128, 64], [10, 20]];
        let equalized = clahe(&image, 2.0, (8, 8));
        assert_eq!(equalized.dim(), (3, 2));
    }

    #[test]
    fn test_clahe_uniform_block_is_flat() {
        let image = Array2::<u8>::from_elem((16, 16), 90);
        let equalized = clahe(&image, 3.0, (2, 2));
        let first = equalized[[0, 0]];
        assert!(equalized.iter().all(|&v| v == first));
    }

    #[test]
    fn test_clahe_preserves_order() {
        let image = Array::from_shape_fn((32, 32), |(_, j)| (j * 8) as u8);
        let equalized = clahe(&image, 3.0, (1, 1));
        for j in 1..32 {
            assert!(equalized[[0, j]] >= equalized[[0, j - 1]]);
        }
    }

    #[test]
    fn test_invalid_params_rejected() {
        let inverted = NormalizerParams {
            low_percentile: 99.0,
            high_percentile: 1.0,
            ..Default::default()
        };
        assert!(matches!(inverted.validate(), Err(SarError::Configuration(_))));

        let equal = NormalizerParams {
            low_percentile: 5.0,
            high_percentile: 5.0,
            ..Default::default()
        };
        assert!(equal.validate().is_err());

        let no_grid = NormalizerParams {
            tile_grid: (0, 8),
            ..Default::default()
        };
        assert!(no_grid.validate().is_err());
    }
}
