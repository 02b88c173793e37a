use crate::types::{FilteredImage, SarError, SarResult};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Regularizer in the Lee weight and floor for local variance
pub const LEE_EPSILON: f64 = 1e-10;

/// Speckle filtering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeckleFilterParams {
    /// Filter window size (must be odd)
    pub window_size: usize,
    /// Filter applied by [`SpeckleFilter::filter`]
    pub filter_type: SpeckleFilterType,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        Self {
            window_size: 7,                    // 7x7 window
            filter_type: SpeckleFilterType::Lee,
        }
    }
}

impl SpeckleFilterParams {
    /// Reject even or zero window sizes
    pub fn validate(&self) -> SarResult<()> {
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return Err(SarError::Configuration(format!(
                "Speckle window size must be odd and positive, got {}",
                self.window_size
            )));
        }
        Ok(())
    }
}

/// Available speckle filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeckleFilterType {
    /// Lee filter (adaptive local statistics)
    Lee,
    /// Mean filter (boxcar averaging)
    Mean,
    /// Median filter (rank filter)
    Median,
    /// Pass the image through unchanged
    None,
}

/// Speckle filter processor.
///
/// Every filter type uses edge replication at the image border, so output
/// dimensions always equal input dimensions, even for images smaller than
/// the window. Non-finite pixels are excluded from local statistics.
pub struct SpeckleFilter {
    params: SpeckleFilterParams,
}

impl SpeckleFilter {
    /// Create a new speckle filter with default parameters
    pub fn new() -> Self {
        Self {
            params: SpeckleFilterParams::default(),
        }
    }

    /// Create a speckle filter with custom parameters
    pub fn with_params(params: SpeckleFilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SpeckleFilterParams {
        &self.params
    }

    /// Apply the configured filter type
    pub fn filter(&self, image: &Array2<f32>) -> SarResult<FilteredImage> {
        self.apply_filter(image, self.params.filter_type)
    }

    /// Apply speckle filtering to SAR image
    pub fn apply_filter(
        &self,
        image: &Array2<f32>,
        filter_type: SpeckleFilterType,
    ) -> SarResult<FilteredImage> {
        log::info!("Applying {:?} speckle filter", filter_type);
        log::debug!("Filter parameters: {:?}", self.params);

        self.params.validate()?;

        let (height, width) = image.dim();
        if height == 0 || width == 0 {
            return Ok(image.clone());
        }

        let filtered = match filter_type {
            SpeckleFilterType::Lee => self.apply_lee_filter(image),
            SpeckleFilterType::Mean => self.apply_mean_filter(image),
            SpeckleFilterType::Median => self.apply_median_filter(image),
            SpeckleFilterType::None => image.clone(),
        };

        log::info!("Speckle filtering completed successfully");
        Ok(filtered)
    }

    /// Lee filter: `mean + k·(x − mean)` with `k = var / (var + mean² + ε)`
    fn apply_lee_filter(&self, image: &Array2<f32>) -> Array2<f32> {
        log::debug!("Applying Lee filter");

        let stats = LocalStatistics::new(image, self.params.window_size);
        map_pixels(image, |(i, j), center_value| {
            match stats.mean_variance(i, j) {
                Some((mean, variance)) if center_value.is_finite() => {
                    let variance = variance.max(LEE_EPSILON);
                    let k = variance / (variance + mean * mean + LEE_EPSILON);
                    (mean + k * (center_value as f64 - mean)) as f32
                }
                _ => center_value,
            }
        })
    }

    /// Apply mean filter (simple averaging)
    fn apply_mean_filter(&self, image: &Array2<f32>) -> Array2<f32> {
        log::debug!("Applying mean filter");

        let stats = LocalStatistics::new(image, self.params.window_size);
        map_pixels(image, |(i, j), center_value| {
            stats
                .mean_variance(i, j)
                .map(|(mean, _)| mean as f32)
                .unwrap_or(center_value)
        })
    }

    /// Apply median filter
    fn apply_median_filter(&self, image: &Array2<f32>) -> Array2<f32> {
        log::debug!("Applying median filter");

        let (height, width) = image.dim();
        let window_size = self.params.window_size;
        let half_window = (window_size / 2) as isize;

        map_pixels(image, |(i, j), center_value| {
            let mut window_values = Vec::with_capacity(window_size * window_size);
            for di in -half_window..=half_window {
                let ii = clamp_index(i as isize + di, height);
                for dj in -half_window..=half_window {
                    let jj = clamp_index(j as isize + dj, width);
                    let pixel_val = image[[ii, jj]];
                    if pixel_val.is_finite() {
                        window_values.push(pixel_val);
                    }
                }
            }

            if window_values.is_empty() {
                return center_value;
            }
            let mid = window_values.len() / 2;
            let (_, median, _) = window_values.select_nth_unstable_by(mid, f32::total_cmp);
            *median
        })
    }
}

impl Default for SpeckleFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `f` for every pixel, in parallel when the feature is enabled
fn map_pixels<F>(image: &Array2<f32>, f: F) -> Array2<f32>
where
    F: Fn((usize, usize), f32) -> f32 + Sync + Send,
{
    let mut filtered = Array2::zeros(image.dim());

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut filtered)
        .and(image)
        .par_for_each(|idx, out, &value| *out = f(idx, value));

    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut filtered)
        .and(image)
        .for_each(|idx, out, &value| *out = f(idx, value));

    filtered
}

#[inline]
fn clamp_index(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize - 1) as usize
}

/// Summed-area tables over the edge-replicated image.
///
/// Tables have one extra leading row and column of zeros, so the window
/// sum for output pixel `(i, j)` spans table rows `i..i + window` and
/// columns `j..j + window`.
struct LocalStatistics {
    window_size: usize,
    sum: Array2<f64>,
    sum_sq: Array2<f64>,
    count: Array2<f64>,
}

impl LocalStatistics {
    fn new(image: &Array2<f32>, window_size: usize) -> Self {
        let (height, width) = image.dim();
        let half_window = (window_size / 2) as isize;
        let padded_h = height + window_size - 1;
        let padded_w = width + window_size - 1;

        let mut sum = Array2::<f64>::zeros((padded_h + 1, padded_w + 1));
        let mut sum_sq = Array2::<f64>::zeros((padded_h + 1, padded_w + 1));
        let mut count = Array2::<f64>::zeros((padded_h + 1, padded_w + 1));

        for pi in 0..padded_h {
            let ii = clamp_index(pi as isize - half_window, height);
            let mut row_sum = 0.0;
            let mut row_sum_sq = 0.0;
            let mut row_count = 0.0;

            for pj in 0..padded_w {
                let jj = clamp_index(pj as isize - half_window, width);
                let value = image[[ii, jj]];
                if value.is_finite() {
                    let value = value as f64;
                    row_sum += value;
                    row_sum_sq += value * value;
                    row_count += 1.0;
                }
                sum[[pi + 1, pj + 1]] = sum[[pi, pj + 1]] + row_sum;
                sum_sq[[pi + 1, pj + 1]] = sum_sq[[pi, pj + 1]] + row_sum_sq;
                count[[pi + 1, pj + 1]] = count[[pi, pj + 1]] + row_count;
            }
        }

        Self {
            window_size,
            sum,
            sum_sq,
            count,
        }
    }

    #[inline]
    fn window(table: &Array2<f64>, i: usize, j: usize, size: usize) -> f64 {
        table[[i + size, j + size]] - table[[i, j + size]] - table[[i + size, j]] + table[[i, j]]
    }

    /// Local mean and (population) variance over finite pixels, if any
    fn mean_variance(&self, i: usize, j: usize) -> Option<(f64, f64)> {
        let n = Self::window(&self.count, i, j, self.window_size);
        if n < 0.5 {
            return None;
        }
        let mean = Self::window(&self.sum, i, j, self.window_size) / n;
        let mean_sq = Self::window(&self.sum_sq, i, j, self.window_size) / n;
        Some((mean, (mean_sq - mean * mean).max(0.0)))
    }
}
