use crate::types::SarRealImage;
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Floor applied before taking the logarithm, so zero magnitudes stay finite
pub const DB_FLOOR: f32 = 1e-10;

/// Decibel conversion applied to a source before speckle filtering.
///
/// The exponent depends on what the upstream product stores, not on the
/// filter: decoded I/Q magnitudes are amplitudes, measurement rasters are
/// intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbScale {
    /// 20·log10(max(v, ε)), for amplitude-domain sources
    Amplitude,
    /// 10·log10(max(v, ε)), for intensity/power sources
    Intensity,
    /// No conversion
    Linear,
}

impl DbScale {
    /// Multiplier in front of log10, or `None` for linear data
    pub fn factor(&self) -> Option<f32> {
        match self {
            DbScale::Amplitude => Some(20.0),
            DbScale::Intensity => Some(10.0),
            DbScale::Linear => None,
        }
    }
}

/// Convert a magnitude image to decibels.
///
/// NaN samples stay NaN so they can be excluded downstream; everything else,
/// including zero and negative values, is floored at [`DB_FLOOR`] first.
pub fn to_decibels(image: &SarRealImage, scale: DbScale) -> SarRealImage {
    let factor = match scale.factor() {
        Some(factor) => factor,
        None => return image.clone(),
    };

    log::debug!("Converting {:?} image to dB ({}·log10)", image.dim(), factor);

    let convert = move |v: &f32| -> f32 {
        if v.is_nan() {
            f32::NAN
        } else {
            factor * v.max(DB_FLOOR).log10()
        }
    };

    #[cfg(feature = "parallel")]
    let db = Zip::from(image).par_map_collect(convert);

    #[cfg(not(feature = "parallel"))]
    let db = Zip::from(image).map_collect(convert);

    db
}

/// Convert a measurement raster to decibels only if it is still linear.
///
/// Rasters whose largest finite value is at most 1 are treated as already
/// scaled and passed through unchanged.
pub fn raster_to_decibels(image: &SarRealImage, scale: DbScale) -> SarRealImage {
    let max_value = image
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);

    if max_value > 1.0 {
        to_decibels(image, scale)
    } else {
        log::debug!("Raster maximum {} <= 1, skipping dB conversion", max_value);
        image.clone()
    }
}
