use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complex-valued SAR sample (I + jQ)
pub type SarComplex = Complex<f32>;

/// Real-valued intensity or amplitude data
pub type SarReal = f32;

/// 2D real SAR data array (rows x columns)
pub type SarRealImage = Array2<SarReal>;

/// Non-negative magnitudes reshaped from decoded I/Q samples
pub type MagnitudeImage = SarRealImage;

/// Speckle-suppressed dB-scale image, same shape as its input
pub type FilteredImage = SarRealImage;

/// 8-bit display-range image produced by the normalizer
pub type NormalizedImage = Array2<u8>;

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    pub const ALL: [Polarization; 4] = [
        Polarization::VV,
        Polarization::VH,
        Polarization::HV,
        Polarization::HH,
    ];

    /// Lowercase filename marker used by the upstream data provider
    pub fn marker(&self) -> &'static str {
        match self {
            Polarization::VV => "vv",
            Polarization::VH => "vh",
            Polarization::HV => "hv",
            Polarization::HH => "hh",
        }
    }

    /// Parse a polarization from a marker such as "vv" or "VH"
    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|pol| pol.marker().eq_ignore_ascii_case(marker.trim()))
    }

    /// Infer the polarization from a product filename.
    ///
    /// This is a substring match on the lowercased name, so
    /// `s1a-iw-raw-s-vh-20240102.dat` yields `VH`.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|pol| lower.contains(pol.marker()))
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

/// How a product on disk encodes its samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    /// Flat interleaved 16-bit signed I/Q pairs (Sentinel-1 RAW `.dat`)
    RawIq,
    /// Single-band intensity raster (GeoTIFF measurement file)
    Raster,
}

/// A source product selected for processing. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProduct {
    pub path: PathBuf,
    pub kind: ProductKind,
    pub polarization: Option<Polarization>,
    /// Namespace for every file written on behalf of this product
    pub source_id: String,
    pub byte_len: u64,
}

impl RawProduct {
    /// Describe a product from its path, reading only its size
    pub fn from_path<P: AsRef<Path>>(path: P, kind: ProductKind, source_id: &str) -> SarResult<Self> {
        let path = path.as_ref().to_path_buf();
        let byte_len = std::fs::metadata(&path)?.len();
        let polarization = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(Polarization::from_filename);

        Ok(Self {
            path,
            kind,
            polarization,
            source_id: source_id.to_string(),
            byte_len,
        })
    }

    /// Number of complete I/Q samples (4 bytes each) in the file
    pub fn sample_count(&self) -> u64 {
        self.byte_len / 4
    }
}

/// Error types for SAR processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient data: {train_tiles} training tiles, at least {required} required")]
    InsufficientData { train_tiles: usize, required: usize },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),
}

impl SarError {
    /// Whether the error only affects the source being processed.
    ///
    /// Per-source errors are absorbed by the batch driver; everything else
    /// aborts the run.
    pub fn is_per_source(&self) -> bool {
        matches!(
            self,
            SarError::Io(_) | SarError::Decode(_) | SarError::Processing(_) | SarError::Image(_)
        )
    }
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarization_from_filename() {
        assert_eq!(
            Polarization::from_filename("s1a-iw-raw-s-vv-20240102t141608.dat"),
            Some(Polarization::VV)
        );
        assert_eq!(
            Polarization::from_filename("S1A_IW_RAW__0SDV_VH.dat"),
            Some(Polarization::VH)
        );
        assert_eq!(Polarization::from_filename("measurement.dat"), None);
    }

    #[test]
    fn test_polarization_marker_round_trip() {
        for pol in Polarization::ALL {
            assert_eq!(Polarization::from_marker(pol.marker()), Some(pol));
            assert_eq!(Polarization::from_marker(&pol.to_string()), Some(pol));
        }
        assert_eq!(Polarization::from_marker("xx"), None);
    }

    #[test]
    fn test_error_classification() {
        assert!(SarError::Decode("short file".to_string()).is_per_source());
        assert!(!SarError::Configuration("overlap".to_string()).is_per_source());
        assert!(!SarError::InsufficientData { train_tiles: 1, required: 5 }.is_per_source());
    }
}
