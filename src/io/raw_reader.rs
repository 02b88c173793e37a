use crate::types::{MagnitudeImage, SarComplex, SarError, SarResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes per complex sample: 16-bit signed I followed by 16-bit signed Q
pub const BYTES_PER_SAMPLE: usize = 4;

/// Default sample cap, bounding peak memory on very large products
pub const DEFAULT_MAX_SAMPLES: usize = 10_000_000;

/// Raw I/Q decoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderParams {
    /// Upper bound on complex samples read from one product
    pub max_samples: usize,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// Decoder for flat interleaved I/Q products (Sentinel-1 RAW `.dat` files).
///
/// The true raster geometry is not recoverable from the byte stream alone,
/// so decoded magnitudes are laid out on a square grid of side
/// `floor(sqrt(samples))`, discarding the remainder.
pub struct RawSampleDecoder {
    params: DecoderParams,
}

impl RawSampleDecoder {
    /// Create a decoder with the default sample cap
    pub fn new() -> Self {
        Self {
            params: DecoderParams::default(),
        }
    }

    /// Create a decoder with custom parameters
    pub fn with_params(params: DecoderParams) -> Self {
        Self { params }
    }

    /// Number of samples `decode` will consume from a product of `byte_len` bytes
    pub fn samples_to_read(&self, byte_len: u64) -> usize {
        let available = (byte_len / BYTES_PER_SAMPLE as u64).min(usize::MAX as u64) as usize;
        available.min(self.params.max_samples)
    }

    /// Read the complex samples of a product, honouring the sample cap.
    ///
    /// A trailing incomplete sample is dropped.
    pub fn read_complex_samples<P: AsRef<Path>>(&self, path: P) -> SarResult<Vec<SarComplex>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            SarError::Decode(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let byte_len = file
            .metadata()
            .map_err(|e| SarError::Decode(format!("Failed to stat {}: {}", path.display(), e)))?
            .len();

        let to_read = self.samples_to_read(byte_len);
        if to_read < 1 {
            return Err(SarError::Decode(format!(
                "{} holds {} bytes, fewer than one complex sample",
                path.display(),
                byte_len
            )));
        }

        log::debug!(
            "Reading {} of {} complex samples from {}",
            to_read,
            byte_len / BYTES_PER_SAMPLE as u64,
            path.display()
        );

        let mut raw = vec![0u8; to_read * BYTES_PER_SAMPLE];
        file.read_exact(&mut raw).map_err(|e| {
            SarError::Decode(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(Self::samples_from_bytes(&raw))
    }

    /// Interpret little-endian bytes as consecutive (I, Q) int16 pairs
    pub fn samples_from_bytes(raw: &[u8]) -> Vec<SarComplex> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            raw.par_chunks_exact(BYTES_PER_SAMPLE).map(iq_from_chunk).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            raw.chunks_exact(BYTES_PER_SAMPLE).map(iq_from_chunk).collect()
        }
    }

    /// Decode a product into a square magnitude grid
    pub fn decode<P: AsRef<Path>>(&self, path: P) -> SarResult<MagnitudeImage> {
        let path = path.as_ref();
        log::info!("Decoding raw I/Q product {}", path.display());
        let start_time = std::time::Instant::now();

        let samples = self.read_complex_samples(path)?;
        let side = grid_side(samples.len());
        let used = (side * side).min(samples.len());

        let magnitudes: Vec<f32> = samples[..used].iter().map(|s| s.norm()).collect();
        let image = Self::magnitude_grid(magnitudes, side)?;

        log::info!(
            "Decoded {} samples into {}x{} grid ({} discarded) in {:?}",
            samples.len(),
            side,
            side,
            samples.len() - used,
            start_time.elapsed()
        );
        Ok(image)
    }

    /// Lay magnitudes out row-major on a `side x side` grid.
    ///
    /// Extra magnitudes are truncated, missing ones are zero-padded.
    pub fn magnitude_grid(mut magnitudes: Vec<f32>, side: usize) -> SarResult<MagnitudeImage> {
        magnitudes.resize(side * side, 0.0);
        Array2::from_shape_vec((side, side), magnitudes)
            .map_err(|e| SarError::Processing(format!("Failed to reshape magnitudes: {}", e)))
    }
}

impl Default for RawSampleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn iq_from_chunk(chunk: &[u8]) -> SarComplex {
    let i = i16::from_le_bytes([chunk[0], chunk[1]]);
    let q = i16::from_le_bytes([chunk[2], chunk[3]]);
    SarComplex::new(i as f32, q as f32)
}

/// Integer square root: the largest `s` with `s * s <= n`
pub fn grid_side(n: usize) -> usize {
    let mut side = (n as f64).sqrt() as usize;
    while side > 0 && side.saturating_mul(side) > n {
        side -= 1;
    }
    while (side + 1).saturating_mul(side + 1) <= n {
        side += 1;
    }
    side
}
