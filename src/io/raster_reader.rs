use crate::types::{SarError, SarRealImage, SarResult};
use image::{DynamicImage, ImageBuffer, Pixel};
use ndarray::Array2;
use std::path::Path;

/// Reader for single-band measurement rasters (GeoTIFF intensity products)
pub struct RasterReader;

impl RasterReader {
    /// Read the first band of a raster as linear intensity values.
    ///
    /// Stored values are kept as-is for every 8-bit, 16-bit and float layout
    /// the decoder knows; multi-channel rasters contribute their first
    /// channel. Layouts the decoder adds later fall back to luminance in
    /// `[0, 1]`, which is then treated as already scaled.
    pub fn read_intensity<P: AsRef<Path>>(path: P) -> SarResult<SarRealImage> {
        let path = path.as_ref();
        log::debug!("Reading raster {}", path.display());

        let image = image::open(path).map_err(|e| {
            SarError::Decode(format!("Failed to read raster {}: {}", path.display(), e))
        })?;
        let width = image.width() as usize;
        let height = image.height() as usize;

        let values: Vec<f32> = match image {
            DynamicImage::ImageLuma8(buffer) => first_band(&buffer),
            DynamicImage::ImageLumaA8(buffer) => first_band(&buffer),
            DynamicImage::ImageRgb8(buffer) => first_band(&buffer),
            DynamicImage::ImageRgba8(buffer) => first_band(&buffer),
            DynamicImage::ImageLuma16(buffer) => first_band(&buffer),
            DynamicImage::ImageLumaA16(buffer) => first_band(&buffer),
            DynamicImage::ImageRgb16(buffer) => first_band(&buffer),
            DynamicImage::ImageRgba16(buffer) => first_band(&buffer),
            DynamicImage::ImageRgb32F(buffer) => first_band(&buffer),
            DynamicImage::ImageRgba32F(buffer) => first_band(&buffer),
            other => {
                log::warn!(
                    "Raster {} has {:?} pixels, using luminance",
                    path.display(),
                    other.color()
                );
                other.to_luma32f().into_raw()
            }
        };

        let raster = Array2::from_shape_vec((height, width), values).map_err(|e| {
            SarError::Decode(format!("Raster {} has inconsistent shape: {}", path.display(), e))
        })?;

        log::info!(
            "Loaded raster {} ({} x {})",
            path.display(),
            height,
            width
        );
        Ok(raster)
    }
}

/// Raw values of the first channel, row-major
fn first_band<P>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>) -> Vec<f32>
where
    P: Pixel,
    P::Subpixel: Into<f32>,
{
    buffer.pixels().map(|pixel| pixel.channels()[0].into()).collect()
}
