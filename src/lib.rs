//! sartile: Sentinel-1 raw data preprocessing for ship-detection training
//!
//! Turns raw I/Q products and intensity rasters into a tiled, labelled image
//! dataset: samples are decoded to magnitudes, converted to decibels,
//! despeckled, normalized to 8 bits with local contrast enhancement, cut
//! into overlapping tiles, and written with a dataset manifest for the
//! detector training tool.

pub mod config;
pub mod core;
#[cfg(feature = "fixtures")]
pub mod fixtures;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    MagnitudeImage, NormalizedImage, Polarization, ProductKind, RawProduct, SarError, SarResult,
    SarRealImage,
};

pub use crate::config::PipelineConfig;
pub use crate::core::{Pipeline, PipelineEvent, PipelineObserver, PipelineReport, Stage};
pub use crate::io::{discover_sources, DatasetAssembler, DatasetManifest, LabelSource, RawSampleDecoder};
