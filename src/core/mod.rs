//! Core SAR processing modules

pub mod calibrate;
pub mod events;
pub mod normalize;
pub mod pipeline;
pub mod speckle_filter;
pub mod tiler;

// Re-export main types
pub use calibrate::{raster_to_decibels, to_decibels, DbScale};
pub use events::{LogObserver, NullObserver, PipelineEvent, PipelineObserver, Stage};
pub use normalize::{Degeneracy, NormalizeOutcome, NormalizerParams, RadiometricNormalizer};
pub use pipeline::{Pipeline, PipelineReport, ProcessedImage, SourceFailure, SourceSummary};
pub use speckle_filter::{SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
pub use tiler::{Tile, Tiler, TilerParams};
