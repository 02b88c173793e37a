//! I/O modules: source discovery, product readers, and dataset output

pub mod dataset_writer;
pub mod discovery;
pub mod labels;
pub mod manifest;
pub mod raster_reader;
pub mod raw_reader;

pub use dataset_writer::{
    split_index, AssemblerParams, DatasetAdequacy, DatasetAssembler, DatasetLayout, DatasetSummary,
    SourceSplit, Split,
};
pub use discovery::{discover_sources, DiscoveryParams};
pub use labels::{AnnotationDirectory, EmptyLabels, LabelBox, LabelSource};
pub use manifest::{DatasetManifest, TrainingHyperparameters};
pub use raster_reader::RasterReader;
pub use raw_reader::{DecoderParams, RawSampleDecoder};
