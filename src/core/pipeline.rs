//! Batch driver chaining every stage from source product to dataset.
//!
//! Sources are independent: each one is decoded, filtered, normalized, tiled
//! and written on its own, and a failure in one source is recorded without
//! stopping the others. Configuration problems are caught before any source
//! is touched, and a run that yields too few training tiles fails as a whole.

use crate::config::PipelineConfig;
use crate::core::calibrate::{raster_to_decibels, to_decibels};
use crate::core::events::{LogObserver, PipelineEvent, PipelineObserver, Stage};
use crate::core::normalize::{Degeneracy, NormalizeOutcome, RadiometricNormalizer};
use crate::core::speckle_filter::SpeckleFilter;
use crate::core::tiler::{Tile, Tiler};
use crate::io::dataset_writer::{DatasetAdequacy, DatasetAssembler, SourceSplit};
use crate::io::discovery::discover_sources;
use crate::io::labels::{EmptyLabels, LabelSource};
use crate::io::raster_reader::RasterReader;
use crate::io::raw_reader::RawSampleDecoder;
use crate::types::{FilteredImage, ProductKind, RawProduct, SarRealImage, SarResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Source id used for events that concern the dataset as a whole
pub const DATASET_EVENT_ID: &str = "dataset";

/// Intermediate products of one in-memory image
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub filtered: FilteredImage,
    pub normalized: NormalizeOutcome,
    pub tiles: Vec<Tile>,
}

/// What a successfully processed source contributed to the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSummary {
    pub source_id: String,
    pub path: PathBuf,
    /// Shape of the decoded grid as (rows, columns)
    pub grid: (usize, usize),
    pub tiles: usize,
    pub train: usize,
    pub val: usize,
    pub degenerate: Option<Degeneracy>,
}

/// A source skipped because of a per-source error
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source_id: String,
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of a complete run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub sources: Vec<SourceSummary>,
    pub failures: Vec<SourceFailure>,
    pub train_tiles: usize,
    pub val_tiles: usize,
    pub adequacy: DatasetAdequacy,
    pub manifest_path: PathBuf,
}

impl PipelineReport {
    pub fn total_tiles(&self) -> usize {
        self.train_tiles + self.val_tiles
    }

    /// Sources whose normalization fell back to an all-zero image
    pub fn degenerate_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| s.degenerate.is_some())
            .map(|s| s.source_id.as_str())
            .collect()
    }
}

/// Preprocessing pipeline: decode → dB → speckle filter → normalize → tile → write
pub struct Pipeline {
    config: PipelineConfig,
    decoder: RawSampleDecoder,
    filter: SpeckleFilter,
    normalizer: RadiometricNormalizer,
    tiler: Tiler,
    observer: Arc<dyn PipelineObserver>,
    labels: Arc<dyn LabelSource>,
}

impl Pipeline {
    /// Build a pipeline, rejecting invalid configuration up front
    pub fn new(config: PipelineConfig) -> SarResult<Self> {
        config.validate()?;
        Ok(Self {
            decoder: RawSampleDecoder::with_params(config.decoder.clone()),
            filter: SpeckleFilter::with_params(config.speckle.clone()),
            normalizer: RadiometricNormalizer::with_params(config.normalizer.clone()),
            tiler: Tiler::new(&config.tiler)?,
            observer: Arc::new(LogObserver),
            labels: Arc::new(EmptyLabels),
            config,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_label_source(mut self, labels: Arc<dyn LabelSource>) -> Self {
        self.labels = labels;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read a product and convert it to decibels
    pub fn load_source(&self, product: &RawProduct) -> SarResult<SarRealImage> {
        match product.kind {
            ProductKind::RawIq => {
                let magnitudes = self.decoder.decode(&product.path)?;
                Ok(to_decibels(&magnitudes, self.config.raw_db_scale))
            }
            ProductKind::Raster => {
                let intensities = RasterReader::read_intensity(&product.path)?;
                Ok(raster_to_decibels(&intensities, self.config.raster_db_scale))
            }
        }
    }

    /// Filter, normalize and tile one dB-scale image held in memory
    pub fn process_image(&self, image: &SarRealImage, source_index: usize) -> SarResult<ProcessedImage> {
        let filtered = self.filter.filter(image)?;
        let normalized = self.normalizer.normalize(&filtered)?;
        let tiles = self.tiler.tile(&normalized.image, source_index);
        Ok(ProcessedImage {
            filtered,
            normalized,
            tiles,
        })
    }

    /// Run every stage for one source and write its tiles
    pub fn process_source(
        &self,
        product: &RawProduct,
        source_index: usize,
        assembler: &DatasetAssembler,
    ) -> SarResult<SourceSummary> {
        let id = product.source_id.as_str();

        let db = self.stage(id, Stage::Decode, || self.load_source(product))?;
        let filtered = self.stage(id, Stage::Filter, || self.filter.filter(&db))?;
        drop(db);

        let normalized = self.stage(id, Stage::Normalize, || self.normalizer.normalize(&filtered))?;
        if let Some(kind) = normalized.degenerate {
            self.emit(PipelineEvent::DegenerateInput {
                source_id: id.to_string(),
                stage: Stage::Normalize,
                kind,
            });
        }

        let tiles = self.stage(id, Stage::Tile, || {
            Ok(self.tiler.tile(&normalized.image, source_index))
        })?;
        let split = self.stage(id, Stage::Assemble, || assembler.write_source(id, &tiles))?;

        Ok(SourceSummary {
            source_id: id.to_string(),
            path: product.path.clone(),
            grid: filtered.dim(),
            tiles: tiles.len(),
            train: split.train,
            val: split.val,
            degenerate: normalized.degenerate,
        })
    }

    /// Process every source into a dataset under `output_root`.
    ///
    /// Per-source failures are logged, reported as `StageFailed` events and
    /// collected in the report; any other error aborts the run.
    pub fn run<P: AsRef<Path>>(&self, sources: &[RawProduct], output_root: P) -> SarResult<PipelineReport> {
        let output_root = output_root.as_ref();
        log::info!(
            "Processing {} sources into {}",
            sources.len(),
            output_root.display()
        );

        let assembler = DatasetAssembler::new(output_root, self.config.assembler.clone())?
            .with_geometry(self.config.tiler.clone())
            .with_hyperparameters(self.config.hyperparameters.clone())
            .with_label_source(Arc::clone(&self.labels));
        assembler.prepare()?;

        let completed = AtomicUsize::new(0);
        let process = |index: usize| -> SarResult<SourceSummary> {
            let result = self.process_source(&sources[index], index, &assembler);
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            self.emit(PipelineEvent::StageProgress {
                source_id: DATASET_EVENT_ID.to_string(),
                stage: Stage::Assemble,
                done,
                total: sources.len(),
            });
            result
        };

        #[cfg(feature = "parallel")]
        let results: Vec<SarResult<SourceSummary>> = (0..sources.len()).into_par_iter().map(process).collect();

        #[cfg(not(feature = "parallel"))]
        let results: Vec<SarResult<SourceSummary>> = (0..sources.len()).map(process).collect();

        let mut summaries = Vec::new();
        let mut failures = Vec::new();
        for (product, result) in sources.iter().zip(results) {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) if e.is_per_source() => {
                    log::error!(
                        "Skipping source '{}' ({}): {}",
                        product.source_id,
                        product.path.display(),
                        e
                    );
                    failures.push(SourceFailure {
                        source_id: product.source_id.clone(),
                        path: product.path.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let splits: Vec<SourceSplit> = summaries
            .iter()
            .map(|s| SourceSplit {
                source_id: s.source_id.clone(),
                train: s.train,
                val: s.val,
            })
            .collect();
        let dataset = self.stage(DATASET_EVENT_ID, Stage::Assemble, || assembler.finish(&splits))?;

        log::info!(
            "Run complete: {} sources processed, {} failed, {} tiles ({} train, {} val)",
            summaries.len(),
            failures.len(),
            dataset.train_tiles + dataset.val_tiles,
            dataset.train_tiles,
            dataset.val_tiles
        );

        Ok(PipelineReport {
            sources: summaries,
            failures,
            train_tiles: dataset.train_tiles,
            val_tiles: dataset.val_tiles,
            adequacy: dataset.adequacy,
            manifest_path: dataset.manifest_path,
        })
    }

    /// Discover sources in `input_dir` and run them
    pub fn run_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_dir: P,
        output_root: Q,
    ) -> SarResult<PipelineReport> {
        let sources = discover_sources(input_dir, &self.config.discovery)?;
        if sources.is_empty() {
            log::warn!("No source products found");
        }
        self.run(&sources, output_root)
    }

    fn emit(&self, event: PipelineEvent) {
        self.observer.on_event(&event);
    }

    fn stage<T>(&self, source_id: &str, stage: Stage, f: impl FnOnce() -> SarResult<T>) -> SarResult<T> {
        self.emit(PipelineEvent::StageStarted {
            source_id: source_id.to_string(),
            stage,
        });
        let start = Instant::now();

        match f() {
            Ok(value) => {
                self.emit(PipelineEvent::StageCompleted {
                    source_id: source_id.to_string(),
                    stage,
                    elapsed: start.elapsed(),
                });
                Ok(value)
            }
            Err(e) => {
                self.emit(PipelineEvent::StageFailed {
                    source_id: source_id.to_string(),
                    stage,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
