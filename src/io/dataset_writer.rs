use crate::core::tiler::{Tile, TilerParams};
use crate::io::labels::{write_label_file, EmptyLabels, LabelSource};
use crate::io::manifest::{DatasetManifest, TrainingHyperparameters};
use crate::types::{SarError, SarResult};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Dataset assembly parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerParams {
    /// Fraction of each source's tiles (by emission order) sent to training
    pub split_ratio: f64,
    /// Ordered detector class names; the class id is the position
    pub class_names: Vec<String>,
    /// JPEG quality for written tiles (1-100)
    pub jpeg_quality: u8,
    /// Fewer training tiles than this aborts the run
    pub min_train_tiles: usize,
    /// Manifest filename, written at the dataset root
    pub manifest_name: String,
    /// Record a creation timestamp in the manifest. Off by default so that
    /// re-runs on the same inputs produce an identical manifest.
    pub stamp_manifest: bool,
}

impl Default for AssemblerParams {
    fn default() -> Self {
        Self {
            split_ratio: 0.8,
            class_names: vec![
                "dark_vessel".to_string(),
                "vessel".to_string(),
                "background".to_string(),
            ],
            jpeg_quality: 95,
            min_train_tiles: 5,
            manifest_name: "dataset.yaml".to_string(),
            stamp_manifest: false,
        }
    }
}

impl AssemblerParams {
    pub fn validate(&self) -> SarResult<()> {
        if !(0.0..=1.0).contains(&self.split_ratio) {
            return Err(SarError::Configuration(format!(
                "Split ratio {} must lie in [0, 1]",
                self.split_ratio
            )));
        }
        if self.class_names.is_empty() {
            return Err(SarError::Configuration(
                "At least one class name is required".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(SarError::Configuration(format!(
                "JPEG quality {} must lie in 1..=100",
                self.jpeg_quality
            )));
        }
        if self.manifest_name.trim().is_empty() {
            return Err(SarError::Configuration("Manifest name is empty".to_string()));
        }
        Ok(())
    }
}

/// Training or validation subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }
}

/// Number of leading tiles assigned to training: `floor(count * ratio)`
pub fn split_index(count: usize, ratio: f64) -> usize {
    ((count as f64 * ratio).floor() as usize).min(count)
}

/// Directory layout of an assembled dataset
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_dir(&self, split: Split) -> PathBuf {
        self.root.join("images").join(split.dir_name())
    }

    pub fn label_dir(&self, split: Split) -> PathBuf {
        self.root.join("labels").join(split.dir_name())
    }

    pub fn image_path(&self, split: Split, stem: &str) -> PathBuf {
        self.image_dir(split).join(format!("{}.jpg", stem))
    }

    pub fn label_path(&self, split: Split, stem: &str) -> PathBuf {
        self.label_dir(split).join(format!("{}.txt", stem))
    }

    /// Create every split directory; existing directories are left alone
    pub fn create(&self) -> SarResult<()> {
        for split in [Split::Train, Split::Val] {
            std::fs::create_dir_all(self.image_dir(split))?;
            std::fs::create_dir_all(self.label_dir(split))?;
        }
        Ok(())
    }
}

/// Train/val counts written for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSplit {
    pub source_id: String,
    pub train: usize,
    pub val: usize,
}

impl SourceSplit {
    pub fn total(&self) -> usize {
        self.train + self.val
    }
}

/// Rough readiness of a dataset for detector training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetAdequacy {
    Excellent,
    Good,
    Limited,
}

impl DatasetAdequacy {
    pub fn assess(total_tiles: usize) -> Self {
        if total_tiles >= 2000 {
            DatasetAdequacy::Excellent
        } else if total_tiles >= 1000 {
            DatasetAdequacy::Good
        } else {
            DatasetAdequacy::Limited
        }
    }
}

/// Outcome of a completed assembly
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub manifest: DatasetManifest,
    pub manifest_path: PathBuf,
    pub train_tiles: usize,
    pub val_tiles: usize,
    pub adequacy: DatasetAdequacy,
}

/// Writes tiles, label files and the dataset manifest.
///
/// Tile files are namespaced by source id, so `write_source` may run
/// concurrently for different sources.
pub struct DatasetAssembler {
    params: AssemblerParams,
    layout: DatasetLayout,
    geometry: TilerParams,
    hyperparameters: TrainingHyperparameters,
    labels: Arc<dyn LabelSource>,
}

impl DatasetAssembler {
    pub fn new<P: AsRef<Path>>(root: P, params: AssemblerParams) -> SarResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            layout: DatasetLayout::new(root),
            geometry: TilerParams::default(),
            hyperparameters: TrainingHyperparameters::default(),
            labels: Arc::new(EmptyLabels),
        })
    }

    /// Tile geometry recorded in the manifest
    pub fn with_geometry(mut self, geometry: TilerParams) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: TrainingHyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn with_label_source(mut self, labels: Arc<dyn LabelSource>) -> Self {
        self.labels = labels;
        self
    }

    pub fn params(&self) -> &AssemblerParams {
        &self.params
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn prepare(&self) -> SarResult<()> {
        self.layout.create()
    }

    /// Stem shared by a tile's image and label file
    pub fn tile_stem(source_id: &str, tile_index: usize) -> String {
        format!("{}_{:04}", source_id, tile_index)
    }

    /// Write every tile of one source, splitting positionally
    pub fn write_source(&self, source_id: &str, tiles: &[Tile]) -> SarResult<SourceSplit> {
        let train_count = split_index(tiles.len(), self.params.split_ratio);

        for (position, tile) in tiles.iter().enumerate() {
            let split = if position < train_count {
                Split::Train
            } else {
                Split::Val
            };
            let stem = Self::tile_stem(source_id, tile.tile_index);

            self.write_tile_image(&self.layout.image_path(split, &stem), tile)?;
            let labels = self.labels.labels_for(&stem, tile)?;
            write_label_file(self.layout.label_path(split, &stem), &labels)?;
        }

        log::info!(
            "Wrote {} tiles for '{}' ({} train, {} val)",
            tiles.len(),
            source_id,
            train_count,
            tiles.len() - train_count
        );

        Ok(SourceSplit {
            source_id: source_id.to_string(),
            train: train_count,
            val: tiles.len() - train_count,
        })
    }

    fn write_tile_image(&self, path: &Path, tile: &Tile) -> SarResult<()> {
        let (height, width) = tile.data.dim();
        let pixels: Vec<u8> = tile.data.iter().copied().collect();

        let mut jpeg_bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg_bytes, self.params.jpeg_quality).encode(
            &pixels,
            width as u32,
            height as u32,
            ExtendedColorType::L8,
        )?;
        std::fs::write(path, jpeg_bytes)?;
        Ok(())
    }

    /// Check the training set is usable and write the manifest.
    ///
    /// The manifest is left untouched when there are too few training tiles.
    pub fn finish(&self, splits: &[SourceSplit]) -> SarResult<DatasetSummary> {
        let train_tiles: usize = splits.iter().map(|s| s.train).sum();
        let val_tiles: usize = splits.iter().map(|s| s.val).sum();

        if train_tiles < self.params.min_train_tiles {
            log::error!(
                "Only {} training tiles produced, {} required",
                train_tiles,
                self.params.min_train_tiles
            );
            return Err(SarError::InsufficientData {
                train_tiles,
                required: self.params.min_train_tiles,
            });
        }

        let mut manifest = DatasetManifest::new(
            self.layout.root(),
            &self.params.class_names,
            self.geometry.tile_size,
            self.geometry.overlap,
            self.hyperparameters.clone(),
        )?;
        if self.params.stamp_manifest {
            manifest = manifest.stamped();
        }
        let manifest_path = self.layout.root().join(&self.params.manifest_name);
        manifest.write(&manifest_path)?;

        let adequacy = DatasetAdequacy::assess(train_tiles + val_tiles);
        match adequacy {
            DatasetAdequacy::Limited => log::warn!(
                "Dataset adequacy {:?}: {} tiles, results may be unreliable",
                adequacy,
                train_tiles + val_tiles
            ),
            _ => log::info!(
                "Dataset adequacy {:?}: {} tiles",
                adequacy,
                train_tiles + val_tiles
            ),
        }

        Ok(DatasetSummary {
            manifest,
            manifest_path,
            train_tiles,
            val_tiles,
            adequacy,
        })
    }

    /// Write a complete dataset from the tile sequences of each source
    pub fn assemble(&self, tiles_per_source: &[(String, Vec<Tile>)]) -> SarResult<DatasetSummary> {
        self.prepare()?;
        let splits = tiles_per_source
            .iter()
            .map(|(source_id, tiles)| self.write_source(source_id, tiles))
            .collect::<SarResult<Vec<_>>>()?;
        self.finish(&splits)
    }
}
