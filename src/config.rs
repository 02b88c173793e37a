use crate::core::calibrate::DbScale;
use crate::core::normalize::NormalizerParams;
use crate::core::speckle_filter::SpeckleFilterParams;
use crate::core::tiler::TilerParams;
use crate::io::dataset_writer::AssemblerParams;
use crate::io::discovery::DiscoveryParams;
use crate::io::manifest::TrainingHyperparameters;
use crate::io::raw_reader::DecoderParams;
use crate::types::{SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Every tunable of a preprocessing run, grouped by stage.
///
/// Missing sections or fields in a YAML file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub discovery: DiscoveryParams,
    pub decoder: DecoderParams,
    /// dB conversion for decoded I/Q magnitudes
    pub raw_db_scale: DbScale,
    /// dB conversion for measurement rasters (applied only if still linear)
    pub raster_db_scale: DbScale,
    pub speckle: SpeckleFilterParams,
    pub normalizer: NormalizerParams,
    pub tiler: TilerParams,
    pub assembler: AssemblerParams,
    pub hyperparameters: TrainingHyperparameters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryParams::default(),
            decoder: DecoderParams::default(),
            raw_db_scale: DbScale::Amplitude,
            raster_db_scale: DbScale::Intensity,
            speckle: SpeckleFilterParams::default(),
            normalizer: NormalizerParams::default(),
            tiler: TilerParams::default(),
            assembler: AssemblerParams::default(),
            hyperparameters: TrainingHyperparameters::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject any configuration that would fail partway through a run
    pub fn validate(&self) -> SarResult<()> {
        if self.decoder.max_samples < 1 {
            return Err(SarError::Configuration(
                "Decoder sample cap must be at least 1".to_string(),
            ));
        }
        self.speckle.validate()?;
        self.normalizer.validate()?;
        self.tiler.validate()?;
        self.assembler.validate()?;

        if self.hyperparameters.imgsz as usize != self.tiler.tile_size {
            log::warn!(
                "Training image size {} differs from tile size {}; tiles will be resized",
                self.hyperparameters.imgsz,
                self.tiler.tile_size
            );
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> SarResult<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            SarError::Configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&contents)?;
        log::info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> SarResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::speckle_filter::SpeckleFilterType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.speckle.window_size, 7);
        assert_eq!(config.tiler.tile_size, 640);
        assert_eq!(config.tiler.overlap, 64);
        assert_eq!(config.normalizer.tile_grid, (8, 8));
        assert_eq!(config.assembler.split_ratio, 0.8);
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"speckle:\n  window_size: 5\n  filter_type: Median\ntiler:\n  tile_size: 320\n  overlap: 32\n",
        )
        .unwrap();
        let path = temp.into_temp_path();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.speckle.window_size, 5);
        assert_eq!(config.speckle.filter_type, SpeckleFilterType::Median);
        assert_eq!(config.tiler.tile_size, 320);
        assert_eq!(config.normalizer.clip_limit, 3.0);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = PipelineConfig::default();
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(PipelineConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_fail_fast() {
        let cases = [
            "tiler:\n  tile_size: 64\n  overlap: 64\n",
            "tiler:\n  tile_size: 0\n",
            "normalizer:\n  low_percentile: 99\n  high_percentile: 1\n",
            "speckle:\n  window_size: 4\n",
            "assembler:\n  split_ratio: 1.2\n",
            "decoder:\n  max_samples: 0\n",
        ];
        for yaml in cases {
            assert!(
                matches!(PipelineConfig::from_yaml_str(yaml), Err(SarError::Configuration(_))),
                "expected configuration error for {:?}",
                yaml
            );
        }
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        assert!(matches!(
            PipelineConfig::load("/nonexistent/sartile.yaml"),
            Err(SarError::Configuration(_))
        ));
    }
}
