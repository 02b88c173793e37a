use crate::types::{SarError, SarResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Detector training settings carried into the dataset manifest.
///
/// The pipeline never interprets these; they are passed through so the
/// manifest is directly usable by the training tool. Keys not modelled
/// here survive a load/write cycle through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingHyperparameters {
    pub epochs: u32,
    pub imgsz: u32,
    pub batch: u32,
    pub lr0: f64,
    pub momentum: f64,
    pub weight_decay: f64,

    // Augmentation suited to single-channel SAR: no hue/saturation jitter
    pub hsv_h: f64,
    pub hsv_s: f64,
    pub hsv_v: f64,
    pub degrees: f64,
    pub translate: f64,
    pub scale: f64,
    pub flipud: f64,
    pub fliplr: f64,
    pub mosaic: f64,
    pub mixup: f64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for TrainingHyperparameters {
    fn default() -> Self {
        Self {
            epochs: 100,
            imgsz: 640,
            batch: 8,
            lr0: 0.001,
            momentum: 0.937,
            weight_decay: 0.0005,
            hsv_h: 0.0,
            hsv_s: 0.0,
            hsv_v: 0.4,
            degrees: 15.0,
            translate: 0.1,
            scale: 0.5,
            flipud: 0.5,
            fliplr: 0.5,
            mosaic: 1.0,
            mixup: 0.0,
            extra: BTreeMap::new(),
        }
    }
}

/// The dataset descriptor written next to the image/label trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Absolute dataset root
    pub path: PathBuf,
    /// Training image directory, relative to `path`
    pub train: String,
    /// Validation image directory, relative to `path`
    pub val: String,
    pub nc: usize,
    pub names: Vec<String>,
    pub tile_size: usize,
    pub overlap: usize,
    /// Creation time; only written when stamping is requested, so that
    /// re-running on the same inputs leaves the file byte-identical
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub hyperparameters: TrainingHyperparameters,
}

impl DatasetManifest {
    pub fn new(
        root: &Path,
        class_names: &[String],
        tile_size: usize,
        overlap: usize,
        hyperparameters: TrainingHyperparameters,
    ) -> SarResult<Self> {
        if class_names.is_empty() {
            return Err(SarError::Configuration(
                "Dataset manifest needs at least one class name".to_string(),
            ));
        }
        let path = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };

        Ok(Self {
            path,
            train: "images/train".to_string(),
            val: "images/val".to_string(),
            nc: class_names.len(),
            names: class_names.to_vec(),
            tile_size,
            overlap,
            created: None,
            hyperparameters,
        })
    }

    /// Record the current time as the creation time
    pub fn stamped(mut self) -> Self {
        self.created = Some(Utc::now());
        self
    }

    pub fn to_yaml_string(&self) -> SarResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the manifest atomically: readers see either the previous file
    /// or the complete new one
    pub fn write<P: AsRef<Path>>(&self, path: P) -> SarResult<()> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let yaml = self.to_yaml_string()?;
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(yaml.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(path).map_err(|e| SarError::Io(e.error))?;

        log::info!("Wrote dataset manifest {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: DatasetManifest = serde_yaml::from_str(&content)?;
        if manifest.nc != manifest.names.len() {
            return Err(SarError::Configuration(format!(
                "Manifest declares {} classes but names {}",
                manifest.nc,
                manifest.names.len()
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names() -> Vec<String> {
        vec!["dark_vessel".to_string(), "vessel".to_string(), "background".to_string()]
    }

    #[test]
    fn test_manifest_keys() {
        let dir = TempDir::new().unwrap();
        let manifest =
            DatasetManifest::new(dir.path(), &names(), 640, 64, TrainingHyperparameters::default())
                .unwrap();
        let yaml = manifest.to_yaml_string().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["train"].as_str(), Some("images/train"));
        assert_eq!(value["val"].as_str(), Some("images/val"));
        assert_eq!(value["nc"].as_u64(), Some(3));
        assert_eq!(value["names"][0].as_str(), Some("dark_vessel"));
        assert_eq!(value["imgsz"].as_u64(), Some(640));
        assert_eq!(value["momentum"].as_f64(), Some(0.937));
        assert_eq!(value["hsv_v"].as_f64(), Some(0.4));
        assert_eq!(value["overlap"].as_u64(), Some(64));
        assert!(value.get("created").is_none());

        let stamped = manifest.stamped().to_yaml_string().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&stamped).unwrap();
        assert!(value["created"].as_str().is_some());
    }

    #[test]
    fn test_unstamped_manifest_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let build = || {
            DatasetManifest::new(dir.path(), &names(), 640, 64, TrainingHyperparameters::default())
                .unwrap()
                .to_yaml_string()
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_write_then_load_keeps_extra_keys() {
        let dir = TempDir::new().unwrap();
        let mut hyperparameters = TrainingHyperparameters::default();
        hyperparameters
            .extra
            .insert("patience".to_string(), serde_yaml::Value::from(20));

        let manifest = DatasetManifest::new(dir.path(), &names(), 320, 32, hyperparameters).unwrap();
        let path = dir.path().join("dataset.yaml");
        manifest.write(&path).unwrap();

        let loaded = DatasetManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.hyperparameters.extra.get("patience"),
            Some(&serde_yaml::Value::from(20))
        );
    }

    #[test]
    fn test_class_count_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.yaml");
        std::fs::write(
            &path,
            "path: /data\ntrain: images/train\nval: images/val\nnc: 2\nnames: [vessel]\n\
             tile_size: 640\noverlap: 64\ncreated: 2024-01-02T14:16:08Z\n",
        )
        .unwrap();

        assert!(matches!(
            DatasetManifest::load(&path),
            Err(SarError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_class_names_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(DatasetManifest::new(dir.path(), &[], 640, 64, TrainingHyperparameters::default()).is_err());
    }
}
