use ndarray::Array2;
use sartile::core::{Degeneracy, Tiler, TilerParams};
use sartile::fixtures::{write_raw_product, write_speckled_product, SyntheticLabels};
use sartile::io::{DatasetManifest, Split};
use sartile::types::{ProductKind, RawProduct};
use sartile::{Pipeline, PipelineConfig, PipelineEvent, PipelineObserver, SarError, Stage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_tile_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.tiler = TilerParams {
        tile_size: 32,
        overlap: 8,
    };
    config.hyperparameters.imgsz = 32;
    config
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<PipelineEvent>>,
}

impl PipelineObserver for EventLog {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn test_forty_kilobyte_product_yields_no_tiles() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = write_speckled_product(dir.path(), "s1a-raw-vv.dat", 100, 11).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 40_000);

    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let product = RawProduct::from_path(&path, ProductKind::RawIq, "s1_VV").unwrap();

    let db = pipeline.load_source(&product).unwrap();
    assert_eq!(db.dim(), (100, 100));

    let processed = pipeline.process_image(&db, 0).unwrap();
    assert_eq!(processed.filtered.dim(), (100, 100));
    assert_eq!(processed.normalized.image.dim(), (100, 100));
    assert!(processed.normalized.degenerate.is_none());
    assert!(processed.tiles.is_empty());
}

#[test]
fn test_constant_1280_image_yields_four_tiles() {
    let image = Array2::<u8>::from_elem((1280, 1280), 128);
    let tiler = Tiler::new(&TilerParams::default()).unwrap();

    let tiles = tiler.tile(&image, 0);
    let origins: Vec<(usize, usize)> = tiles.iter().map(|t| t.origin).collect();
    assert_eq!(origins, vec![(0, 0), (0, 576), (576, 0), (576, 576)]);
    assert!(tiles.iter().all(|t| t.data.dim() == (640, 640)));
}

#[test]
fn test_run_skips_broken_source_and_writes_dataset() {
    init_logging();
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_speckled_product(input.path(), "s1-vv-a.dat", 64, 1).unwrap();
    write_speckled_product(input.path(), "s1-vh-b.dat", 64, 2).unwrap();
    write_raw_product(input.path(), "s1-vh-broken.dat", &[]).unwrap();
    std::fs::write(input.path().join("s1-vv-a-annot.dat"), [0u8; 64]).unwrap();

    let events = Arc::new(EventLog::default());
    let pipeline = Pipeline::new(small_tile_config())
        .unwrap()
        .with_observer(events.clone())
        .with_label_source(Arc::new(SyntheticLabels::new(42)));

    let report = pipeline.run_directory(input.path(), output.path()).unwrap();

    // 64 px with tile 32 / step 24: 2 x 2 tiles per source, split 3 / 1
    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.train_tiles, 6);
    assert_eq!(report.val_tiles, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source_id, "s1_VH_1");
    assert!(report.degenerate_sources().is_empty());

    let root = output.path();
    assert_eq!(count_files(&root.join("images").join(Split::Train.dir_name())), 6);
    assert_eq!(count_files(&root.join("labels").join(Split::Val.dir_name())), 2);
    assert!(root.join("images/train/s1_VV_0000.jpg").exists());
    assert!(root.join("images/val/s1_VH_0003.jpg").exists());

    let label = std::fs::read_to_string(root.join("labels/train/s1_VV_0001.txt")).unwrap();
    assert!(label.lines().all(|line| line.starts_with("1 ")));

    let manifest = DatasetManifest::load(&report.manifest_path).unwrap();
    assert_eq!(manifest.train, "images/train");
    assert_eq!(manifest.names.len(), manifest.nc);
    assert_eq!(manifest.tile_size, 32);

    let events = events.events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::StageFailed { source_id, stage: Stage::Decode, .. } if source_id == "s1_VH_1"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::StageProgress { done: 3, total: 3, .. }
    )));
}

#[test]
fn test_rerun_is_idempotent() {
    init_logging();
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_speckled_product(input.path(), "s1-vv.dat", 64, 5).unwrap();
    write_speckled_product(input.path(), "s1-vh.dat", 64, 6).unwrap();

    let pipeline = Pipeline::new(small_tile_config()).unwrap();
    pipeline.run_directory(input.path(), output.path()).unwrap();
    let first = std::fs::read(output.path().join("images/train/s1_VV_0002.jpg")).unwrap();
    let first_manifest = std::fs::read_to_string(output.path().join("dataset.yaml")).unwrap();

    let report = pipeline.run_directory(input.path(), output.path()).unwrap();
    let second = std::fs::read(output.path().join("images/train/s1_VV_0002.jpg")).unwrap();
    let second_manifest = std::fs::read_to_string(output.path().join("dataset.yaml")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_manifest, second_manifest);
    assert_eq!(report.total_tiles(), 8);
    assert_eq!(count_files(&output.path().join("images/train")), 6);
}

#[test]
fn test_too_few_tiles_is_a_hard_stop() {
    init_logging();
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_speckled_product(input.path(), "s1-vv.dat", 64, 9).unwrap();

    let pipeline = Pipeline::new(small_tile_config()).unwrap();
    let result = pipeline.run_directory(input.path(), output.path());

    assert!(matches!(
        result,
        Err(SarError::InsufficientData { train_tiles: 3, required: 5 })
    ));
    assert!(!output.path().join("dataset.yaml").exists());
}

#[test]
fn test_all_zero_product_is_reported_degenerate() {
    init_logging();
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_raw_product(input.path(), "s1-vv-dead.dat", &vec![(0, 0); 64 * 64]).unwrap();
    write_speckled_product(input.path(), "s1-vh.dat", 64, 3).unwrap();

    let events = Arc::new(EventLog::default());
    let pipeline = Pipeline::new(small_tile_config())
        .unwrap()
        .with_observer(events.clone());
    let report = pipeline.run_directory(input.path(), output.path()).unwrap();

    assert_eq!(report.degenerate_sources(), vec!["s1_VV"]);
    assert!(report.failures.is_empty());
    let dead = report.sources.iter().find(|s| s.source_id == "s1_VV").unwrap();
    assert_eq!(dead.degenerate, Some(Degeneracy::ZeroDynamicRange));
    assert_eq!(dead.tiles, 4);

    let events = events.events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::DegenerateInput {
            source_id,
            stage: Stage::Normalize,
            kind: Degeneracy::ZeroDynamicRange,
        } if source_id == "s1_VV"
    )));
    assert!(!events.iter().any(|e| matches!(
        e,
        PipelineEvent::DegenerateInput { source_id, .. } if source_id == "s1_VH"
    )));

    for stem in ["train/s1_VV_0000", "train/s1_VV_0002", "val/s1_VV_0003"] {
        let tile = image::open(output.path().join(format!("images/{}.jpg", stem)))
            .unwrap()
            .to_luma8();
        assert_eq!(tile.dimensions(), (32, 32));
        assert!(tile.pixels().all(|p| p.0[0] == 0), "{} is not all zero", stem);
    }
}
