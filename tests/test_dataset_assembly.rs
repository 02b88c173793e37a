use ndarray::Array2;
use sartile::core::Tile;
use sartile::io::{AnnotationDirectory, AssemblerParams, DatasetAssembler, Split};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn tiles(count: usize) -> Vec<Tile> {
    (0..count)
        .map(|k| Tile {
            source_index: 0,
            tile_index: k,
            origin: (0, 0),
            data: Array2::from_shape_fn((24, 24), |(i, j)| ((i + j + k) * 5) as u8),
        })
        .collect()
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_ten_tiles_split_eight_two_every_run() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let dir = TempDir::new().unwrap();
        let assembler = DatasetAssembler::new(dir.path(), AssemblerParams::default()).unwrap();
        let summary = assembler
            .assemble(&[("sar_0".to_string(), tiles(10))])
            .unwrap();
        assert_eq!((summary.train_tiles, summary.val_tiles), (8, 2));

        let layout = assembler.layout();
        runs.push((
            listing(&layout.image_dir(Split::Train)),
            listing(&layout.image_dir(Split::Val)),
        ));
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].0.first().map(String::as_str), Some("sar_0_0000.jpg"));
    assert_eq!(runs[0].1, vec!["sar_0_0008.jpg", "sar_0_0009.jpg"]);
}

#[test]
fn test_labels_copied_from_annotation_directory() {
    let annotations = TempDir::new().unwrap();
    std::fs::write(
        annotations.path().join("s1_VV_0001.txt"),
        "0 0.500000 0.500000 0.200000 0.100000\n",
    )
    .unwrap();

    let output = TempDir::new().unwrap();
    let assembler = DatasetAssembler::new(output.path(), AssemblerParams::default())
        .unwrap()
        .with_label_source(Arc::new(AnnotationDirectory::new(annotations.path())));
    assembler
        .assemble(&[("s1_VV".to_string(), tiles(8))])
        .unwrap();

    let layout = assembler.layout();
    let labelled = std::fs::read_to_string(layout.label_path(Split::Train, "s1_VV_0001")).unwrap();
    assert_eq!(labelled, "0 0.500000 0.500000 0.200000 0.100000\n");
    let background = std::fs::read_to_string(layout.label_path(Split::Train, "s1_VV_0000")).unwrap();
    assert!(background.is_empty());
}

#[test]
fn test_manifest_written_at_dataset_root() {
    let output = TempDir::new().unwrap();
    let params = AssemblerParams {
        manifest_name: "ships.yaml".to_string(),
        class_names: vec!["vessel".to_string()],
        ..Default::default()
    };
    let assembler = DatasetAssembler::new(output.path(), params).unwrap();
    let summary = assembler
        .assemble(&[("a".to_string(), tiles(4)), ("b".to_string(), tiles(4))])
        .unwrap();

    assert_eq!(summary.manifest_path, output.path().join("ships.yaml"));
    let yaml = std::fs::read_to_string(&summary.manifest_path).unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(value["nc"].as_u64(), Some(1));
    assert_eq!(value["epochs"].as_u64(), Some(100));
    assert_eq!(value["path"].as_str(), output.path().to_str());
}
