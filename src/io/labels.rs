use crate::core::tiler::Tile;
use crate::types::{SarError, SarResult};
use std::path::{Path, PathBuf};

/// One object annotation in normalized YOLO form.
///
/// Coordinates are fractions of the tile size, so a label file stays valid
/// regardless of how the tile is later resized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelBox {
    pub class_id: usize,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl LabelBox {
    pub fn new(class_id: usize, x_center: f32, y_center: f32, width: f32, height: f32) -> SarResult<Self> {
        let label = Self {
            class_id,
            x_center,
            y_center,
            width,
            height,
        };
        label.validate()?;
        Ok(label)
    }

    /// Check every coordinate lies in `[0, 1]`
    pub fn validate(&self) -> SarResult<()> {
        let fields = [self.x_center, self.y_center, self.width, self.height];
        if fields.iter().all(|v| (0.0..=1.0).contains(v)) {
            Ok(())
        } else {
            Err(SarError::Processing(format!(
                "Label coordinates must be normalized to [0, 1]: {:?}",
                self
            )))
        }
    }

    /// Render as a label-file line: `class x_center y_center width height`
    pub fn to_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }

    pub fn parse_line(line: &str) -> SarResult<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SarError::Processing(format!(
                "Expected 5 fields in label line, got {}: '{}'",
                fields.len(),
                line
            )));
        }

        let class_id = fields[0]
            .parse::<usize>()
            .map_err(|e| SarError::Processing(format!("Bad class id '{}': {}", fields[0], e)))?;
        let mut coords = [0.0f32; 4];
        for (slot, field) in coords.iter_mut().zip(&fields[1..]) {
            *slot = field
                .parse::<f32>()
                .map_err(|e| SarError::Processing(format!("Bad coordinate '{}': {}", field, e)))?;
        }

        Self::new(class_id, coords[0], coords[1], coords[2], coords[3])
    }
}

/// Supplies object annotations for emitted tiles
pub trait LabelSource: Send + Sync {
    /// Labels for the tile written under `stem`; an empty list means the
    /// tile has no objects
    fn labels_for(&self, stem: &str, tile: &Tile) -> SarResult<Vec<LabelBox>>;
}

/// Every tile is a negative (background-only) example
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyLabels;

impl LabelSource for EmptyLabels {
    fn labels_for(&self, _stem: &str, _tile: &Tile) -> SarResult<Vec<LabelBox>> {
        Ok(Vec::new())
    }
}

/// Reads hand-made annotations from `<dir>/<stem>.txt`.
///
/// Tiles without an annotation file are treated as background.
#[derive(Debug, Clone)]
pub struct AnnotationDirectory {
    root: PathBuf,
}

impl AnnotationDirectory {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl LabelSource for AnnotationDirectory {
    fn labels_for(&self, stem: &str, _tile: &Tile) -> SarResult<Vec<LabelBox>> {
        let path = self.root.join(format!("{}.txt", stem));
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_label_file(&path)
    }
}

pub fn read_label_file<P: AsRef<Path>>(path: P) -> SarResult<Vec<LabelBox>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(LabelBox::parse_line)
        .collect()
}

/// Write a label file, one line per box. An empty slice yields an empty file.
pub fn write_label_file<P: AsRef<Path>>(path: P, labels: &[LabelBox]) -> SarResult<()> {
    let mut content = String::new();
    for label in labels {
        content.push_str(&label.to_line());
        content.push('\n');
    }
    std::fs::write(path, content)?;
    Ok(())
}
