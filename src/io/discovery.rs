use crate::types::{Polarization, ProductKind, RawProduct, SarResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Filename conventions used to pick source products out of an extracted
/// product directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryParams {
    /// Extensions of raw I/Q products (without the dot, case-insensitive)
    pub raw_extensions: Vec<String>,
    /// Extensions of intensity rasters
    pub raster_extensions: Vec<String>,
    /// A raw product must contain one of these polarization markers
    pub polarization_markers: Vec<String>,
    /// Files containing any of these markers are skipped (annotation data)
    pub exclude_markers: Vec<String>,
    /// Descend into subdirectories
    pub recursive: bool,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            raw_extensions: vec!["dat".to_string()],
            raster_extensions: vec!["tif".to_string(), "tiff".to_string()],
            polarization_markers: vec!["vv".to_string(), "vh".to_string()],
            exclude_markers: vec!["annot".to_string()],
            recursive: false,
        }
    }
}

impl DiscoveryParams {
    /// Decide whether a file is a source product, and of which kind
    pub fn classify(&self, path: &Path) -> Option<ProductKind> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();

        if self
            .exclude_markers
            .iter()
            .any(|marker| name.contains(&marker.to_ascii_lowercase()))
        {
            return None;
        }

        let has_extension =
            |list: &[String]| list.iter().any(|ext| ext.eq_ignore_ascii_case(&extension));

        if has_extension(&self.raw_extensions) {
            let polarized = self
                .polarization_markers
                .iter()
                .any(|marker| name.contains(&marker.to_ascii_lowercase()));
            return polarized.then_some(ProductKind::RawIq);
        }
        if has_extension(&self.raster_extensions) {
            return Some(ProductKind::Raster);
        }
        None
    }
}

/// Scan a directory for source products.
///
/// Results are sorted by path so that source ids, and therefore output
/// filenames, are stable across runs.
pub fn discover_sources<P: AsRef<Path>>(dir: P, params: &DiscoveryParams) -> SarResult<Vec<RawProduct>> {
    let dir = dir.as_ref();
    log::info!("Scanning {} for source products", dir.display());

    let mut candidates = Vec::new();
    collect_files(dir, params.recursive, &mut candidates)?;
    candidates.sort();

    let mut allocator = SourceIdAllocator::default();
    let mut products = Vec::new();
    for path in candidates {
        let kind = match params.classify(&path) {
            Some(kind) => kind,
            None => continue,
        };
        let mut product = RawProduct::from_path(&path, kind, "")?;
        product.source_id = allocator.allocate(kind, product.polarization, products.len());

        log::info!(
            "Found {:?} product {} ({:.1} MB) as '{}'",
            kind,
            path.display(),
            product.byte_len as f64 / (1024.0 * 1024.0),
            product.source_id
        );
        products.push(product);
    }

    log::info!("Discovered {} source products", products.len());
    Ok(products)
}

fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> SarResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Hands out collision-free source ids: `s1_<POL>` for polarized raw
/// products, `sar_<n>` otherwise, with an `_<n>` suffix on repeats
#[derive(Debug, Default)]
pub struct SourceIdAllocator {
    used: HashSet<String>,
}

impl SourceIdAllocator {
    pub fn allocate(&mut self, kind: ProductKind, polarization: Option<Polarization>, index: usize) -> String {
        let base = match (kind, polarization) {
            (ProductKind::RawIq, Some(pol)) => format!("s1_{}", pol),
            _ => format!("sar_{}", index),
        };

        let mut id = base.clone();
        let mut suffix = index;
        while self.used.contains(&id) {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.used.insert(id.clone());
        id
    }
}
