use crate::types::{NormalizedImage, SarError, SarResult};
use ndarray::{s, ArrayView2};
use serde::{Deserialize, Serialize};

/// Tiling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerParams {
    /// Side length of every emitted tile in pixels
    pub tile_size: usize,
    /// Pixels shared by horizontally or vertically adjacent tiles
    pub overlap: usize,
}

impl Default for TilerParams {
    fn default() -> Self {
        Self {
            tile_size: 640,
            overlap: 64,
        }
    }
}

impl TilerParams {
    pub fn validate(&self) -> SarResult<()> {
        self.step().map(|_| ())
    }

    /// Distance between consecutive tile origins
    pub fn step(&self) -> SarResult<usize> {
        if self.tile_size == 0 {
            return Err(SarError::Configuration("Tile size must be positive".to_string()));
        }
        if self.overlap >= self.tile_size {
            return Err(SarError::Configuration(format!(
                "Overlap {} must be smaller than tile size {}",
                self.overlap, self.tile_size
            )));
        }
        Ok(self.tile_size - self.overlap)
    }
}

/// A full-size square window of a normalized image
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Index of the source image within the run
    pub source_index: usize,
    /// Position in the row-major emission order of its source
    pub tile_index: usize,
    /// Top-left corner as (row, column)
    pub origin: (usize, usize),
    pub data: NormalizedImage,
}

/// Slices normalized images into overlapping fixed-size tiles.
///
/// Border regions that cannot hold a full tile are dropped rather than
/// padded, so every tile has exactly `tile_size x tile_size` pixels.
#[derive(Debug, Clone)]
pub struct Tiler {
    tile_size: usize,
    step: usize,
}

impl Tiler {
    pub fn new(params: &TilerParams) -> SarResult<Self> {
        let step = params.step()?;
        Ok(Self {
            tile_size: params.tile_size,
            step,
        })
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of tile origins along an axis of the given length
    pub fn count_along(&self, len: usize) -> usize {
        if len < self.tile_size {
            0
        } else {
            (len - self.tile_size) / self.step + 1
        }
    }

    /// Tile grid as (rows, columns) for an image of the given shape
    pub fn grid_shape(&self, height: usize, width: usize) -> (usize, usize) {
        (self.count_along(height), self.count_along(width))
    }

    /// Tile origins in row-major emission order
    pub fn origins(&self, height: usize, width: usize) -> Vec<(usize, usize)> {
        let (rows, cols) = self.grid_shape(height, width);
        (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r * self.step, c * self.step)))
            .collect()
    }

    /// Lazily iterate the tiles of an image; each call starts over
    pub fn tiles<'a>(&self, image: &'a NormalizedImage, source_index: usize) -> TileIter<'a> {
        let (height, width) = image.dim();
        let (rows, cols) = self.grid_shape(height, width);
        TileIter {
            image: image.view(),
            tile_size: self.tile_size,
            step: self.step,
            cols,
            total: rows * cols,
            next: 0,
            source_index,
        }
    }

    /// Collect every tile of an image
    pub fn tile(&self, image: &NormalizedImage, source_index: usize) -> Vec<Tile> {
        let tiles: Vec<Tile> = self.tiles(image, source_index).collect();
        log::debug!(
            "Tiled {:?} image into {} tiles of {}px (step {})",
            image.dim(),
            tiles.len(),
            self.tile_size,
            self.step
        );
        tiles
    }
}

/// Iterator over the tiles of one image
pub struct TileIter<'a> {
    image: ArrayView2<'a, u8>,
    tile_size: usize,
    step: usize,
    cols: usize,
    total: usize,
    next: usize,
    source_index: usize,
}

impl<'a> Iterator for TileIter<'a> {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.next >= self.total {
            return None;
        }
        let tile_index = self.next;
        self.next += 1;

        let y = (tile_index / self.cols) * self.step;
        let x = (tile_index % self.cols) * self.step;
        let data = self
            .image
            .slice(s![y..y + self.tile_size, x..x + self.tile_size])
            .to_owned();

        Some(Tile {
            source_index: self.source_index,
            tile_index,
            origin: (y, x),
            data,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for TileIter<'a> {}
