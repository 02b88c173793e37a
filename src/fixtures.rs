//! Synthetic products and placeholder labels for tests and demos.
//!
//! Nothing here is used by the production pipeline. `SyntheticLabels` in
//! particular produces random boxes that carry no information about the
//! imagery; it only exists to exercise the label path end to end. The
//! module is compiled only with the `fixtures` feature.

use crate::core::tiler::Tile;
use crate::io::labels::{LabelBox, LabelSource};
use crate::types::SarResult;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};

/// Encode I/Q pairs as a raw product byte stream (little-endian i16 pairs)
pub fn iq_bytes(samples: &[(i16, i16)]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for &(i, q) in samples {
        bytes.extend_from_slice(&i.to_le_bytes());
        bytes.extend_from_slice(&q.to_le_bytes());
    }
    bytes
}

/// Write a raw product made of the given samples
pub fn write_raw_product<P: AsRef<Path>>(dir: P, name: &str, samples: &[(i16, i16)]) -> SarResult<PathBuf> {
    let path = dir.as_ref().join(name);
    std::fs::write(&path, iq_bytes(samples))?;
    Ok(path)
}

/// Write a `side x side` raw product of speckled sea clutter with a few
/// bright point targets, deterministic for a given seed
pub fn write_speckled_product<P: AsRef<Path>>(dir: P, name: &str, side: usize, seed: u64) -> SarResult<PathBuf> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(side * side);

    for _ in 0..side * side {
        // Sum of uniforms approximates a zero-mean Gaussian per channel
        let i: f32 = (0..4).map(|_| rng.gen_range(-1.0f32..1.0)).sum();
        let q: f32 = (0..4).map(|_| rng.gen_range(-1.0f32..1.0)).sum();
        samples.push(((i * 200.0) as i16, (q * 200.0) as i16));
    }

    let targets = if side == 0 { 0 } else { (side / 32).max(1) };
    for _ in 0..targets {
        let row = rng.gen_range(0..side);
        let col = rng.gen_range(0..side);
        for dr in 0..3usize.min(side - row) {
            for dc in 0..3usize.min(side - col) {
                samples[(row + dr) * side + col + dc] = (12_000, -12_000);
            }
        }
    }

    write_raw_product(dir, name, &samples)
}

/// Uniform-random placeholder boxes, reproducible per tile stem
#[derive(Debug, Clone, Copy)]
pub struct SyntheticLabels {
    pub seed: u64,
    pub class_id: usize,
}

impl SyntheticLabels {
    pub fn new(seed: u64) -> Self {
        Self { seed, class_id: 1 }
    }
}

impl LabelSource for SyntheticLabels {
    fn labels_for(&self, stem: &str, _tile: &Tile) -> SarResult<Vec<LabelBox>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ fnv1a(stem));
        let count = rng.gen_range(1..=3);
        (0..count)
            .map(|_| {
                LabelBox::new(
                    self.class_id,
                    rng.gen_range(0.2..0.8),
                    rng.gen_range(0.2..0.8),
                    rng.gen_range(0.05..0.15),
                    rng.gen_range(0.05..0.15),
                )
            })
            .collect()
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}
