use crate::types::ElevationResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;

/// Side length of the rendered surface, in world units.
pub const WORLD_SIZE: f32 = 10.0;
/// Height of the highest DEM sample after normalisation.
pub const HEIGHT_SCALE: f32 = 2.0;
pub const DEFAULT_SEGMENTS: u32 = 50;
const DEFAULT_SEED: u64 = 0x7e22a;

const PIT_RADIUS: f32 = 1.5;
const PIT_DEPTH: f32 = 0.8;
const NOISE_AMPLITUDE: f32 = 0.025;

#[derive(Debug, Error, PartialEq)]
pub enum TerrainError {
    #[error("elevation grid is empty")]
    Empty,

    #[error("elevation grid needs at least 2×2 samples, got {rows}×{cols}")]
    TooSmall { rows: usize, cols: usize },

    #[error("elevation grid row {row} has {found} samples, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("elevation grid holds no valid samples")]
    NoData,

    #[error("procedural terrain needs at least one segment")]
    NoSegments,
}

/// Indexed triangle mesh for the 3D terrain renderer.
///
/// Vertices form a row major grid centred on the origin, `z` is up.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TerrainMesh {
    pub rows: usize,
    pub cols: usize,
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// Whether the surface was synthesised rather than built from a DEM.
    pub procedural: bool,
}

impl TerrainMesh {
    /// Builds a mesh from a DEM grid. No-data samples are filled with the
    /// lowest valid elevation; heights are normalised into `0..=HEIGHT_SCALE`.
    pub fn from_grid(grid: &[Vec<Option<f64>>]) -> Result<Self, TerrainError> {
        let rows = grid.len();
        let cols = grid.first().map(Vec::len).ok_or(TerrainError::Empty)?;
        if rows < 2 || cols < 2 {
            return Err(TerrainError::TooSmall { rows, cols });
        }
        if let Some((row, found)) = grid
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|(_, len)| *len != cols)
        {
            return Err(TerrainError::Ragged {
                row,
                expected: cols,
                found,
            });
        }

        let (min, max) = grid
            .iter()
            .flatten()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .ok_or(TerrainError::NoData)?;
        let span = max - min;

        let mut vertices = Vec::with_capacity(rows * cols);
        for (r, row) in grid.iter().enumerate() {
            for (c, sample) in row.iter().enumerate() {
                let elevation = sample.filter(|v| v.is_finite()).unwrap_or(min);
                let z = if span > 0.0 {
                    ((elevation - min) / span) as f32 * HEIGHT_SCALE
                } else {
                    0.0
                };
                vertices.push([grid_coord(c, cols), grid_coord(r, rows), z]);
            }
        }

        Ok(TerrainMesh {
            rows,
            cols,
            vertices,
            indices: grid_indices(rows, cols),
            procedural: false,
        })
    }

    /// Synthesised stand-in surface: gentle waves with a pit in the centre.
    pub fn procedural(segments: u32, seed: u64) -> Result<Self, TerrainError> {
        if segments == 0 {
            return Err(TerrainError::NoSegments);
        }
        let side = segments as usize + 1;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut vertices = Vec::with_capacity(side * side);
        for r in 0..side {
            for c in 0..side {
                let x = grid_coord(c, side);
                let y = grid_coord(r, side);
                let distance = (x * x + y * y).sqrt();
                let z = (2.0 * x).sin() * 0.2 + (2.0 * y).cos() * 0.2
                    - (PIT_RADIUS - distance).max(0.0) * PIT_DEPTH
                    + rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
                vertices.push([x, y, z]);
            }
        }

        Ok(TerrainMesh {
            rows: side,
            cols: side,
            vertices,
            indices: grid_indices(side, side),
            procedural: true,
        })
    }

    /// The mesh for a volume estimation result: the DEM when one came back
    /// and is usable, the procedural surface otherwise.
    pub fn for_elevation(result: Option<&ElevationResult>) -> Self {
        if let Some(grid) = result.and_then(|r| r.dem_data.as_deref()) {
            match TerrainMesh::from_grid(grid) {
                Ok(mesh) => return mesh,
                Err(err) => tracing::warn!("unusable DEM grid, using procedural terrain: {err}"),
            }
        }
        TerrainMesh::fallback()
    }

    fn fallback() -> Self {
        let side = DEFAULT_SEGMENTS as usize + 1;
        TerrainMesh::procedural(DEFAULT_SEGMENTS, DEFAULT_SEED).unwrap_or(TerrainMesh {
            rows: side,
            cols: side,
            vertices: Vec::new(),
            indices: Vec::new(),
            procedural: true,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Lowest and highest vertex height.
    pub fn height_range(&self) -> Option<(f32, f32)> {
        self.vertices.iter().map(|v| v[2]).fold(None, |acc, z| match acc {
            None => Some((z, z)),
            Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
        })
    }
}

fn grid_coord(i: usize, n: usize) -> f32 {
    -WORLD_SIZE / 2.0 + WORLD_SIZE * i as f32 / (n - 1) as f32
}

// Two counter clockwise triangles per grid cell.
fn grid_indices(rows: usize, cols: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity((rows - 1) * (cols - 1) * 6);
    for r in 0..rows - 1 {
        for c in 0..cols - 1 {
            let top_left = (r * cols + c) as u32;
            let top_right = top_left + 1;
            let bottom_left = top_left + cols as u32;
            let bottom_right = bottom_left + 1;
            indices.extend_from_slice(&[
                top_left,
                bottom_left,
                top_right,
                top_right,
                bottom_left,
                bottom_right,
            ]);
        }
    }
    indices
}
