use super::geometry::Geometry;
use crate::global_variables::*;
use crate::NodeType;
use rayon::prelude::*;

pub const WORD_BITS: usize = 32;

/// Word holding the bit of cell `index`.
#[inline]
pub fn word_index(index: usize) -> usize {
    index / WORD_BITS
}

/// Position of the bit of cell `index` inside its word.
#[inline]
pub fn bit_index(index: usize) -> u32 {
    (index % WORD_BITS) as u32
}

/// Packed one-bit-per-cell solid flags.
///
/// Built once before the run and only read afterwards; there is no mutating
/// accessor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObstacleMask {
    nx: usize,
    ny: usize,
    words: Vec<u32>,
}

impl ObstacleMask {
    pub fn empty(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            words: vec![0; (nx * ny).div_ceil(WORD_BITS)],
        }
    }

    /// Builds the mask from a per-cell predicate on lattice indices.
    pub fn from_fn<F>(nx: usize, ny: usize, is_solid: F) -> Self
    where
        F: Fn(usize, usize) -> bool + Sync,
    {
        let number_of_cells = nx * ny;
        let words = (0..number_of_cells.div_ceil(WORD_BITS))
            .into_par_iter()
            .map(|word| {
                let first = word * WORD_BITS;
                let last = (first + WORD_BITS).min(number_of_cells);
                (first..last).fold(0u32, |bits, index| {
                    let (i, j) = (index % nx, index / nx);
                    if is_solid(i, j) {
                        bits | (1 << bit_index(index))
                    } else {
                        bits
                    }
                })
            })
            .collect();
        Self { nx, ny, words }
    }

    /// Rasterizes a geometry, sampling it at cell centres.
    pub fn from_geometry<G: Geometry + ?Sized>(nx: usize, ny: usize, geometry: &G) -> Self {
        Self::from_fn(nx, ny, |i, j| {
            geometry.contains(i as Float + 0.5, j as Float + 0.5)
        })
    }

    /// Reads a map of node codes indexed as `map[j][i]`; cells equal to `code`
    /// are solid.
    pub fn from_map(map: &[Vec<i32>], code: i32) -> Self {
        let ny = map.len();
        let nx = map.first().map_or(0, Vec::len);
        Self::from_fn(nx, ny, |i, j| map[j].get(i) == Some(&code))
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[inline]
    pub fn is_solid(&self, index: usize) -> bool {
        (self.words[word_index(index)] >> bit_index(index)) & 1 == 1
    }

    #[inline]
    pub fn node_type(&self, index: usize) -> NodeType {
        if self.is_solid(index) {
            NodeType::Solid
        } else {
            NodeType::Fluid
        }
    }

    pub fn number_of_solid_nodes(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn number_of_fluid_nodes(&self) -> usize {
        self.nx * self.ny - self.number_of_solid_nodes()
    }
}
