// SPDX-License-Identifier: AGPL-3.0-only

//! Chunk geometry for parallel link updates.
//!
//! The lattice is cut into hypercubic chunks and the chunks are 2-coloured
//! by the parity of their chunk-coordinate sum. Within one link direction,
//! chunks of the same colour may be updated concurrently as long as no link
//! update reads a same-direction link owned by another chunk of that
//! colour. [`Schedule::is_conflict_free`] checks exactly that against the
//! dependency offsets of an [`ActionTerms`].

use super::action::ActionTerms;
use super::constants::N_DIM;
use super::gauge::{Coord, shift};
use super::layout::{flatten, unflatten};
use crate::error::LatticeError;

/// Partition of the lattice into 2-coloured chunks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    shape: Coord,
    chunk_shape: Coord,
    grid: Coord,
    colors: [Vec<usize>; 2],
}

impl Schedule {
    /// Cubic chunks of edge `chunk_size`.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidParameter`] if `chunk_size` is zero or does
    /// not divide every extent.
    pub fn new(shape: Coord, chunk_size: usize) -> Result<Self, LatticeError> {
        if chunk_size == 0 || shape.iter().any(|&n| n % chunk_size != 0) {
            return Err(LatticeError::InvalidParameter(format!(
                "chunk size {chunk_size} does not divide lattice {shape:?}"
            )));
        }
        Ok(Self::with_chunk_shape(shape, [chunk_size; N_DIM]))
    }

    /// One chunk covering the whole lattice.
    #[must_use]
    pub fn single(shape: Coord) -> Self {
        Self::with_chunk_shape(shape, shape)
    }

    fn with_chunk_shape(shape: Coord, chunk_shape: Coord) -> Self {
        let mut grid = [0; N_DIM];
        for mu in 0..N_DIM {
            grid[mu] = shape[mu] / chunk_shape[mu];
        }
        let n_chunks: usize = grid.iter().product();
        let mut colors = [Vec::new(), Vec::new()];
        for chunk in 0..n_chunks {
            let c = unflatten(chunk, &grid);
            colors[c.iter().sum::<usize>() % 2].push(chunk);
        }
        Self {
            shape,
            chunk_shape,
            grid,
            colors,
        }
    }

    /// Lattice extents.
    #[must_use]
    pub const fn shape(&self) -> Coord {
        self.shape
    }

    /// Extents of one chunk.
    #[must_use]
    pub const fn chunk_shape(&self) -> Coord {
        self.chunk_shape
    }

    /// Number of chunks.
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.grid.iter().product()
    }

    /// Sites per chunk.
    #[must_use]
    pub fn chunk_volume(&self) -> usize {
        self.chunk_shape.iter().product()
    }

    /// Chunks of colour 0 or 1, in chunk-index order.
    #[must_use]
    pub fn chunks(&self, color: usize) -> &[usize] {
        &self.colors[color]
    }

    /// Chunk containing `site`.
    #[must_use]
    pub fn chunk_of(&self, site: &Coord) -> usize {
        let mut c = [0; N_DIM];
        for mu in 0..N_DIM {
            c[mu] = site[mu] / self.chunk_shape[mu];
        }
        flatten(&c, &self.grid)
    }

    /// Colour of a chunk.
    #[must_use]
    pub fn color(&self, chunk: usize) -> usize {
        unflatten(chunk, &self.grid).iter().sum::<usize>() % 2
    }

    /// Position of `site` inside its chunk, lexicographic.
    #[must_use]
    pub fn local_index(&self, site: &Coord) -> usize {
        let mut r = [0; N_DIM];
        for mu in 0..N_DIM {
            r[mu] = site[mu] % self.chunk_shape[mu];
        }
        flatten(&r, &self.chunk_shape)
    }

    /// Sites of a chunk in update order.
    pub fn chunk_sites(&self, chunk: usize) -> impl Iterator<Item = Coord> + '_ {
        let origin = unflatten(chunk, &self.grid);
        (0..self.chunk_volume()).map(move |local| {
            let r = unflatten(local, &self.chunk_shape);
            let mut site = [0; N_DIM];
            for mu in 0..N_DIM {
                site[mu] = origin[mu] * self.chunk_shape[mu] + r[mu];
            }
            site
        })
    }

    /// Whether concurrent updates of same-coloured chunks are independent
    /// for every link direction of `terms`.
    #[must_use]
    pub fn is_conflict_free(&self, terms: &ActionTerms) -> bool {
        let volume: usize = self.shape.iter().product();
        for mu in 0..N_DIM {
            for index in 0..volume {
                let site = unflatten(index, &self.shape);
                let home = self.chunk_of(&site);
                for offset in terms.dependencies(mu) {
                    let mut other = site;
                    for (nu, &d) in offset.iter().enumerate() {
                        if d != 0 {
                            other = shift(&self.shape, &other, nu, d);
                        }
                    }
                    let chunk = self.chunk_of(&other);
                    if chunk != home && self.color(chunk) == self.color(home) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::action::{Couplings, GaugeAction};

    fn terms(action: GaugeAction) -> ActionTerms {
        ActionTerms::new(action, 5.5, &Couplings::default())
    }

    #[test]
    fn rejects_non_dividing_chunks() {
        assert!(Schedule::new([4, 4, 4, 4], 3).is_err());
        assert!(Schedule::new([4, 4, 4, 4], 0).is_err());
        assert!(Schedule::new([8, 4, 4, 4], 2).is_ok());
    }

    #[test]
    fn chunks_cover_lattice_once() {
        let s = Schedule::new([4, 4, 4, 4], 2).unwrap();
        assert_eq!(s.num_chunks(), 16);
        assert_eq!(s.chunks(0).len() + s.chunks(1).len(), 16);
        let mut seen = vec![false; 256];
        for chunk in 0..s.num_chunks() {
            for site in s.chunk_sites(chunk) {
                assert_eq!(s.chunk_of(&site), chunk);
                let idx = flatten(&site, &[4, 4, 4, 4]);
                assert!(!seen[idx]);
                seen[idx] = true;
            }
        }
        assert!(seen.iter().all(|&v| v));
    }

    #[test]
    fn plaquette_action_is_conflict_free_for_even_grids() {
        let t = terms(GaugeAction::WilsonPlaquette);
        for size in [1, 2, 4] {
            let s = Schedule::new([8, 4, 4, 4], size).unwrap();
            assert!(s.is_conflict_free(&t), "chunk size {size}");
        }
    }

    #[test]
    fn odd_chunk_grid_conflicts() {
        let t = terms(GaugeAction::WilsonPlaquette);
        let s = Schedule::new([6, 6, 6, 6], 2).unwrap();
        assert!(!s.is_conflict_free(&t));
    }

    #[test]
    fn rectangle_action_conflicts_with_small_chunks() {
        let t = terms(GaugeAction::RectangleImproved);
        let s = Schedule::new([4, 4, 4, 4], 1).unwrap();
        assert!(!s.is_conflict_free(&t));
        assert!(Schedule::single([4, 4, 4, 4]).is_conflict_free(&t));
    }
}
