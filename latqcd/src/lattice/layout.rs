// SPDX-License-Identifier: AGPL-3.0-only

//! Even/odd cache-blocked lattice storage.
//!
//! Every field on the lattice (links, spinors, scalars) lives in a
//! [`BlockedLattice`], a D-dimensional periodic container whose storage
//! order is:
//!
//! ```text
//! [ even sites of block 0 | even sites of block 1 | ... | odd sites of block 0 | ... ]
//! ```
//!
//! Blocks tile the lattice with extent `block_shape`, enumerated
//! lexicographically; within a block, sites of one parity are enumerated
//! lexicographically. Parity is the coordinate sum mod 2.
//!
//! Viewed as `(block, offset)` pairs with `block = storage / block_volume`,
//! each storage block holds the same-parity halves of two neighbouring
//! lattice blocks. When the block count and the innermost block extent are
//! even this is the classic two-level halving map
//!
//! ```text
//! block  = lex(coord / b) / 2 + [parity odd] · n_blocks / 2
//! offset = lex(coord % b) / 2 + [lex(coord / b) odd] · block_volume / 2
//! ```
//!
//! The enumeration form used here stays a bijection for odd block counts
//! and odd block volumes as well.
//!
//! Site coordinates are ordered `(t, x, y, z)` for D = 4; the lexicographic
//! site index runs fastest over the last coordinate.

use std::ops::{Add, Div, Mul, Sub};
use std::sync::Arc;

use num_complex::Complex64;

use crate::error::LatticeError;

/// Checkerboard parity of a site: coordinate sum mod 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Parity {
    /// Even coordinate sum.
    Even,
    /// Odd coordinate sum.
    Odd,
}

impl Parity {
    /// Parity of a coordinate sum.
    #[must_use]
    pub const fn of_sum(sum: usize) -> Self {
        if sum % 2 == 0 {
            Self::Even
        } else {
            Self::Odd
        }
    }

    /// The other parity.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }

    /// 0 for even, 1 for odd.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Even => 0,
            Self::Odd => 1,
        }
    }
}

/// Lexicographic flattening with the last coordinate fastest.
#[must_use]
pub fn flatten<const D: usize>(coords: &[usize; D], extents: &[usize; D]) -> usize {
    coords
        .iter()
        .zip(extents)
        .fold(0, |acc, (&c, &n)| acc * n + c)
}

/// Inverse of [`flatten`].
#[must_use]
pub fn unflatten<const D: usize>(mut index: usize, extents: &[usize; D]) -> [usize; D] {
    let mut coords = [0; D];
    for d in (0..D).rev() {
        coords[d] = index % extents[d];
        index /= extents[d];
    }
    coords
}

/// Immutable site-ordering metadata shared by every lattice of one shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout<const D: usize = 4> {
    shape: [usize; D],
    block_shape: [usize; D],
    volume: usize,
    block_volume: usize,
    num_blocks: usize,
    num_even: usize,
    to_storage: Vec<usize>,
    to_site: Vec<usize>,
}

impl<const D: usize> Layout<D> {
    /// Build the layout for `shape` tiled by `block_shape`.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidShape`] if either slice does not have length
    /// D, an extent is zero, or a block extent does not divide the lattice
    /// extent.
    pub fn new(shape: &[usize], block_shape: &[usize]) -> Result<Self, LatticeError> {
        let shape: [usize; D] = shape.try_into().map_err(|_| {
            LatticeError::InvalidShape(format!(
                "lattice shape has {} dimensions, expected {D}",
                shape.len()
            ))
        })?;
        let block_shape: [usize; D] = block_shape.try_into().map_err(|_| {
            LatticeError::InvalidShape(format!(
                "block shape has {} dimensions, expected {D}",
                block_shape.len()
            ))
        })?;
        for d in 0..D {
            if shape[d] == 0 || block_shape[d] == 0 {
                return Err(LatticeError::InvalidShape(format!(
                    "zero extent in dimension {d}: lattice {shape:?}, block {block_shape:?}"
                )));
            }
            if shape[d] % block_shape[d] != 0 {
                return Err(LatticeError::InvalidShape(format!(
                    "block extent {} does not divide lattice extent {} in dimension {d}",
                    block_shape[d], shape[d]
                )));
            }
        }

        let volume: usize = shape.iter().product();
        let block_volume: usize = block_shape.iter().product();
        let num_blocks = volume / block_volume;
        let mut grid = [0; D];
        for d in 0..D {
            grid[d] = shape[d] / block_shape[d];
        }

        let mut to_storage = vec![0; volume];
        let mut to_site = Vec::with_capacity(volume);
        let mut num_even = 0;
        for parity in [Parity::Even, Parity::Odd] {
            for block in 0..num_blocks {
                let origin = unflatten(block, &grid);
                for offset in 0..block_volume {
                    let local = unflatten(offset, &block_shape);
                    let mut coords = [0; D];
                    for d in 0..D {
                        coords[d] = origin[d] * block_shape[d] + local[d];
                    }
                    if Parity::of_sum(coords.iter().sum()) != parity {
                        continue;
                    }
                    let site = flatten(&coords, &shape);
                    to_storage[site] = to_site.len();
                    to_site.push(site);
                }
            }
            if parity == Parity::Even {
                num_even = to_site.len();
            }
        }

        Ok(Self {
            shape,
            block_shape,
            volume,
            block_volume,
            num_blocks,
            num_even,
            to_storage,
            to_site,
        })
    }

    /// Lattice extents.
    #[must_use]
    pub const fn shape(&self) -> [usize; D] {
        self.shape
    }

    /// Block extents.
    #[must_use]
    pub const fn block_shape(&self) -> [usize; D] {
        self.block_shape
    }

    /// Number of sites.
    #[must_use]
    pub const fn volume(&self) -> usize {
        self.volume
    }

    /// Sites per block.
    #[must_use]
    pub const fn block_volume(&self) -> usize {
        self.block_volume
    }

    /// Number of blocks.
    #[must_use]
    pub const fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Number of sites with the given parity.
    #[must_use]
    pub const fn parity_volume(&self, parity: Parity) -> usize {
        match parity {
            Parity::Even => self.num_even,
            Parity::Odd => self.volume - self.num_even,
        }
    }

    /// Lexicographic index of in-range coordinates.
    ///
    /// # Panics
    ///
    /// If any coordinate is outside the lattice.
    #[must_use]
    pub fn site_index(&self, coords: &[usize; D]) -> usize {
        for d in 0..D {
            assert!(
                coords[d] < self.shape[d],
                "coordinate {} out of range in dimension {d} (extent {})",
                coords[d],
                self.shape[d]
            );
        }
        flatten(coords, &self.shape)
    }

    /// Lexicographic index of periodic coordinates.
    #[must_use]
    pub fn wrapped_index(&self, coords: &[isize; D]) -> usize {
        let mut wrapped = [0; D];
        for d in 0..D {
            wrapped[d] = wrap(coords[d], self.shape[d]);
        }
        flatten(&wrapped, &self.shape)
    }

    /// Coordinates of a lexicographic index.
    ///
    /// # Panics
    ///
    /// If `index >= volume`.
    #[must_use]
    pub fn site_coords(&self, index: usize) -> [usize; D] {
        assert!(index < self.volume, "site index {index} out of range");
        unflatten(index, &self.shape)
    }

    /// Lexicographic index of the site `shift` steps along `dimension`.
    #[must_use]
    pub fn shift_index(&self, index: usize, dimension: usize, shift: isize) -> usize {
        let mut coords = self.site_coords(index);
        coords[dimension] = shift_coord(coords[dimension], shift, self.shape[dimension]);
        flatten(&coords, &self.shape)
    }

    /// Position of a site in storage.
    #[must_use]
    pub fn storage_index(&self, index: usize) -> usize {
        self.to_storage[index]
    }

    /// Lexicographic index of a storage position.
    #[must_use]
    pub fn site_at_storage(&self, storage: usize) -> usize {
        self.to_site[storage]
    }

    /// `(block, offset)` storage pair of a site.
    #[must_use]
    pub fn block_site(&self, index: usize) -> (usize, usize) {
        let storage = self.to_storage[index];
        (storage / self.block_volume, storage % self.block_volume)
    }

    /// Parity of a site.
    #[must_use]
    pub fn parity(&self, index: usize) -> Parity {
        if self.to_storage[index] < self.num_even {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    /// Index of a site within its parity class, in storage order.
    #[must_use]
    pub fn half_index(&self, index: usize) -> usize {
        let storage = self.to_storage[index];
        if storage < self.num_even {
            storage
        } else {
            storage - self.num_even
        }
    }

    /// Lexicographic indices of all sites of one parity, in storage order.
    #[must_use]
    pub fn parity_sites(&self, parity: Parity) -> &[usize] {
        match parity {
            Parity::Even => &self.to_site[..self.num_even],
            Parity::Odd => &self.to_site[self.num_even..],
        }
    }
}

/// Reduce a signed coordinate modulo an extent.
#[must_use]
pub fn wrap(coord: isize, extent: usize) -> usize {
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    let r = coord.rem_euclid(extent as isize) as usize;
    r
}

/// Move an in-range coordinate by `shift` with periodic wrap.
#[must_use]
pub fn shift_coord(coord: usize, shift: isize, extent: usize) -> usize {
    #[allow(clippy::cast_possible_wrap)]
    let moved = coord as isize + shift;
    wrap(moved, extent)
}

/// Periodic D-dimensional container in even/odd blocked storage order.
#[derive(Debug, Clone)]
pub struct BlockedLattice<T, const D: usize = 4> {
    layout: Arc<Layout<D>>,
    data: Vec<T>,
}

impl<T: Clone, const D: usize> BlockedLattice<T, D> {
    /// Lattice with every site set to `value`.
    ///
    /// # Errors
    ///
    /// See [`Layout::new`].
    pub fn filled(value: T, shape: &[usize], block_shape: &[usize]) -> Result<Self, LatticeError> {
        let layout = Arc::new(Layout::new(shape, block_shape)?);
        Ok(Self::with_layout(value, layout))
    }

    /// Lattice sharing an existing layout, every site set to `value`.
    #[must_use]
    pub fn with_layout(value: T, layout: Arc<Layout<D>>) -> Self {
        let data = vec![value; layout.volume()];
        Self { layout, data }
    }

    /// Set every site to `value`.
    pub fn fill(&mut self, value: &T) {
        for v in &mut self.data {
            v.clone_from(value);
        }
    }
}

impl<T: Clone + Default, const D: usize> BlockedLattice<T, D> {
    /// Lattice with default-initialised sites.
    ///
    /// # Errors
    ///
    /// See [`Layout::new`].
    pub fn new(shape: &[usize], block_shape: &[usize]) -> Result<Self, LatticeError> {
        Self::filled(T::default(), shape, block_shape)
    }
}

impl<T, const D: usize> BlockedLattice<T, D> {
    /// Lattice whose site at lexicographic index `i` is `f(i)`.
    pub fn from_fn(layout: Arc<Layout<D>>, mut f: impl FnMut(usize) -> T) -> Self {
        let data = (0..layout.volume())
            .map(|storage| f(layout.site_at_storage(storage)))
            .collect();
        Self { layout, data }
    }

    /// Shared layout metadata.
    #[must_use]
    pub fn layout(&self) -> &Arc<Layout<D>> {
        &self.layout
    }

    /// Lattice extents.
    #[must_use]
    pub fn shape(&self) -> [usize; D] {
        self.layout.shape()
    }

    /// Number of sites.
    #[must_use]
    pub fn volume(&self) -> usize {
        self.layout.volume()
    }

    /// Site at a lexicographic index.
    #[must_use]
    pub fn at(&self, index: usize) -> &T {
        &self.data[self.layout.storage_index(index)]
    }

    /// Mutable site at a lexicographic index.
    pub fn at_mut(&mut self, index: usize) -> &mut T {
        let storage = self.layout.storage_index(index);
        &mut self.data[storage]
    }

    /// Site at in-range coordinates.
    ///
    /// # Panics
    ///
    /// If a coordinate is out of range.
    #[must_use]
    pub fn get(&self, coords: &[usize; D]) -> &T {
        self.at(self.layout.site_index(coords))
    }

    /// Mutable site at in-range coordinates.
    ///
    /// # Panics
    ///
    /// If a coordinate is out of range.
    pub fn get_mut(&mut self, coords: &[usize; D]) -> &mut T {
        let index = self.layout.site_index(coords);
        self.at_mut(index)
    }

    /// Site at periodic coordinates.
    #[must_use]
    pub fn get_wrapped(&self, coords: &[isize; D]) -> &T {
        self.at(self.layout.wrapped_index(coords))
    }

    /// Storage slice of all even sites.
    #[must_use]
    pub fn even_sites(&self) -> &[T] {
        &self.data[..self.layout.parity_volume(Parity::Even)]
    }

    /// Storage slice of all odd sites.
    #[must_use]
    pub fn odd_sites(&self) -> &[T] {
        &self.data[self.layout.parity_volume(Parity::Even)..]
    }

    /// Mutable storage slice of all even sites.
    pub fn even_sites_mut(&mut self) -> &mut [T] {
        let n = self.layout.parity_volume(Parity::Even);
        &mut self.data[..n]
    }

    /// Mutable storage slice of all odd sites.
    pub fn odd_sites_mut(&mut self) -> &mut [T] {
        let n = self.layout.parity_volume(Parity::Even);
        &mut self.data[n..]
    }

    /// Sites in storage order.
    #[must_use]
    pub fn storage(&self) -> &[T] {
        &self.data
    }

    /// `(lexicographic index, value)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(|(storage, v)| (self.layout.site_at_storage(storage), v))
    }

    /// View shifted by `shift` sites along `dimension`:
    /// `view[x] = self[x - shift·ê]`.
    ///
    /// # Panics
    ///
    /// If `dimension >= D`.
    #[must_use]
    pub fn roll(&self, dimension: usize, shift: isize) -> Rolled<'_, T, D> {
        assert!(dimension < D, "roll dimension {dimension} out of range");
        Rolled {
            lattice: self,
            dimension,
            shift,
        }
    }

    /// Apply `f` to every site.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> BlockedLattice<U, D> {
        BlockedLattice {
            layout: Arc::clone(&self.layout),
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Combine two same-shaped lattices site by site.
    ///
    /// # Panics
    ///
    /// If the layouts differ.
    pub fn zip_map<U, V>(
        &self,
        other: &BlockedLattice<U, D>,
        mut f: impl FnMut(&T, &U) -> V,
    ) -> BlockedLattice<V, D> {
        assert!(
            Arc::ptr_eq(&self.layout, &other.layout) || *self.layout == *other.layout,
            "elementwise operation on lattices with different layouts: {:?} vs {:?}",
            self.layout.shape(),
            other.layout.shape()
        );
        BlockedLattice {
            layout: Arc::clone(&self.layout),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| f(a, b))
                .collect(),
        }
    }
}

/// Periodically shifted, borrowed view of a [`BlockedLattice`].
#[derive(Debug, Clone, Copy)]
pub struct Rolled<'a, T, const D: usize> {
    lattice: &'a BlockedLattice<T, D>,
    dimension: usize,
    shift: isize,
}

impl<'a, T, const D: usize> Rolled<'a, T, D> {
    /// Value at a lexicographic index of the view.
    #[must_use]
    pub fn at(&self, index: usize) -> &'a T {
        let source = self
            .lattice
            .layout
            .shift_index(index, self.dimension, -self.shift);
        self.lattice.at(source)
    }

    /// Value at in-range coordinates of the view.
    #[must_use]
    pub fn get(&self, coords: &[usize; D]) -> &'a T {
        self.at(self.lattice.layout.site_index(coords))
    }

    /// Materialise the view as a new lattice.
    #[must_use]
    pub fn to_lattice(&self) -> BlockedLattice<T, D>
    where
        T: Clone,
    {
        BlockedLattice::from_fn(Arc::clone(&self.lattice.layout), |i| self.at(i).clone())
    }
}

macro_rules! elementwise_ops {
    ($($trait:ident :: $method:ident),*) => {$(
        impl<T, const D: usize> $trait<&BlockedLattice<T, D>> for &BlockedLattice<T, D>
        where
            T: $trait<Output = T> + Copy,
        {
            type Output = BlockedLattice<T, D>;
            fn $method(self, rhs: &BlockedLattice<T, D>) -> Self::Output {
                self.zip_map(rhs, |a, b| $trait::$method(*a, *b))
            }
        }

        impl<T, const D: usize> $trait<f64> for &BlockedLattice<T, D>
        where
            T: $trait<f64, Output = T> + Copy,
        {
            type Output = BlockedLattice<T, D>;
            fn $method(self, rhs: f64) -> Self::Output {
                self.map(|a| $trait::$method(*a, rhs))
            }
        }

        impl<T, const D: usize> $trait<Complex64> for &BlockedLattice<T, D>
        where
            T: $trait<Complex64, Output = T> + Copy,
        {
            type Output = BlockedLattice<T, D>;
            fn $method(self, rhs: Complex64) -> Self::Output {
                self.map(|a| $trait::$method(*a, rhs))
            }
        }
    )*};
}

elementwise_ops!(Add::add, Sub::sub, Mul::mul, Div::div);
