//! Field and Bloch-vector storage on the Yee grid.

use ndarray as nd;
use rustc_hash::FxHashMap;
use crate::{
    device::Device,
    error::SolverError,
    propagator::PropagatorSet,
    scenario::SimGrid,
};

/// Allocate a vector of `len` copies of `value`, reporting failure instead of
/// aborting.
pub(crate) fn try_filled<T: Clone>(what: &'static str, len: usize, value: T)
    -> Result<Vec<T>, SolverError>
{
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| SolverError::Allocation { what, size: len })?;
    v.resize(len, value);
    Ok(v)
}

/// Assign a material index to every grid point `x_i = i Δx`.
///
/// `index_of` maps material ids to indices into the propagator list. Grid
/// points on a shared region boundary take the first listed region.
pub fn resolve_material_indices(
    device: &Device,
    grid: &SimGrid,
    index_of: &FxHashMap<&str, usize>,
) -> Result<Vec<usize>, SolverError>
{
    let tol = 1e-6 * grid.d_x;
    (0..grid.num_gridpoints)
        .map(|i| {
            let x = i as f64 * grid.d_x;
            let region = device.region_at(x, tol)
                .ok_or(SolverError::RegionNotFound { index: i, x })?;
            index_of.get(region.material.as_str()).copied()
                .ok_or_else(|| {
                    SolverError::UnknownMaterial(region.material.clone())
                })
        })
        .collect()
}

/// Mutable simulation state.
///
/// `E` lives on the `N` integer grid points, `H` on the `N + 1` staggered
/// points around them, so that `E[i]` sits between `H[i]` and `H[i + 1]`.
#[derive(Clone, Debug)]
pub struct GridState {
    /// One Bloch vector per grid point (row-major, `N x adjoint_dim`).
    pub bloch: nd::Array2<f64>,
    pub e: Vec<f64>,
    pub h: Vec<f64>,
    pub mat_indices: Vec<usize>,
}

impl GridState {
    /// Allocate all arrays, zero-initialized.
    pub fn new(adjoint_dim: usize, mat_indices: Vec<usize>)
        -> Result<Self, SolverError>
    {
        let n = mat_indices.len();
        let bloch_data = try_filled("bloch vectors", n * adjoint_dim, 0.0)?;
        let bloch = nd::Array2::from_shape_vec((n, adjoint_dim), bloch_data)
            .map_err(|err| SolverError::InvalidGrid(err.to_string()))?;
        let e = try_filled("electric field", n, 0.0)?;
        let h = try_filled("magnetic field", n + 1, 0.0)?;
        Ok(Self { bloch, e, h, mat_indices })
    }

    /// Number of grid points.
    pub fn len(&self) -> usize { self.e.len() }

    /// Return `true` if the grid holds no points.
    pub fn is_empty(&self) -> bool { self.e.is_empty() }

    /// Dimension of the stored Bloch vectors.
    pub fn adjoint_dim(&self) -> usize { self.bloch.ncols() }

    /// Restore the `t = 0` state: zero fields, and every quantum cell at its
    /// material's initial Bloch vector. Dielectric cells hold zeros.
    pub fn reset(&mut self, sets: &[PropagatorSet]) {
        self.e.iter_mut().for_each(|e| { *e = 0.0; });
        self.h.iter_mut().for_each(|h| { *h = 0.0; });
        let iter
            = self.bloch.outer_iter_mut()
            .zip(self.mat_indices.iter());
        for (mut d, &m) in iter {
            match &sets[m].quantum {
                Some(q) => { d.assign(&q.d_init); },
                None => { d.fill(0.0); },
            }
        }
    }
}
