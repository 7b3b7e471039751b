//! Definitions to describe multilevel quantum systems, their density matrices,
//! and the generalized Bloch-vector (adjoint) representation thereof.
//!
//! Hamiltonians are taken in units of angular frequency and dipole operators
//! in C m. The adjoint basis is the set of generalized Gell-Mann matrices
//! `λ_k`, normalized such that `tr(λ_i λ_j) = 2 δ_ij`, so that a density matrix
//! `ρ` of an `L`-level system is written as
//! ```text
//! ρ = I / L + (1/2) Σ_k d_k λ_k,    d_k = tr(λ_k ρ)
//! ```
//! where `d` is the real Bloch vector of length `L^2 - 1`.

use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::error::MaterialError;

/// Compute the outer product of two state vectors.
pub fn outer_prod<SA, SB>(
    a: &nd::ArrayBase<SA, nd::Ix1>,
    b: &nd::ArrayBase<SB, nd::Ix1>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    nd::Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j].conj())
}

/// Compute `tr(A B)` without forming the product.
pub fn trace_prod<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
) -> C64
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.iter().zip(B.t().iter()).map(|(a, b)| *a * *b).sum()
}

/// Return `true` if `A` is square and equal to its conjugate transpose up to an
/// absolute tolerance relative to its largest element.
pub fn is_hermitian<S>(A: &nd::ArrayBase<S, nd::Ix2>, rtol: f64) -> bool
where S: nd::Data<Elem = C64>
{
    if !A.is_square() { return false; }
    let scale = A.iter().map(|a| a.norm()).fold(0.0, f64::max);
    let tol = rtol * scale.max(f64::MIN_POSITIVE);
    A.indexed_iter().all(|((i, j), a)| (*a - A[[j, i]].conj()).norm() <= tol)
}

/// Generalized Gell-Mann matrices for an `L`-level system.
///
/// Generators are ordered as all symmetric off-diagonal matrices, then all
/// antisymmetric off-diagonal matrices (both by ascending level pair `j < k`),
/// then the `L - 1` diagonal matrices.
#[derive(Clone, Debug)]
pub struct AdjointBasis {
    levels: usize,
    generators: Vec<nd::Array2<C64>>,
}

impl AdjointBasis {
    /// Build the basis for `levels` quantum levels.
    pub fn new(levels: usize) -> Self {
        let n = levels;
        let mut generators: Vec<nd::Array2<C64>>
            = Vec::with_capacity((n * n).saturating_sub(1));
        let pairs: Vec<(usize, usize)> = (0..n).tuple_combinations().collect();
        for &(j, k) in pairs.iter() {
            let mut g: nd::Array2<C64> = nd::Array2::zeros((n, n));
            g[[j, k]] = C64::from(1.0);
            g[[k, j]] = C64::from(1.0);
            generators.push(g);
        }
        for &(j, k) in pairs.iter() {
            let mut g: nd::Array2<C64> = nd::Array2::zeros((n, n));
            g[[j, k]] = -C64::i();
            g[[k, j]] = C64::i();
            generators.push(g);
        }
        for l in 1..n {
            let lf = l as f64;
            let norm = (2.0 / (lf * (lf + 1.0))).sqrt();
            let mut g: nd::Array2<C64> = nd::Array2::zeros((n, n));
            (0..l).for_each(|j| { g[[j, j]] = C64::from(norm); });
            g[[l, l]] = C64::from(-lf * norm);
            generators.push(g);
        }
        Self { levels, generators }
    }

    /// Number of quantum levels `L`.
    pub fn levels(&self) -> usize { self.levels }

    /// Dimension of the adjoint representation, `L^2 - 1`.
    pub fn dim(&self) -> usize { self.generators.len() }

    /// Get a reference to the generators.
    pub fn generators(&self) -> &[nd::Array2<C64>] { &self.generators }

    /// Convert a density matrix to its Bloch vector.
    pub fn to_bloch<S>(&self, rho: &nd::ArrayBase<S, nd::Ix2>)
        -> nd::Array1<f64>
    where S: nd::Data<Elem = C64>
    {
        self.generators.iter()
            .map(|g| trace_prod(g, rho).re)
            .collect()
    }

    /// Convert a Bloch vector to its density matrix.
    pub fn to_density<S>(&self, d: &nd::ArrayBase<S, nd::Ix1>)
        -> nd::Array2<C64>
    where S: nd::Data<Elem = f64>
    {
        let n = self.levels;
        let mut rho: nd::Array2<C64>
            = nd::Array2::<C64>::eye(n) * C64::from(1.0 / n as f64);
        self.generators.iter().zip(d)
            .for_each(|(g, dk)| { rho.scaled_add(C64::from(0.5 * dk), g); });
        rho
    }

    /// Express the density matrix element `ρ_mn` (0-based) as an affine
    /// functional of the Bloch vector, returning `(offset, coeffs)` such that
    /// `ρ_mn = offset + Σ_k coeffs_k d_k`.
    pub fn element_functional(&self, m: usize, n: usize)
        -> (C64, nd::Array1<C64>)
    {
        let offset
            = if m == n {
                C64::from(1.0 / self.levels as f64)
            } else {
                C64::zero()
            };
        let coeffs: nd::Array1<C64>
            = self.generators.iter().map(|g| g[[m, n]] * 0.5).collect();
        (offset, coeffs)
    }

    /// Convert a linear superoperator `S` acting on density matrices into its
    /// adjoint-representation form, returning `(M, d_in)` such that the
    /// equation of motion `ρ' = S(ρ)` reads `d' = M d + d_in`.
    pub fn superop_to_adjoint<F>(&self, S: F)
        -> (nd::Array2<f64>, nd::Array1<f64>)
    where F: Fn(&nd::Array2<C64>) -> nd::Array2<C64>
    {
        let dim = self.dim();
        let images: Vec<nd::Array2<C64>>
            = self.generators.iter().map(&S).collect();
        let M: nd::Array2<f64>
            = nd::Array2::from_shape_fn(
                (dim, dim),
                |(k, j)| 0.5 * trace_prod(&self.generators[k], &images[j]).re,
            );
        let s_id = S(&nd::Array2::eye(self.levels));
        let d_in: nd::Array1<f64>
            = self.generators.iter()
            .map(|g| trace_prod(g, &s_id).re / self.levels as f64)
            .collect();
        (M, d_in)
    }
}

/// Quantum-mechanical description of a multilevel medium.
///
/// All rates and the Hamiltonian are in units of angular frequency.
#[derive(Clone, Debug)]
pub struct QmDescription {
    /// Hamiltonian `H / ħ`.
    pub hamiltonian: nd::Array2<C64>,
    /// Dipole moment operator in C m.
    pub dipole: nd::Array2<C64>,
    /// Lindblad scattering rates; the `(a, b)`-th element is the rate of
    /// population transfer from level `a` to level `b`. Diagonal elements act
    /// as pure dephasing of a single level.
    pub scattering: nd::Array2<f64>,
    /// Symmetric pure dephasing rates; the `(i, j)`-th element damps `ρ_ij`.
    pub dephasing: nd::Array2<f64>,
    /// Number density of quantum systems in m^-3.
    pub carrier_density: f64,
    /// Initial density matrix.
    pub rho_init: nd::Array2<C64>,
}

impl QmDescription {
    /// Create a new description without relaxation, initially in the lowest
    /// level.
    pub fn new(
        hamiltonian: nd::Array2<C64>,
        dipole: nd::Array2<C64>,
        carrier_density: f64,
    ) -> Self
    {
        let n = hamiltonian.nrows();
        let mut rho_init: nd::Array2<C64> = nd::Array2::zeros((n, n));
        if n > 0 { rho_init[[0, 0]] = C64::from(1.0); }
        Self {
            hamiltonian,
            dipole,
            scattering: nd::Array2::zeros((n, n)),
            dephasing: nd::Array2::zeros((n, n)),
            carrier_density,
            rho_init,
        }
    }

    /// Standard two-level system with transition frequency `freq` (angular),
    /// dipole moment `dipole` (C m), spontaneous decay rate `scattering` from
    /// the upper to the lower level, and pure dephasing rate `dephasing`.
    pub fn two_level(
        freq: f64,
        dipole: f64,
        carrier_density: f64,
        scattering: f64,
        dephasing: f64,
    ) -> Self
    {
        let H: nd::Array2<C64>
            = nd::Array2::from_diag(
                &nd::array![C64::from(-freq / 2.0), C64::from(freq / 2.0)]);
        let u: nd::Array2<C64>
            = nd::array![
                [C64::zero(), C64::from(dipole)],
                [C64::from(dipole), C64::zero()],
            ];
        Self::new(H, u, carrier_density)
            .with_scattering(nd::array![[0.0, 0.0], [scattering, 0.0]])
            .with_dephasing(nd::array![[0.0, dephasing], [dephasing, 0.0]])
    }

    /// Set the Lindblad scattering rates.
    pub fn with_scattering(mut self, scattering: nd::Array2<f64>) -> Self {
        self.scattering = scattering;
        self
    }

    /// Set the pure dephasing rates.
    pub fn with_dephasing(mut self, dephasing: nd::Array2<f64>) -> Self {
        self.dephasing = dephasing;
        self
    }

    /// Set the initial density matrix.
    pub fn with_rho_init(mut self, rho_init: nd::Array2<C64>) -> Self {
        self.rho_init = rho_init;
        self
    }

    /// Number of quantum levels.
    pub fn levels(&self) -> usize { self.hamiltonian.nrows() }

    /// Check that all operators have matching shapes, that the Hamiltonian and
    /// dipole operator are Hermitian, that all rates are finite and
    /// non-negative, and that [`Self::rho_init`] is a density matrix.
    pub fn validate(&self) -> Result<(), MaterialError> {
        let n = self.levels();
        MaterialError::check(n >= 2, || {
            format!("at least two levels are required; got {}", n)
        })?;
        let shape = [n, n];
        MaterialError::check(
            self.hamiltonian.shape() == shape
                && self.dipole.shape() == shape
                && self.scattering.shape() == shape
                && self.dephasing.shape() == shape
                && self.rho_init.shape() == shape,
            || format!("all operators must be {}x{}", n, n),
        )?;
        MaterialError::check(
            self.hamiltonian.iter().chain(self.dipole.iter())
                .all(|z| z.re.is_finite() && z.im.is_finite()),
            || "operators must be finite".into(),
        )?;
        MaterialError::check(is_hermitian(&self.hamiltonian, 1e-12), || {
            "hamiltonian must be Hermitian".into()
        })?;
        MaterialError::check(is_hermitian(&self.dipole, 1e-12), || {
            "dipole operator must be Hermitian".into()
        })?;
        MaterialError::check(
            self.scattering.iter().chain(self.dephasing.iter())
                .all(|y| y.is_finite() && *y >= 0.0),
            || "relaxation rates must be finite and non-negative".into(),
        )?;
        MaterialError::check(
            self.dephasing == self.dephasing.t(),
            || "dephasing rates must be symmetric".into(),
        )?;
        MaterialError::check(
            self.carrier_density.is_finite() && self.carrier_density >= 0.0,
            || {
                format!(
                    "carrier density must be non-negative; got {}",
                    self.carrier_density,
                )
            },
        )?;
        check_density(&self.rho_init)
    }
}

/// Check that `rho` is Hermitian with unit trace and non-negative populations.
pub fn check_density(rho: &nd::Array2<C64>) -> Result<(), MaterialError> {
    MaterialError::check(is_hermitian(rho, 1e-12), || {
        "initial density matrix must be Hermitian".into()
    })?;
    MaterialError::check(
        rho.diag().iter().all(|p| p.re >= 0.0 && p.im.abs() <= 1e-12),
        || "initial populations must be real and non-negative".into(),
    )?;
    let tr: C64 = rho.diag().sum();
    MaterialError::check((tr - 1.0).norm() <= 1e-9, || {
        format!("initial density matrix must have unit trace; got {}", tr)
    })
}
