//! Per-material propagators for the coupled Maxwell-Bloch update.
//!
//! The Bloch vector `d` of a cell obeys
//! ```text
//! d' = (M + E U) d + d_in
//! ```
//! which is integrated over one time step `Δt` by Strang splitting: an exact
//! affine half step under `M`, a rotation `R(E) = exp(U Δt E)` at the current
//! local field, and a second half step under `M`. The half-step propagator is
//! computed once from the eigen decomposition of `M`; the rotation is
//! synthesized at runtime from the spectrum of `U`, either as a sum of
//! elementary plane rotations or as a diagonal phase multiply in the
//! eigenbasis of `U`.

use ndarray as nd;
use ndarray_linalg::{ Eig, Eigh, Inverse, UPLO };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use tracing::{ debug, warn };
use crate::{
    config::InteractionMethod,
    consts::{ EPS0, MU0 },
    device::Material,
    error::MaterialError,
    hilbert::{ check_density, outer_prod, AdjointBasis },
    liouville::BlochGenerators,
    scenario::SimGrid,
};

/// Exact affine evolution `d' = M d + d_in` via the eigen decomposition
/// `M = V Λ V^-1`.
#[derive(Clone, Debug)]
pub struct FreeEvolution {
    eigvals: nd::Array1<C64>,
    V: nd::Array2<C64>,
    V_inv: nd::Array2<C64>,
}

impl FreeEvolution {
    /// Diagonalize `M`.
    ///
    /// Fails with [`MaterialError::NotDiagonalizable`] if `V Λ V^-1` does not
    /// reproduce `M` to a relative accuracy of `1e-6`.
    pub fn new(M: &nd::Array2<f64>) -> Result<Self, MaterialError> {
        let (eigvals, V): (nd::Array1<C64>, nd::Array2<C64>) = M.eig()?;
        let V_inv = V.inv()
            .map_err(|_| MaterialError::NotDiagonalizable(f64::INFINITY))?;
        let mut VL = V.clone();
        VL.axis_iter_mut(nd::Axis(1)).zip(eigvals.iter())
            .for_each(|(mut col, l)| { col.mapv_inplace(|v| v * *l); });
        let recon = VL.dot(&V_inv);
        let scale
            = M.iter().map(|m| m.abs()).fold(0.0, f64::max)
            .max(f64::MIN_POSITIVE);
        let err
            = recon.iter().zip(M.iter())
            .map(|(r, m)| (*r - *m).norm())
            .fold(0.0, f64::max) / scale;
        if err > 1e-6 {
            return Err(MaterialError::NotDiagonalizable(err));
        } else if err > 1e-10 {
            warn!("free generator eigen decomposition is poorly conditioned (reconstruction error {:e})", err);
        }
        Ok(Self { eigvals, V, V_inv })
    }

    /// Eigenvalues of `M`.
    pub fn eigvals(&self) -> &nd::Array1<C64> { &self.eigvals }

    // Re(V diag(f(λ)) V^-1 x)
    fn apply_diag<F>(&self, f: F, x: &nd::Array1<f64>) -> nd::Array1<f64>
    where F: Fn(C64) -> C64
    {
        let c: nd::Array1<C64>
            = self.V_inv.dot(&x.mapv(C64::from)).iter().zip(&self.eigvals)
            .map(|(ck, l)| *ck * f(*l))
            .collect();
        self.V.dot(&c).mapv(|z| z.re)
    }

    /// Propagator `exp(M τ)`.
    pub fn propagator(&self, tau: f64) -> nd::Array2<f64> {
        let mut W = self.V.clone();
        W.axis_iter_mut(nd::Axis(1)).zip(self.eigvals.iter())
            .for_each(|(mut col, l)| {
                let f = (*l * tau).exp();
                col.mapv_inplace(|v| v * f);
            });
        W.dot(&self.V_inv).mapv(|z| z.re)
    }

    /// Offset `b(τ) = ∫_0^τ exp(M s) ds d_in` such that the exact affine
    /// evolution over `τ` is `d ← exp(M τ) d + b(τ)`.
    pub fn offset(&self, tau: f64, d_in: &nd::Array1<f64>) -> nd::Array1<f64> {
        self.apply_diag(
            |l| {
                let x = l * tau;
                if x.norm() < 1e-8 {
                    tau * (1.0 + x / 2.0)
                } else {
                    (x.exp() - 1.0) / l
                }
            },
            d_in,
        )
    }

    /// Stationary point `-M^+ d_in` of the affine evolution, dropping null
    /// modes of `M`.
    pub fn equilibrium(&self, d_in: &nd::Array1<f64>) -> nd::Array1<f64> {
        let lmax
            = self.eigvals.iter().map(|l| l.norm()).fold(1.0, f64::max);
        let tol = 1e-12 * lmax;
        -self.apply_diag(
            |l| if l.norm() <= tol { C64::zero() } else { 1.0 / l },
            d_in,
        )
    }
}

/// Elementary plane rotations spanning `R(E) = exp(U Δt E)`.
///
/// With `i U Δt = B diag(μ) B^†`, each positive `μ_k` with eigenvector `b_k`
/// pairs with `-μ_k` and `conj(b_k)` into a plane with
/// ```text
/// θ_k = μ_k,  C1_k = 2 Im(b_k b_k^†),  C2_k = -2 Re(b_k b_k^†)
/// R(E) = I + Σ_k [ sin(θ_k E) C1_k + (1 - cos(θ_k E)) C2_k ]
/// ```
#[derive(Clone, Debug)]
pub struct InteractionPlanes {
    thetas: Vec<f64>,
    c1: Vec<nd::Array2<f64>>,
    c2: Vec<nd::Array2<f64>>,
    /// Eigenvectors of `i U Δt`.
    basis_change: nd::Array2<C64>,
    basis_change_h: nd::Array2<C64>,
    /// Eigenvalues `-i μ_j` of `U Δt`.
    phases: nd::Array1<C64>,
}

impl InteractionPlanes {
    /// Decompose `exp(U Δt E)` for a real antisymmetric `U`.
    pub fn new(U: &nd::Array2<f64>, d_t: f64) -> Result<Self, MaterialError> {
        let n = U.nrows();
        let H: nd::Array2<C64> = U.mapv(|u| C64::new(0.0, u * d_t));
        let (mu, B): (nd::Array1<f64>, nd::Array2<C64>) = H.eigh(UPLO::Lower)?;
        let scale = mu.iter().map(|m| m.abs()).fold(0.0, f64::max);
        let tol = 1e-9 * scale.max(f64::MIN_POSITIVE);
        // ascending order: μ[k] pairs with μ[n - 1 - k]; odd n leaves a zero
        // in the middle
        if (0..n).any(|k| (mu[k] + mu[n - 1 - k]).abs() > tol) {
            return Err(MaterialError::UnpairedSpectrum);
        }
        let mut thetas: Vec<f64> = Vec::with_capacity(n / 2);
        let mut c1: Vec<nd::Array2<f64>> = Vec::with_capacity(n / 2);
        let mut c2: Vec<nd::Array2<f64>> = Vec::with_capacity(n / 2);
        for k in (n - n / 2..n).rev() {
            if mu[k] <= tol { continue; }
            let b = B.column(k);
            let P = outer_prod(&b, &b);
            thetas.push(mu[k]);
            c1.push(P.mapv(|p| 2.0 * p.im));
            c2.push(P.mapv(|p| -2.0 * p.re));
        }
        let basis_change_h = B.t().mapv(|b| b.conj());
        let phases = mu.mapv(|m| C64::new(0.0, -m));
        Ok(Self {
            thetas,
            c1,
            c2,
            basis_change: B,
            basis_change_h,
            phases,
        })
    }

    /// Rotation angles per unit field, in descending order.
    pub fn thetas(&self) -> &[f64] { &self.thetas }

    /// Number of non-trivial planes.
    pub fn num_planes(&self) -> usize { self.thetas.len() }

    /// Eigenvectors of `i U Δt`.
    pub fn basis_change(&self) -> &nd::Array2<C64> { &self.basis_change }

    /// Eigenvalues of `U Δt`.
    pub fn phases(&self) -> &nd::Array1<C64> { &self.phases }

    /// Form `R(E)` explicitly.
    pub fn rotation(&self, e: f64, method: InteractionMethod)
        -> nd::Array2<f64>
    {
        let n = self.phases.len();
        match method {
            InteractionMethod::Diagonal => {
                let mut W = self.basis_change.clone();
                W.axis_iter_mut(nd::Axis(1)).zip(self.phases.iter())
                    .for_each(|(mut col, l)| {
                        let f = (*l * e).exp();
                        col.mapv_inplace(|v| v * f);
                    });
                W.dot(&self.basis_change_h).mapv(|z| z.re)
            },
            _ => {
                let mut R: nd::Array2<f64> = nd::Array2::eye(n);
                let iter
                    = self.thetas.iter().zip(&self.c1).zip(&self.c2);
                for ((theta, c1), c2) in iter {
                    let (s, c) = (theta * e).sin_cos();
                    R.scaled_add(s, c1);
                    R.scaled_add(1.0 - c, c2);
                }
                R
            },
        }
    }

    /// Apply `R(E)` to `d` in place.
    pub fn apply(
        &self,
        e: f64,
        method: InteractionMethod,
        d: &mut nd::ArrayViewMut1<f64>,
        ws: &mut Workspace,
    ) {
        match method {
            InteractionMethod::Diagonal => {
                let cplx = &mut ws.cplx;
                let iter
                    = cplx.iter_mut()
                    .zip(self.basis_change_h.outer_iter())
                    .zip(self.phases.iter());
                for ((ck, row), l) in iter {
                    let proj: C64
                        = row.iter().zip(d.iter())
                        .map(|(b, dj)| *b * *dj)
                        .sum();
                    *ck = proj * (*l * e).exp();
                }
                let iter
                    = d.iter_mut().zip(self.basis_change.outer_iter());
                for (di, row) in iter {
                    *di = row.iter().zip(cplx.iter())
                        .map(|(b, ck)| (*b * *ck).re)
                        .sum();
                }
            },
            _ => {
                let acc = &mut ws.real;
                acc.assign(d);
                let iter
                    = self.thetas.iter().zip(&self.c1).zip(&self.c2);
                for ((theta, c1), c2) in iter {
                    let (s, c) = (theta * e).sin_cos();
                    nd::linalg::general_mat_vec_mul(s, c1, d, 1.0, acc);
                    nd::linalg::general_mat_vec_mul(1.0 - c, c2, d, 1.0, acc);
                }
                d.assign(acc);
            },
        }
    }
}

/// Per-worker scratch vectors for in-place propagation.
#[derive(Clone, Debug)]
pub struct Workspace {
    real: nd::Array1<f64>,
    cplx: nd::Array1<C64>,
}

impl Workspace {
    pub fn new(dim: usize) -> Self {
        Self { real: nd::Array1::zeros(dim), cplx: nd::Array1::zeros(dim) }
    }
}

/// Precomputed quantities for a material with a quantum description.
#[derive(Clone, Debug)]
pub struct QuantumPropagator {
    /// `exp(M Δt / 2)`.
    pub free_half: nd::Array2<f64>,
    /// Affine offset of the free half step.
    pub free_offset: nd::Array1<f64>,
    /// `None` if the dipole operator vanishes.
    pub interaction: Option<InteractionPlanes>,
    /// `M^T v`, so that `v . d' = row . d + offset` at zero field.
    pub polarization_row: nd::Array1<f64>,
    /// `v . d_in`.
    pub polarization_offset: f64,
    /// Dipole vector `v` in C m.
    pub dipole: nd::Array1<f64>,
    pub d_init: nd::Array1<f64>,
    pub d_eq: nd::Array1<f64>,
}

impl QuantumPropagator {
    /// Exact free half step `d ← A_0 d + b_0`.
    pub fn free_step(&self, d: &mut nd::ArrayViewMut1<f64>, ws: &mut Workspace) {
        let acc = &mut ws.real;
        acc.assign(&self.free_offset);
        nd::linalg::general_mat_vec_mul(1.0, &self.free_half, d, 1.0, acc);
        d.assign(acc);
    }

    /// Advance `d` by one full time step at local field `e`.
    pub fn step(
        &self,
        e: f64,
        method: InteractionMethod,
        d: &mut nd::ArrayViewMut1<f64>,
        ws: &mut Workspace,
    ) {
        self.free_step(d, ws);
        if let Some(planes) = &self.interaction {
            planes.apply(e, method, d, ws);
        }
        self.free_step(d, ws);
    }

    /// Polarization current per carrier, `v . d'`, at zero field.
    pub fn polarization_rate(&self, d: &nd::ArrayView1<f64>) -> f64 {
        self.polarization_row.dot(d) + self.polarization_offset
    }
}

/// Immutable per-material constants used by the time-stepping loop.
#[derive(Clone, Debug)]
pub struct PropagatorSet {
    pub id: String,
    pub time_step: f64,
    pub d_x_inv: f64,
    /// `Δt / ε`.
    pub em_coupling_e: f64,
    /// `Δt / (μ Δx)`.
    pub em_coupling_h: f64,
    /// `N Γ_ov`.
    pub em_coupling_p: f64,
    pub conductivity: f64,
    /// `(1 - σΔt/2ε) / (1 + σΔt/2ε)`.
    pub loss_a: f64,
    /// `(Δt/ε) / (1 + σΔt/2ε)`.
    pub loss_b: f64,
    pub phase_velocity: f64,
    /// `None` for a pure dielectric.
    pub quantum: Option<QuantumPropagator>,
}

impl PropagatorSet {
    /// Precompute all constants for `material`.
    ///
    /// `basis` is the shared adjoint basis if any material carries a quantum
    /// description; with `None` (or [`InteractionMethod::Noop`]) the material
    /// is treated as a pure dielectric. `rho_init` overrides the material's
    /// own initial density matrix.
    pub fn new(
        material: &Material,
        basis: Option<&AdjointBasis>,
        rho_init: Option<&nd::Array2<C64>>,
        grid: &SimGrid,
        method: InteractionMethod,
    ) -> Result<Self, MaterialError>
    {
        material.validate()?;
        let d_t = grid.d_t;
        let eps = EPS0 * material.rel_permittivity;
        let mu = MU0 * material.rel_permeability;
        let em_coupling_e = d_t / eps;
        let em_coupling_h = d_t / (mu * grid.d_x);
        let conductivity = 2.0 * material.losses * (eps / mu).sqrt();
        let x = conductivity * d_t / (2.0 * eps);
        let loss_a = (1.0 - x) / (1.0 + x);
        let loss_b = em_coupling_e / (1.0 + x);
        let phase_velocity = 1.0 / (eps * mu).sqrt();

        let qm = material.qm.as_ref()
            .filter(|_| method != InteractionMethod::Noop);
        let (em_coupling_p, quantum)
            = match (qm, basis) {
                (Some(qm), Some(basis)) => {
                    let rho0 = rho_init.unwrap_or(&qm.rho_init);
                    MaterialError::check(
                        rho0.shape() == [basis.levels(), basis.levels()],
                        || {
                            format!(
                                "initial density matrix must be {0}x{0}",
                                basis.levels(),
                            )
                        },
                    )?;
                    check_density(rho0)?;
                    let q = Self::quantum(basis, qm, rho0, d_t)?;
                    (qm.carrier_density * material.overlap_factor, Some(q))
                },
                _ => (0.0, None),
            };
        match &quantum {
            Some(q) => {
                debug!(
                    material = material.id.as_str(),
                    adjoint_dim = q.d_init.len(),
                    thetas = ?q.interaction.as_ref().map(|p| p.thetas()),
                    "quantum material",
                );
            },
            None => {
                debug!(material = material.id.as_str(), "dielectric material");
            },
        }
        Ok(Self {
            id: material.id.clone(),
            time_step: d_t,
            d_x_inv: 1.0 / grid.d_x,
            em_coupling_e,
            em_coupling_h,
            em_coupling_p,
            conductivity,
            loss_a,
            loss_b,
            phase_velocity,
            quantum,
        })
    }

    fn quantum(
        basis: &AdjointBasis,
        qm: &crate::hilbert::QmDescription,
        rho0: &nd::Array2<C64>,
        d_t: f64,
    ) -> Result<QuantumPropagator, MaterialError>
    {
        let gens = BlochGenerators::new(basis, qm);
        let free = FreeEvolution::new(&gens.free)?;
        let free_half = free.propagator(d_t / 2.0);
        let free_offset = free.offset(d_t / 2.0, &gens.inhom);
        let d_eq = free.equilibrium(&gens.inhom);
        let has_dipole = gens.interaction.iter().any(|u| *u != 0.0);
        let interaction
            = if has_dipole {
                Some(InteractionPlanes::new(&gens.interaction, d_t)?)
            } else {
                None
            };
        let polarization_row = gens.free.t().dot(&gens.dipole);
        let polarization_offset = gens.dipole.dot(&gens.inhom);
        Ok(QuantumPropagator {
            free_half,
            free_offset,
            interaction,
            polarization_row,
            polarization_offset,
            dipole: gens.dipole,
            d_init: basis.to_bloch(rho0),
            d_eq,
        })
    }

    /// Return `true` if the material couples to a quantum system.
    pub fn has_quantum(&self) -> bool { self.quantum.is_some() }

    /// Coefficient `(v Δt - Δx) / (v Δt + Δx)` of Mur's first-order
    /// absorbing boundary condition.
    pub fn mur_coefficient(&self) -> f64 {
        let c = self.phase_velocity * self.time_step;
        let d_x = 1.0 / self.d_x_inv;
        (c - d_x) / (c + d_x)
    }

    /// Return `true` if the material's quantum system couples to the field.
    pub fn has_dipole(&self) -> bool {
        self.quantum.as_ref().is_some_and(|q| q.interaction.is_some())
    }
}
