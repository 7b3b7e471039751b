//! Right-hand sides of the Liouville-von Neumann and Lindblad equations and
//! their generators in the adjoint representation.
//!
//! All Hamiltonians and decay rates should be in units of angular frequency.

use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    consts::HBAR,
    hilbert::{ AdjointBasis, QmDescription },
};

/// Compute the commutator `[A, B] = A B - B A`.
pub fn commutator<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.dot(B) - B.dot(A)
}

/// Compute the non-Hermitian part of the RHS of the Lindblad master equation.
///
/// Assumes that `Y` and `rho` are both square, and that the system's decay
/// rates can be characterized by a single matrix `Y`, whose `(i, j)`-th element
/// is the total decay rate from the `i`-th state to the `j`-th state.
pub fn lindbladian<SA, SB>(
    Y: &nd::ArrayBase<SA, nd::Ix2>,
    rho: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = f64>,
    SB: nd::Data<Elem = C64>,
{
    let mut L: nd::Array2<C64> = nd::Array2::zeros(Y.raw_dim());
    let z = C64::zero();
    let mut term: C64;
    for ((a, b), &y) in Y.indexed_iter() {
        if y.abs() <= f64::EPSILON { continue; }
        for ((i, j), l) in L.indexed_iter_mut() {
            term
                = if i == j {
                    y * (
                        if i == b { rho[[a, a]] } else { z }
                        - if i == a { rho[[a, a]] } else { z }
                    )
                } else {
                    -y * if i == a || j == a
                        { rho[[i, j]] / 2.0 } else { z }
                };
            *l += term;
        }
    }
    L
}

/// Compute the pure-dephasing contribution `-G_ij ρ_ij` (`i != j`) to the RHS
/// of the master equation.
pub fn dephasing<SA, SB>(
    G: &nd::ArrayBase<SA, nd::Ix2>,
    rho: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = f64>,
    SB: nd::Data<Elem = C64>,
{
    nd::Array2::from_shape_fn(rho.raw_dim(), |(i, j)| {
        if i == j { C64::zero() } else { -G[[i, j]] * rho[[i, j]] }
    })
}

/// Generators of the Bloch equations in the adjoint representation.
///
/// The equation of motion of the Bloch vector `d` under a scalar field `E` is
/// ```text
/// d' = (M + E U) d + d_in
/// ```
/// and the macroscopic polarization per carrier is `v . d` (up to a
/// constant).
#[derive(Clone, Debug)]
pub struct BlochGenerators {
    /// Free-evolution generator `M` (coherent part plus relaxation).
    pub free: nd::Array2<f64>,
    /// Inhomogeneous term `d_in`.
    pub inhom: nd::Array1<f64>,
    /// Interaction generator `U` per unit field, in (V / m)^-1 s^-1.
    pub interaction: nd::Array2<f64>,
    /// Dipole vector `v`, with `v_j = tr(μ λ_j) / 2`.
    pub dipole: nd::Array1<f64>,
}

impl BlochGenerators {
    /// Compute all generators for a quantum description.
    pub fn new(basis: &AdjointBasis, qm: &QmDescription) -> Self {
        let H = &qm.hamiltonian;
        let Y = &qm.scattering;
        let G = &qm.dephasing;
        let (free, inhom)
            = basis.superop_to_adjoint(|rho| {
                -C64::i() * commutator(H, rho)
                    + lindbladian(Y, rho)
                    + dephasing(G, rho)
            });
        let u = qm.dipole.mapv(|x| x / HBAR);
        let (interaction, _)
            = basis.superop_to_adjoint(|rho| C64::i() * commutator(&u, rho));
        let dipole: nd::Array1<f64>
            = basis.generators().iter()
            .map(|g| 0.5 * crate::hilbert::trace_prod(&qm.dipole, g).re)
            .collect();
        Self { free, inhom, interaction, dipole }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn qm() -> QmDescription {
        QmDescription::two_level(1.2e15, 1e-29, 1e24, 1e10, 2e10)
    }

    #[test]
    fn lindbladian_is_trace_preserving() {
        let Y = nd::array![
            [0.0, 1.0, 0.5],
            [2.0, 0.0, 0.0],
            [3.0, 0.25, 0.0],
        ];
        let rho: nd::Array2<C64> = nd::Array2::from_diag(
            &nd::array![C64::from(0.2), C64::from(0.3), C64::from(0.5)]);
        let L = lindbladian(&Y, &rho);
        assert_abs_diff_eq!(L.diag().sum().norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn interaction_generator_is_antisymmetric() {
        let basis = AdjointBasis::new(2);
        let gens = BlochGenerators::new(&basis, &qm());
        let U = &gens.interaction;
        let scale = U.iter().map(|u| u.abs()).fold(0.0, f64::max);
        assert!(scale > 0.0);
        for ((i, j), u) in U.indexed_iter() {
            assert_abs_diff_eq!(*u, -U[[j, i]], epsilon = 1e-12 * scale);
        }
        // polarization couples only to the symmetric coherence
        assert_abs_diff_eq!(gens.dipole[0], 1e-29, epsilon = 1e-40);
        assert_abs_diff_eq!(gens.dipole[1], 0.0, epsilon = 1e-40);
        assert_abs_diff_eq!(gens.dipole[2], 0.0, epsilon = 1e-40);
    }

    #[test]
    fn two_level_relaxation() {
        let basis = AdjointBasis::new(2);
        let gens = BlochGenerators::new(&basis, &qm());
        // population difference relaxes toward the lower level
        assert_abs_diff_eq!(gens.free[[2, 2]], -1e10, epsilon = 1e-3);
        assert_abs_diff_eq!(gens.inhom[2], 1e10, epsilon = 1e-3);
        // coherences dephase at half the decay rate plus pure dephasing
        assert_abs_diff_eq!(gens.free[[0, 0]], -2.5e10, epsilon = 1e-3);
        assert_abs_diff_eq!(gens.free[[0, 1]].abs(), 1.2e15, epsilon = 1.0);
    }
}
