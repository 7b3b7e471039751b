mod common;

use approx::assert_relative_eq;
use common::*;
use multilevel_fdtd::{ consts::{ EPS0, MU0 }, * };

/// Plain serial leapfrog FDTD with hard sources and magnetic walls.
fn reference(solver: &FdtdSolver, source: &SechPulse, num_steps: usize)
    -> Vec<Vec<f64>>
{
    let sets = solver.propagator_sets();
    let mat = &solver.grid().mat_indices;
    let n_x = mat.len();
    let d_t = solver.sim_grid().d_t;
    let mut e = vec![0.0; n_x];
    let mut h = vec![0.0; n_x + 1];
    let mut rows = Vec::with_capacity(num_steps);
    for n in 0..num_steps {
        for i in 0..n_x {
            let s = &sets[mat[i]];
            e[i] = s.loss_a * e[i]
                + s.loss_b * ((h[i + 1] - h[i]) * s.d_x_inv - 0.0);
        }
        e[0] = source.value(n as f64 * d_t);
        for i in 1..n_x {
            h[i] += sets[mat[i - 1]].em_coupling_h * (e[i] - e[i - 1]);
        }
        h[0] = 0.0;
        h[n_x] = 0.0;
        rows.push(e.clone());
    }
    rows
}

#[test]
fn matches_reference_fdtd() {
    let device = Device::new(
        "dielectric",
        vec![
            Region::new("left", "vacuum", 0.0, 30e-6),
            Region::new("right", "glass", 30e-6, 60e-6),
        ],
    );
    let library = library(1e24);
    let scenario = pulse_scenario(250).record(RecordSpec::new("e"));
    let mut solver: FdtdSolver
        = FdtdSolver::new(&device, &library, &scenario, SolverConfig::default())
        .unwrap();
    assert_eq!(solver.levels(), 0);
    let results = solver.run_collect().unwrap();
    let expected
        = reference(&solver, &SechPulse::new(PULSE_AMPLITUDE, 2e14), 250);
    for (row, exp) in results[0].real.outer_iter().zip(expected.iter()) {
        assert_eq!(row.to_vec(), *exp);
    }
    assert!(max_abs(results[0].real.iter()) > 0.0);
}

#[test]
fn noop_ignores_quantum_media() {
    let library = library(1e24);
    let scenario = pulse_scenario(120).record(RecordSpec::new("e"));
    let noop = SolverConfig::default().with_interaction(InteractionMethod::Noop);
    let mut solver: FdtdSolver
        = FdtdSolver::new(&layered(), &library, &scenario, noop).unwrap();
    assert_eq!(solver.name(), "rayon-fdtd-0lvl-noop");
    assert!(solver.propagator_sets().iter().all(|s| !s.has_quantum()));
    let results = solver.run_collect().unwrap();
    let expected
        = reference(&solver, &SechPulse::new(PULSE_AMPLITUDE, 2e14), 120);
    for (row, exp) in results[0].real.outer_iter().zip(expected.iter()) {
        assert_eq!(row.to_vec(), *exp);
    }
}

#[test]
fn electromagnetic_constants() {
    let library = library(1e24);
    let scenario = pulse_scenario(1);
    let solver: FdtdSolver
        = FdtdSolver::new(&layered(), &library, &scenario, SolverConfig::default())
        .unwrap();
    let d_t = 1e-15;
    let d_x = 60e-6 / 99.0;
    for set in solver.propagator_sets() {
        assert_relative_eq!(set.em_coupling_h, d_t / (MU0 * d_x), max_relative = 1e-12);
        match set.id.as_str() {
            "vacuum" => {
                assert_eq!(set.loss_a, 1.0);
                assert_eq!(set.loss_b, d_t / EPS0);
                assert_eq!(set.em_coupling_p, 0.0);
            },
            "glass" => {
                let eps = 2.25 * EPS0;
                let sigma = 2.0 * 50.0 * (eps / MU0).sqrt();
                let x = sigma * d_t / (2.0 * eps);
                assert_relative_eq!(set.conductivity, sigma, max_relative = 1e-12);
                assert_relative_eq!(set.loss_a, (1.0 - x) / (1.0 + x), max_relative = 1e-12);
                assert_relative_eq!(set.loss_b, d_t / eps / (1.0 + x), max_relative = 1e-12);
            },
            "medium" => {
                assert!(set.has_dipole());
                assert_eq!(set.em_coupling_p, 1e24);
            },
            other => panic!("unexpected material {}", other),
        }
    }
}
