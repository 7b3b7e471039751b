#![allow(dead_code)]

use std::f64::consts::TAU;
use multilevel_fdtd::*;
use num_complex::Complex64 as C64;

pub const PULSE_AMPLITUDE: f64 = 4.2186e9;

/// Two-level medium resonant with a 200 THz carrier.
pub fn two_level(carrier_density: f64) -> QmDescription {
    QmDescription::two_level(TAU * 2e14, 1e-29, carrier_density, 1e10, 1e10)
}

/// 0 -> 1 -> 2 ladder driven near its lower transition by a 200 THz carrier,
/// with cascade decay and pure dephasing.
pub fn three_level(carrier_density: f64) -> QmDescription {
    let H: ndarray::Array2<C64> = ndarray::Array2::from_diag(&ndarray::array![
        C64::from(0.0), C64::from(TAU * 2e14), C64::from(TAU * 3.9e14)]);
    let zero = C64::from(0.0);
    let u: ndarray::Array2<C64> = ndarray::array![
        [zero, C64::from(1e-29), zero],
        [C64::from(1e-29), zero, C64::from(0.7e-29)],
        [zero, C64::from(0.7e-29), zero],
    ];
    QmDescription::new(H, u, carrier_density)
        .with_scattering(ndarray::array![
            [0.0, 0.0, 0.0],
            [1e10, 0.0, 0.0],
            [5e9, 2e10, 0.0],
        ])
        .with_dephasing(ndarray::array![
            [0.0, 1e10, 2e10],
            [1e10, 0.0, 3e10],
            [2e10, 3e10, 0.0],
        ])
}

pub fn ladder_library(carrier_density: f64) -> MaterialLibrary {
    [
        Material::new("vacuum"),
        Material::new("ladder").with_qm(three_level(carrier_density)),
    ]
    .into_iter()
    .collect()
}

pub fn library(carrier_density: f64) -> MaterialLibrary {
    [
        Material::new("vacuum"),
        Material::new("glass").with_permittivity(2.25).with_losses(50.0),
        Material::new("medium").with_qm(two_level(carrier_density)),
    ]
    .into_iter()
    .collect()
}

/// 60 um device filled with `material`.
pub fn uniform(material: &str) -> Device {
    Device::new("uniform", vec![Region::new("all", material, 0.0, 60e-6)])
}

/// vacuum | medium | glass
pub fn layered() -> Device {
    Device::new(
        "layered",
        vec![
            Region::new("buffer", "vacuum", 0.0, 15e-6),
            Region::new("active", "medium", 15e-6, 45e-6),
            Region::new("cladding", "glass", 45e-6, 60e-6),
        ],
    )
}

/// 100 grid points, 1 fs steps, sech pulse hard source at index 0.
pub fn pulse_scenario(num_steps: usize) -> Scenario {
    Scenario::new(
        "sech",
        100,
        TimeGrid::Fixed { time_step: 1e-15, num_steps },
    )
    .source(SourceSpec::new("pulse", SechPulse::new(PULSE_AMPLITUDE, 2e14)))
}

pub fn max_abs<'a, I>(values: I) -> f64
where I: IntoIterator<Item = &'a f64>
{
    values.into_iter().map(|x| x.abs()).fold(0.0, f64::max)
}
