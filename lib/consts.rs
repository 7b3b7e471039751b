//! Physical constants in SI units.

// vacuum permittivity [F / m]
pub const EPS0: f64 = 8.854187817620389e-12;

// vacuum permeability [H / m]
pub const MU0: f64 = 1.2566370614359173e-6;

// speed of light in vacuum [m / s]
pub const C0: f64 = 299792458.0;

// reduced Planck constant [J s]
pub const HBAR: f64 = 1.0545718176461565e-34;
