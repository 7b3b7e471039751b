#![allow(dead_code, non_snake_case)]

//! Parallel finite-difference time-domain solver for the Maxwell-Bloch
//! equations of one-dimensional media with an arbitrary number of quantum
//! levels.
//!
//! The quantum state of every grid point is a generalized Bloch vector in the
//! adjoint representation of `SU(L)`, advanced by precomputed closed-form
//! propagators; fields live on a staggered Yee grid.

pub mod error;
pub mod consts;
pub mod hilbert;
pub mod liouville;
pub mod device;
pub mod source;
pub mod config;
pub mod scenario;
pub mod propagator;
pub mod grid;
pub mod record;
pub mod engine;
pub mod registry;

pub use config::{ BoundaryPolicy, InteractionMethod, SolverConfig };
pub use device::{ Device, Material, MaterialLibrary, Region };
pub use engine::{ FdtdSolver, Solver };
pub use error::{ MaterialError, SolverError };
pub use hilbert::QmDescription;
pub use record::{ HostScratch, ScratchStore, SimResult };
pub use registry::SolverRegistry;
pub use scenario::{ RecordSpec, Scenario, TimeGrid };
pub use source::{ GaussianPulse, SechPulse, SourceKind, SourceSpec, SourceTerm };
