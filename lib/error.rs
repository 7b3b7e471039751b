//! Collection of all error types.
//!
//! All errors derive [`thiserror::Error`], making them composable with each
//! other and with application code using `anyhow`.

use ndarray_linalg::error::LinalgError;
use thiserror::Error;

/// Returned when per-material propagators cannot be constructed.
#[derive(Debug, Error)]
pub enum MaterialError {
    /// Returned for physically inconsistent parameters (negative rates,
    /// non-Hermitian operators, bad initial state, ...).
    #[error("invalid material parameters: {0}")]
    InvalidMaterialParameters(String),

    /// Returned when the spectrum of the interaction generator does not split
    /// into `±iθ` pairs.
    #[error("interaction generator spectrum does not split into conjugate pairs")]
    UnpairedSpectrum,

    /// Returned when the eigen decomposition of the free-evolution generator
    /// does not reproduce the generator.
    #[error("free-evolution generator is not diagonalizable (reconstruction error {0:e})")]
    NotDiagonalizable(f64),

    /// [`LinalgError`].
    #[error("linalg error: {0}")]
    Linalg(#[from] LinalgError),
}

impl MaterialError {
    pub(crate) fn check<F>(cond: bool, msg: F) -> Result<(), Self>
    where F: FnOnce() -> String
    {
        cond.then_some(())
            .ok_or_else(|| Self::InvalidMaterialParameters(msg()))
    }
}

/// Returned from solver construction and [`run`][crate::engine::Solver::run].
#[derive(Debug, Error)]
pub enum SolverError {
    /// The device holds no regions.
    #[error("no regions in device")]
    NoRegions,

    /// A grid point is not covered by any region.
    #[error("grid index {index} at x = {x:e} m is not covered by any region")]
    RegionNotFound { index: usize, x: f64 },

    /// A region names a material that is not in the library.
    #[error("material '{0}' not found in library")]
    UnknownMaterial(String),

    /// A requested record names an observable outside the recognized set.
    #[error("requested result '{0}' is not available")]
    UnknownObservable(String),

    /// A requested record window does not fit the grid.
    #[error("record '{name}' window [{position}, {position} + {count}) exceeds {limit} points")]
    RecordOutOfRange {
        name: String,
        position: usize,
        count: usize,
        limit: usize,
    },

    /// Grid, time-grid, sampling or source settings are unusable.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Materials with quantum descriptions disagree on the number of levels.
    #[error("material '{material}' has {got} levels; expected {expected}")]
    LevelMismatch { material: String, expected: usize, got: usize },

    /// Propagator construction for a material failed.
    #[error("material '{id}': {source}")]
    Material {
        id: String,
        #[source]
        source: MaterialError,
    },

    /// A grid array or the scratch buffer could not be allocated.
    #[error("failed to allocate {size} elements for {what}")]
    Allocation { what: &'static str, size: usize },

    /// Caller-supplied result storage does not match the record layout.
    #[error("result storage for '{name}' does not match the record layout")]
    ResultShape { name: String },

    /// [`rayon::ThreadPoolBuildError`].
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Registry lookup failed.
    #[error("no solver registered under '{0}'")]
    UnknownSolver(String),

    /// [`toml::de::Error`].
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// [`std::io::Error`].
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SolverError {
    pub(crate) fn check_grid<F>(cond: bool, msg: F) -> Result<(), Self>
    where F: FnOnce() -> String
    {
        cond.then_some(()).ok_or_else(|| Self::InvalidGrid(msg()))
    }
}
