//! Solver tuning parameters, loadable from TOML.
//!
//! ```toml
//! num_threads = 4
//! interaction = "rodrigues"
//! boundary = "absorbing"
//! min_chunk_len = 128
//! courant = 0.5
//! ```

use std::path::Path;
use serde::Deserialize;
use crate::error::SolverError;

/// How the field-dependent interaction propagator is synthesized.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMethod {
    /// Sum of elementary plane rotations (Rodrigues' formula).
    #[default]
    Rodrigues,
    /// Diagonal phase multiply in the eigenbasis of the interaction
    /// generator.
    Diagonal,
    /// Ignore all quantum descriptions; pure FDTD.
    Noop,
}

impl InteractionMethod {
    /// Short tag used in solver names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Rodrigues => "rodr",
            Self::Diagonal => "diag",
            Self::Noop => "noop",
        }
    }
}

/// Treatment of the magnetic field at both ends of the grid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// `H = 0` at both ends (perfect magnetic conductor).
    #[default]
    MagneticWall,
    /// First-order Mur absorbing boundary.
    Absorbing,
}

/// Tuning parameters for [`FdtdSolver`][crate::engine::FdtdSolver].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Number of worker threads; `None` uses rayon's default.
    pub num_threads: Option<usize>,
    pub interaction: InteractionMethod,
    pub boundary: BoundaryPolicy,
    /// Minimum number of grid points handled by a single parallel task.
    pub min_chunk_len: usize,
    /// Courant number used when the time step is derived from the grid.
    pub courant: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            interaction: InteractionMethod::default(),
            boundary: BoundaryPolicy::default(),
            min_chunk_len: 64,
            courant: 0.5,
        }
    }
}

impl SolverConfig {
    /// Parse a config from a TOML string. Missing keys take their default
    /// values.
    pub fn from_toml_str(s: &str) -> Result<Self, SolverError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SolverError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Set the number of worker threads.
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set the interaction propagator method.
    pub fn with_interaction(mut self, interaction: InteractionMethod) -> Self {
        self.interaction = interaction;
        self
    }

    /// Set the boundary policy.
    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = boundary;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SolverError> {
        SolverError::check_grid(
            self.courant > 0.0 && self.courant <= 1.0,
            || format!("courant number must lie in (0, 1]; got {}", self.courant),
        )?;
        SolverError::check_grid(self.min_chunk_len > 0, || {
            "minimum chunk length must be positive".into()
        })?;
        SolverError::check_grid(
            self.num_threads != Some(0),
            || "number of threads must be positive".into(),
        )
    }
}
