//! Named solver constructors.

use indexmap::IndexMap;
use crate::{
    config::{ InteractionMethod, SolverConfig },
    device::{ Device, MaterialLibrary },
    engine::{ FdtdSolver, Solver },
    error::SolverError,
    scenario::Scenario,
};

/// Signature of a solver constructor.
pub type SolverCtor
    = fn(&Device, &MaterialLibrary, &Scenario, SolverConfig)
        -> Result<Box<dyn Solver>, SolverError>;

/// Maps solver names to constructors.
#[derive(Clone, Default)]
pub struct SolverRegistry {
    ctors: IndexMap<String, SolverCtor>,
}

impl std::fmt::Debug for SolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.ctors.keys()).finish()
    }
}

fn fdtd_with(
    method: InteractionMethod,
    device: &Device,
    library: &MaterialLibrary,
    scenario: &Scenario,
    config: SolverConfig,
) -> Result<Box<dyn Solver>, SolverError>
{
    let config = config.with_interaction(method);
    let solver: FdtdSolver = FdtdSolver::new(device, library, scenario, config)?;
    Ok(Box::new(solver))
}

impl SolverRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self { Self::default() }

    /// Create a registry holding the FDTD solvers `fdtd-rodr`, `fdtd-diag`,
    /// and `fdtd-noop`. Each overrides the interaction method of the config it
    /// is given.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("fdtd-rodr", |d, l, s, c| {
            fdtd_with(InteractionMethod::Rodrigues, d, l, s, c)
        });
        registry.register("fdtd-diag", |d, l, s, c| {
            fdtd_with(InteractionMethod::Diagonal, d, l, s, c)
        });
        registry.register("fdtd-noop", |d, l, s, c| {
            fdtd_with(InteractionMethod::Noop, d, l, s, c)
        });
        registry
    }

    /// Register a constructor, replacing any previous one of the same name.
    pub fn register(&mut self, name: impl Into<String>, ctor: SolverCtor) {
        self.ctors.insert(name.into(), ctor);
    }

    /// Names of all registered solvers, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.ctors.keys().map(|k| k.as_str())
    }

    /// Construct the solver registered under `name`.
    pub fn create(
        &self,
        name: &str,
        device: &Device,
        library: &MaterialLibrary,
        scenario: &Scenario,
        config: SolverConfig,
    ) -> Result<Box<dyn Solver>, SolverError>
    {
        let ctor = self.ctors.get(name)
            .ok_or_else(|| SolverError::UnknownSolver(name.to_string()))?;
        ctor(device, library, scenario, config)
    }
}
