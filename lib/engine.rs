//! The time-stepping engine.
//!
//! Each step runs three data-parallel phases on a dedicated rayon pool, each
//! a fork-join over disjoint index ranges so that the join acts as the barrier
//! between phases:
//! 1. Bloch-vector and `E` update per grid point, reading `H` from the
//!    previous step; sources are applied once all `E` values are final.
//! 2. `H` update per interior point, reading the new `E`; boundary policy.
//! 3. Sampling of due records into disjoint scratch ranges.
//!
//! No phase reduces across grid points, so results do not depend on the
//! number of worker threads.

use ndarray as nd;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::info;
use crate::{
    config::{ BoundaryPolicy, InteractionMethod, SolverConfig },
    device::{ Device, MaterialLibrary },
    error::SolverError,
    grid::{ resolve_material_indices, GridState },
    hilbert::AdjointBasis,
    propagator::{ PropagatorSet, Workspace },
    record::{ materialize, HostScratch, RecordLayout, ScratchStore, SimResult },
    scenario::{ Scenario, SimGrid },
    source::SourceSpec,
};

/// Common interface of all solvers.
pub trait Solver {
    /// Descriptive solver name.
    fn name(&self) -> &str;

    /// Run the full simulation and write all records into `results`, which
    /// must match the solver's record layout.
    fn run(&mut self, results: &mut [SimResult]) -> Result<(), SolverError>;
}

/// Parallel Maxwell-Bloch FDTD solver for media with an arbitrary number of
/// quantum levels.
pub struct FdtdSolver<S = HostScratch>
where S: ScratchStore
{
    name: String,
    sim_grid: SimGrid,
    config: SolverConfig,
    levels: usize,
    sets: Vec<PropagatorSet>,
    grid: GridState,
    layout: RecordLayout,
    scratch: S,
    sources: Vec<SourceSpec>,
    pool: rayon::ThreadPool,
}

impl<S> std::fmt::Debug for FdtdSolver<S>
where S: ScratchStore
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdtdSolver")
            .field("name", &self.name)
            .field("sim_grid", &self.sim_grid)
            .field("config", &self.config)
            .field("levels", &self.levels)
            .finish_non_exhaustive()
    }
}

impl<S> FdtdSolver<S>
where S: ScratchStore
{
    /// Set up a solver for `scenario` on `device`.
    ///
    /// All materials, grid settings, records and sources are validated here;
    /// [`Solver::run`] can only fail on mismatched result storage.
    pub fn new(
        device: &Device,
        library: &MaterialLibrary,
        scenario: &Scenario,
        config: SolverConfig,
    ) -> Result<Self, SolverError>
    {
        config.validate()?;
        let materials = device.resolve_materials(library)?;
        for m in materials.iter() {
            m.validate()
                .map_err(|source| {
                    SolverError::Material { id: m.id.clone(), source }
                })?;
        }
        let sim_grid
            = SimGrid::resolve(device, &materials, scenario, config.courant)?;

        let mut levels: usize = 0;
        if config.interaction != InteractionMethod::Noop {
            for m in materials.iter() {
                let Some(got) = m.levels() else { continue; };
                if levels == 0 {
                    levels = got;
                } else if got != levels {
                    return Err(SolverError::LevelMismatch {
                        material: m.id.clone(),
                        expected: levels,
                        got,
                    });
                }
            }
        }
        let basis = (levels > 0).then(|| AdjointBasis::new(levels));
        let adjoint_dim = basis.as_ref().map(|b| b.dim()).unwrap_or(0);

        let sets: Vec<PropagatorSet>
            = materials.iter()
            .map(|m| {
                PropagatorSet::new(
                    m,
                    basis.as_ref(),
                    scenario.rho_init.as_ref(),
                    &sim_grid,
                    config.interaction,
                )
                .map_err(|source| {
                    SolverError::Material { id: m.id.clone(), source }
                })
            })
            .collect::<Result<_, _>>()?;
        let index_of: FxHashMap<&str, usize>
            = materials.iter().enumerate()
            .map(|(k, m)| (m.id.as_str(), k))
            .collect();
        let mat_indices
            = resolve_material_indices(device, &sim_grid, &index_of)?;

        for src in scenario.sources.iter() {
            SolverError::check_grid(
                src.position < sim_grid.num_gridpoints,
                || {
                    format!(
                        "source '{}' at index {} is outside the grid",
                        src.name, src.position,
                    )
                },
            )?;
        }

        let layout
            = RecordLayout::new(&scenario.records, &sim_grid, basis.as_ref())?;
        let mut grid = GridState::new(adjoint_dim, mat_indices)?;
        grid.reset(&sets);
        let scratch = S::allocate(layout.scratch_len())?;
        let pool
            = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads.unwrap_or(0))
            .build()?;
        let name
            = format!("rayon-fdtd-{}lvl-{}", levels, config.interaction.tag());

        info!(
            solver = name.as_str(),
            scenario = scenario.name.as_str(),
            gridpoints = sim_grid.num_gridpoints,
            timesteps = sim_grid.num_timesteps,
            time_step = sim_grid.d_t,
            threads = pool.current_num_threads(),
            materials = sets.len(),
            scratch_len = layout.scratch_len(),
            "constructed solver",
        );

        Ok(Self {
            name,
            sim_grid,
            config,
            levels,
            sets,
            grid,
            layout,
            scratch,
            sources: scenario.sources.clone(),
            pool,
        })
    }

    /// Run the simulation, allocating results from the record layout.
    pub fn run_collect(&mut self) -> Result<Vec<SimResult>, SolverError> {
        let mut results = self.layout.new_results();
        self.run(&mut results)?;
        Ok(results)
    }

    /// Current grid state.
    pub fn grid(&self) -> &GridState { &self.grid }

    /// Per-material propagators, in order of first use in the device.
    pub fn propagator_sets(&self) -> &[PropagatorSet] { &self.sets }

    pub fn sim_grid(&self) -> &SimGrid { &self.sim_grid }

    pub fn layout(&self) -> &RecordLayout { &self.layout }

    pub fn config(&self) -> &SolverConfig { &self.config }

    /// Number of quantum levels; zero if no cell carries a quantum system.
    pub fn levels(&self) -> usize { self.levels }

    /// Raw scratch buffer.
    pub fn scratch(&self) -> &[f64] { self.scratch.as_slice() }

    fn simulate(&mut self) {
        let Self {
            sim_grid, config, sets, grid, layout, scratch, sources, pool, ..
        } = self;
        let method = config.interaction;
        let boundary = config.boundary;
        let min_len = config.min_chunk_len;
        let scratch = scratch.as_mut_slice();
        pool.install(|| {
            for n in 0..sim_grid.num_timesteps {
                let t = n as f64 * sim_grid.d_t;
                update_e(grid, sets, method, min_len);
                for src in sources.iter() {
                    let value = src.term.value(t);
                    SourceSpec::apply(src.kind, &mut grid.e[src.position], value);
                }
                update_h(grid, sets, boundary, min_len);
                layout.record(n, grid, scratch, min_len);
            }
        });
    }
}

impl<S> Solver for FdtdSolver<S>
where S: ScratchStore
{
    fn name(&self) -> &str { &self.name }

    fn run(&mut self, results: &mut [SimResult]) -> Result<(), SolverError> {
        self.layout.check_results(results)?;
        self.grid.reset(&self.sets);
        self.scratch.as_mut_slice().iter_mut().for_each(|x| { *x = 0.0; });
        info!(
            solver = self.name.as_str(),
            timesteps = self.sim_grid.num_timesteps,
            "starting run",
        );
        self.simulate();
        materialize(&self.layout, self.scratch.as_slice(), results)?;
        info!(
            solver = self.name.as_str(),
            timesteps = self.sim_grid.num_timesteps,
            "finished run",
        );
        Ok(())
    }
}

/// Advance every Bloch vector by one step at its local field, then update
/// `E` from the curl of `H` and the polarization current.
fn update_e(
    grid: &mut GridState,
    sets: &[PropagatorSet],
    method: InteractionMethod,
    min_len: usize,
) {
    let adjoint_dim = grid.adjoint_dim();
    let GridState { bloch, e, h, mat_indices } = grid;
    let h: &[f64] = h;
    bloch.axis_iter_mut(nd::Axis(0)).into_par_iter()
        .zip(e.par_iter_mut())
        .zip(mat_indices.par_iter())
        .enumerate()
        .with_min_len(min_len)
        .for_each_init(
            || Workspace::new(adjoint_dim),
            |ws, (i, ((mut d, e), &m))| {
                let set = &sets[m];
                let p_t
                    = match &set.quantum {
                        Some(q) => {
                            q.step(*e, method, &mut d, ws);
                            set.em_coupling_p * q.polarization_rate(&d.view())
                        },
                        None => 0.0,
                    };
                let curl = (h[i + 1] - h[i]) * set.d_x_inv;
                *e = set.loss_a * *e + set.loss_b * (curl - p_t);
            },
        );
}

/// Update interior `H` from the new `E`, then apply the boundary policy.
fn update_h(
    grid: &mut GridState,
    sets: &[PropagatorSet],
    boundary: BoundaryPolicy,
    min_len: usize,
) {
    let n = grid.len();
    let GridState { e, h, mat_indices, .. } = grid;
    let e: &[f64] = e;
    let mat_indices: &[usize] = mat_indices;
    let h1_old = h[1];
    let hn1_old = h[n - 1];
    h[1..n].par_iter_mut()
        .enumerate()
        .with_min_len(min_len)
        .for_each(|(k, hk)| {
            let i = k + 1;
            *hk += sets[mat_indices[i - 1]].em_coupling_h * (e[i] - e[i - 1]);
        });
    match boundary {
        BoundaryPolicy::MagneticWall => {
            h[0] = 0.0;
            h[n] = 0.0;
        },
        BoundaryPolicy::Absorbing => {
            let k_left = sets[mat_indices[0]].mur_coefficient();
            let k_right = sets[mat_indices[n - 1]].mur_coefficient();
            h[0] = h1_old + k_left * (h[1] - h[0]);
            h[n] = hn1_old + k_right * (h[n - 1] - h[n]);
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        device::{ Material, Region },
        hilbert::QmDescription,
        scenario::{ RecordSpec, TimeGrid },
        source::{ GaussianPulse, SechPulse, SourceKind },
    };

    fn two_level() -> QmDescription {
        QmDescription::two_level(
            2.0 * std::f64::consts::PI * 2e14, 1e-29, 1e24, 1e10, 1e10)
    }

    fn setup() -> (Device, MaterialLibrary, Scenario) {
        let device = Device::new(
            "sandwich",
            vec![
                Region::new("left", "vacuum", 0.0, 20e-6),
                Region::new("active", "medium", 20e-6, 40e-6),
                Region::new("right", "vacuum", 40e-6, 60e-6),
            ],
        );
        let library: MaterialLibrary
            = [
                Material::new("vacuum"),
                Material::new("medium").with_qm(two_level()),
            ]
            .into_iter()
            .collect();
        let scenario
            = Scenario::new(
                "pulse", 100, TimeGrid::Fixed { time_step: 1e-15, num_steps: 20 })
            .record(RecordSpec::new("e"))
            .record(RecordSpec::new("d12").window(40, 10))
            .source(SourceSpec::new("sech", SechPulse::new(4.2186e9, 2e14)));
        (device, library, scenario)
    }

    #[test]
    fn construction() {
        let (device, library, scenario) = setup();
        let solver: FdtdSolver
            = FdtdSolver::new(&device, &library, &scenario, SolverConfig::default())
            .unwrap();
        assert_eq!(solver.name(), "rayon-fdtd-2lvl-rodr");
        assert_eq!(solver.levels(), 2);
        assert_eq!(solver.propagator_sets().len(), 2);
        assert_eq!(solver.grid().bloch.dim(), (100, 3));
        assert_eq!(solver.scratch().len(), 20 * 100 + 2 * 20 * 10);
        // quantum cells start in the ground state, dielectric cells at zero
        assert_eq!(solver.grid().bloch[[50, 2]], 1.0);
        assert_eq!(solver.grid().bloch[[10, 2]], 0.0);

        let noop = SolverConfig::default()
            .with_interaction(InteractionMethod::Noop);
        assert!(matches!(
            FdtdSolver::<HostScratch>::new(&device, &library, &scenario, noop.clone()),
            Err(SolverError::UnknownObservable(name)) if name == "d12",
        ));
        let fields_only = Scenario { records: vec![RecordSpec::new("h")], ..scenario };
        let solver: FdtdSolver
            = FdtdSolver::new(&device, &library, &fields_only, noop).unwrap();
        assert_eq!(solver.name(), "rayon-fdtd-0lvl-noop");
    }

    #[test]
    fn construction_errors() {
        let (device, mut library, scenario) = setup();
        let bad_source = scenario.clone()
            .source(SourceSpec::new("far", |_t: f64| 1.0).at(100));
        assert!(matches!(
            FdtdSolver::<HostScratch>::new(
                &device, &library, &bad_source, SolverConfig::default()),
            Err(SolverError::InvalidGrid(_)),
        ));

        let three = QmDescription::new(
            nd::Array2::zeros((3, 3)), nd::Array2::zeros((3, 3)), 1e24);
        library.add(Material::new("vacuum").with_qm(three));
        assert!(matches!(
            FdtdSolver::<HostScratch>::new(
                &device, &library, &scenario, SolverConfig::default()),
            Err(SolverError::LevelMismatch { expected: 3, got: 2, .. }),
        ));

        library.add(Material::new("vacuum").with_permittivity(-2.0));
        assert!(matches!(
            FdtdSolver::<HostScratch>::new(
                &device, &library, &scenario, SolverConfig::default()),
            Err(SolverError::Material { id, .. }) if id == "vacuum",
        ));
    }

    #[test]
    fn repeated_runs_agree() {
        let (device, library, scenario) = setup();
        let mut solver: FdtdSolver
            = FdtdSolver::new(&device, &library, &scenario, SolverConfig::default())
            .unwrap();
        let first = solver.run_collect().unwrap();
        let second = solver.run_collect().unwrap();
        assert_eq!(first, second);
        assert!(first[0].real.iter().any(|e| *e != 0.0));

        let mut wrong = first.clone();
        wrong.swap(0, 1);
        assert!(matches!(
            solver.run(&mut wrong),
            Err(SolverError::ResultShape { .. }),
        ));
    }

    #[test]
    fn absorbing_boundary_is_quieter() {
        let device = Device::new(
            "vacuum", vec![Region::new("all", "vacuum", 0.0, 20e-6)]);
        let library: MaterialLibrary
            = [Material::new("vacuum")].into_iter().collect();
        let scenario
            = Scenario::new(
                "reflect", 101, TimeGrid::Fixed { time_step: 0.5e-15, num_steps: 1200 })
            .record(RecordSpec::new("e").window(50, 1))
            .source(
                SourceSpec::new("gauss", GaussianPulse {
                    amplitude: 1.0,
                    frequency: 1e14,
                    center: 30e-15,
                    width: 8e-15,
                })
                .at(50)
                .with_kind(SourceKind::Soft)
            );
        let run = |boundary: BoundaryPolicy| -> f64 {
            let config = SolverConfig::default().with_boundary(boundary);
            let mut solver: FdtdSolver
                = FdtdSolver::new(&device, &library, &scenario, config).unwrap();
            let results = solver.run_collect().unwrap();
            // late-time field at the source point after the pulse has left
            results[0].real.column(0).iter().skip(800)
                .map(|e| e.abs()).fold(0.0, f64::max)
        };
        let wall = run(BoundaryPolicy::MagneticWall);
        let mur = run(BoundaryPolicy::Absorbing);
        assert!(mur < wall);
    }
}
