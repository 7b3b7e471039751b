//! Simulation scenarios: spatial/temporal discretization, requested records,
//! and sources.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    consts::C0,
    device::{ Device, Material },
    error::SolverError,
    source::SourceSpec,
};

/// Description of the time axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TimeGrid {
    /// Explicit time step (in s) and number of steps.
    Fixed { time_step: f64, num_steps: usize },
    /// Time step derived from the grid spacing and the Courant number,
    /// readjusted so that the last step lands on `end_time` (in s).
    Courant { end_time: f64 },
}

/// A requested observable.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordSpec {
    /// Observable name; see [`Observable`][crate::record::Observable].
    pub name: String,
    /// First grid index of the spatial window.
    pub position: usize,
    /// Number of grid points in the window; `None` extends to the end of the
    /// grid.
    pub count: Option<usize>,
    /// Sampling interval in s; `None` samples every step.
    pub interval: Option<f64>,
}

impl RecordSpec {
    /// Record `name` over the whole grid at every step.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), position: 0, count: None, interval: None }
    }

    /// Restrict the spatial window.
    pub fn window(mut self, position: usize, count: usize) -> Self {
        self.position = position;
        self.count = Some(count);
        self
    }

    /// Set the sampling interval.
    pub fn every(mut self, interval: f64) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// A complete simulation scenario.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    pub num_gridpoints: usize,
    pub time_grid: TimeGrid,
    pub records: Vec<RecordSpec>,
    pub sources: Vec<SourceSpec>,
    /// Initial density matrix applied to every quantum material, overriding
    /// the materials' own.
    pub rho_init: Option<nd::Array2<C64>>,
}

impl Scenario {
    /// Create a new scenario without records or sources.
    pub fn new(
        name: impl Into<String>,
        num_gridpoints: usize,
        time_grid: TimeGrid,
    ) -> Self
    {
        Self {
            name: name.into(),
            num_gridpoints,
            time_grid,
            records: Vec::new(),
            sources: Vec::new(),
            rho_init: None,
        }
    }

    /// Add a record.
    pub fn record(mut self, record: RecordSpec) -> Self {
        self.records.push(record);
        self
    }

    /// Add a source.
    pub fn source(mut self, source: SourceSpec) -> Self {
        self.sources.push(source);
        self
    }

    /// Override the initial density matrix.
    pub fn with_rho_init(mut self, rho_init: nd::Array2<C64>) -> Self {
        self.rho_init = Some(rho_init);
        self
    }
}

/// Resolved discretization of a [`Scenario`] on a [`Device`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimGrid {
    pub num_gridpoints: usize,
    pub num_timesteps: usize,
    /// Grid spacing in m.
    pub d_x: f64,
    /// Time step in s.
    pub d_t: f64,
}

impl SimGrid {
    /// Resolve grid spacing, time step, and number of steps.
    ///
    /// `materials` are the materials used by `device`; the smallest relative
    /// permittivity among them sets the fastest phase velocity.
    pub fn resolve(
        device: &Device,
        materials: &[&Material],
        scenario: &Scenario,
        courant: f64,
    ) -> Result<Self, SolverError>
    {
        let n_x = scenario.num_gridpoints;
        SolverError::check_grid(n_x >= 2, || {
            format!("at least 2 grid points are required; got {}", n_x)
        })?;
        let length = device.length();
        SolverError::check_grid(length.is_finite() && length > 0.0, || {
            format!("device length must be positive; got {}", length)
        })?;
        let d_x = length / (n_x - 1) as f64;
        let eps_min
            = materials.iter()
            .map(|m| m.rel_permittivity * m.rel_permeability)
            .fold(f64::INFINITY, f64::min);
        let velocity = C0 / eps_min.sqrt();
        match scenario.time_grid {
            TimeGrid::Fixed { time_step, num_steps } => {
                SolverError::check_grid(
                    time_step.is_finite() && time_step > 0.0,
                    || format!("time step must be positive; got {}", time_step),
                )?;
                let c = velocity * time_step / d_x;
                SolverError::check_grid(c <= 1.0, || {
                    format!("courant number {} exceeds 1", c)
                })?;
                Ok(Self {
                    num_gridpoints: n_x,
                    num_timesteps: num_steps,
                    d_x,
                    d_t: time_step,
                })
            },
            TimeGrid::Courant { end_time } => {
                SolverError::check_grid(
                    end_time.is_finite() && end_time > 0.0,
                    || format!("end time must be positive; got {}", end_time),
                )?;
                let d_t = courant * d_x / velocity;
                let n_t = (end_time / d_t).ceil() as usize + 1;
                Ok(Self {
                    num_gridpoints: n_x,
                    num_timesteps: n_t,
                    d_x,
                    d_t: end_time / (n_t - 1) as f64,
                })
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use crate::device::Region;

    fn device() -> Device {
        Device::new("slab", vec![Region::new("all", "glass", 0.0, 99e-6)])
    }

    #[test]
    fn courant_time_grid() {
        let glass = Material::new("glass").with_permittivity(4.0);
        let scenario
            = Scenario::new("s", 100, TimeGrid::Courant { end_time: 1e-12 });
        let grid = SimGrid::resolve(&device(), &[&glass], &scenario, 0.5)
            .unwrap();
        assert_relative_eq!(grid.d_x, 1e-6, max_relative = 1e-12);
        let d_t0 = 0.5 * 1e-6 / (C0 / 2.0);
        assert_eq!(grid.num_timesteps, (1e-12 / d_t0).ceil() as usize + 1);
        assert_relative_eq!(
            grid.d_t * (grid.num_timesteps - 1) as f64, 1e-12,
            max_relative = 1e-12,
        );
        assert!(grid.d_t <= d_t0);
    }

    #[test]
    fn fixed_time_grid_checks_stability() {
        let vacuum = Material::new("glass");
        let ok = Scenario::new(
            "s", 100, TimeGrid::Fixed { time_step: 1e-15, num_steps: 10 });
        assert!(SimGrid::resolve(&device(), &[&vacuum], &ok, 0.5).is_ok());
        let unstable = Scenario::new(
            "s", 100, TimeGrid::Fixed { time_step: 1e-14, num_steps: 10 });
        assert!(matches!(
            SimGrid::resolve(&device(), &[&vacuum], &unstable, 0.5),
            Err(SolverError::InvalidGrid(_)),
        ));
        let tiny = Scenario::new(
            "s", 1, TimeGrid::Fixed { time_step: 1e-15, num_steps: 10 });
        assert!(SimGrid::resolve(&device(), &[&vacuum], &tiny, 0.5).is_err());
    }
}
