//! Sampling of observables into a preallocated scratch buffer during a run,
//! and the final copy into caller-owned results.
//!
//! Every requested record becomes a [`LayoutEntry`] owning one contiguous
//! range of the scratch buffer (two if the observable is complex-valued):
//! ```text
//! [ entry 0 real | entry 0 imag | entry 1 real | entry 2 real | ... ]
//! ```
//! Within a range, sample `(row, col)` lives at `row * cols + col`. Ranges
//! never overlap, so distinct entries and distinct grid points can be written
//! concurrently without locking.

use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use rayon::prelude::*;
use tracing::{ debug, warn };
use crate::{
    error::SolverError,
    grid::{ try_filled, GridState },
    hilbert::AdjointBasis,
    scenario::{ RecordSpec, SimGrid },
};

/// A recognized observable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Observable {
    /// Electric field `e`.
    Electric,
    /// Magnetic field `h`.
    Magnetic,
    /// Population difference `ρ_22 - ρ_11` (`inversion`).
    Inversion,
    /// Density matrix element `ρ_mn` (`dMN` or `dM_N`, 1-based); stored
    /// 0-based.
    Density(usize, usize),
    /// Adjoint component `d_k` (`blochK`, 0-based).
    Bloch(usize),
}

impl Observable {
    /// Parse an observable name for a system of `levels` quantum levels.
    ///
    /// Quantum observables are rejected if `levels` is zero or the indices
    /// fall outside the system.
    pub fn parse(name: &str, levels: usize) -> Result<Self, SolverError> {
        let unknown = || SolverError::UnknownObservable(name.to_string());
        let obs
            = match name {
                "e" => return Ok(Self::Electric),
                "h" => return Ok(Self::Magnetic),
                "inversion" => Self::Inversion,
                _ if name.starts_with("bloch") => {
                    let k = parse_index(&name[5..]).ok_or_else(unknown)?;
                    Self::Bloch(k)
                },
                _ if name.starts_with('d') => {
                    let (m, n) = parse_element(&name[1..]).ok_or_else(unknown)?;
                    if m == 0 || n == 0 { return Err(unknown()); }
                    Self::Density(m - 1, n - 1)
                },
                _ => return Err(unknown()),
            };
        let ok
            = match obs {
                Self::Inversion => levels >= 2,
                Self::Density(m, n) => m < levels && n < levels,
                Self::Bloch(k) => k < (levels * levels).saturating_sub(1),
                _ => true,
            };
        ok.then_some(obs).ok_or_else(unknown)
    }

    /// Return `true` if the observable is complex-valued.
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Density(m, n) if m != n)
    }

    /// Number of valid grid positions for the observable's spatial window.
    pub fn limit(&self, num_gridpoints: usize) -> usize {
        match self {
            Self::Magnetic => num_gridpoints + 1,
            _ => num_gridpoints,
        }
    }
}

// decimal digits only, no sign
fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) { return None; }
    s.parse().ok()
}

// "MN" with single digits, or "M_N"
fn parse_element(s: &str) -> Option<(usize, usize)> {
    if let Some((m, n)) = s.split_once('_') {
        Some((parse_index(m)?, parse_index(n)?))
    } else if s.len() == 2 && s.is_ascii() {
        Some((parse_index(&s[..1])?, parse_index(&s[1..])?))
    } else {
        None
    }
}

/// A real affine functional `d -> offset + coeffs . d` of the Bloch vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Affine {
    pub offset: f64,
    pub coeffs: nd::Array1<f64>,
}

impl Affine {
    pub fn eval(&self, d: &nd::ArrayView1<f64>) -> f64 {
        self.offset + self.coeffs.dot(d)
    }
}

/// What is read from the grid for an entry.
#[derive(Clone, Debug)]
pub enum Probe {
    Electric,
    Magnetic,
    /// Real part, and imaginary part for complex observables.
    Quantum { re: Affine, im: Option<Affine> },
}

impl Probe {
    fn new(obs: Observable, name: &str, basis: Option<&AdjointBasis>)
        -> Result<Self, SolverError>
    {
        let (offset, coeffs): (C64, nd::Array1<C64>)
            = match (obs, basis) {
                (Observable::Electric, _) => { return Ok(Self::Electric); },
                (Observable::Magnetic, _) => { return Ok(Self::Magnetic); },
                (_, None) => {
                    return Err(SolverError::UnknownObservable(name.to_string()));
                },
                (Observable::Inversion, Some(basis)) => {
                    let (o1, c1) = basis.element_functional(1, 1);
                    let (o0, c0) = basis.element_functional(0, 0);
                    (o1 - o0, c1 - c0)
                },
                (Observable::Density(m, n), Some(basis)) => {
                    basis.element_functional(m, n)
                },
                (Observable::Bloch(k), Some(basis)) => {
                    let mut c: nd::Array1<C64> = nd::Array1::zeros(basis.dim());
                    c[k] = C64::one();
                    (C64::zero(), c)
                },
            };
        let re = Affine { offset: offset.re, coeffs: coeffs.mapv(|c| c.re) };
        let im
            = obs.is_complex()
            .then(|| Affine { offset: offset.im, coeffs: coeffs.mapv(|c| c.im) });
        Ok(Self::Quantum { re, im })
    }
}

/// One requested record and its place in the scratch buffer.
#[derive(Clone, Debug)]
pub struct LayoutEntry {
    pub name: String,
    pub observable: Observable,
    pub probe: Probe,
    /// First grid index of the window.
    pub position: usize,
    /// Number of grid points in the window.
    pub cols: usize,
    /// Number of sampled time steps.
    pub rows: usize,
    /// Sample every `stride`-th step.
    pub stride: usize,
    pub offset_real: usize,
    pub offset_imag: Option<usize>,
}

impl LayoutEntry {
    /// Number of samples per part.
    pub fn size(&self) -> usize { self.rows * self.cols }

    /// Return `true` if step `n` is sampled.
    pub fn samples(&self, n: usize) -> bool { n % self.stride == 0 }

    pub fn is_complex(&self) -> bool { self.offset_imag.is_some() }

    /// Scratch ranges `(real, imag)` of row `row`.
    fn row_ranges(&self, row: usize)
        -> (std::ops::Range<usize>, Option<std::ops::Range<usize>>)
    {
        let start = row * self.cols;
        let re = self.offset_real + start..self.offset_real + start + self.cols;
        let im = self.offset_imag.map(|o| o + start..o + start + self.cols);
        (re, im)
    }
}

/// Disjoint scratch offsets for all requested records.
#[derive(Clone, Debug)]
pub struct RecordLayout {
    entries: Vec<LayoutEntry>,
    scratch_len: usize,
}

impl RecordLayout {
    /// Validate `records` against the grid and assign scratch offsets.
    ///
    /// `basis` is `None` when no cell carries a quantum system, in which case
    /// only `e` and `h` are recognized.
    pub fn new(
        records: &[RecordSpec],
        grid: &SimGrid,
        basis: Option<&AdjointBasis>,
    ) -> Result<Self, SolverError>
    {
        let levels = basis.map(|b| b.levels()).unwrap_or(0);
        let mut entries: Vec<LayoutEntry> = Vec::with_capacity(records.len());
        let mut offset: usize = 0;
        for rec in records.iter() {
            let observable = Observable::parse(&rec.name, levels)?;
            let limit = observable.limit(grid.num_gridpoints);
            let count
                = rec.count
                .unwrap_or_else(|| limit.saturating_sub(rec.position));
            let past_end
                = rec.position.checked_add(count)
                .map_or(true, |end| end > limit);
            if past_end || rec.position >= limit {
                return Err(SolverError::RecordOutOfRange {
                    name: rec.name.clone(),
                    position: rec.position,
                    count,
                    limit,
                });
            }
            let stride
                = match rec.interval {
                    None => 1,
                    Some(interval) => {
                        SolverError::check_grid(
                            interval.is_finite() && interval > 0.0,
                            || {
                                format!(
                                    "record '{}' interval must be positive; got {}",
                                    rec.name, interval,
                                )
                            },
                        )?;
                        ((interval / grid.d_t).round() as usize).max(1)
                    },
                };
            let rows = grid.num_timesteps.div_ceil(stride);
            let too_large = || SolverError::Allocation {
                what: "record scratch",
                size: usize::MAX,
            };
            let size = rows.checked_mul(count).ok_or_else(too_large)?;
            if size == 0 {
                warn!(record = rec.name.as_str(), "record window is empty");
            }
            let offset_real = offset;
            offset = offset.checked_add(size).ok_or_else(too_large)?;
            let offset_imag
                = if observable.is_complex() {
                    let o = offset;
                    offset = offset.checked_add(size).ok_or_else(too_large)?;
                    Some(o)
                } else {
                    None
                };
            let entry = LayoutEntry {
                name: rec.name.clone(),
                observable,
                probe: Probe::new(observable, &rec.name, basis)?,
                position: rec.position,
                cols: count,
                rows,
                stride,
                offset_real,
                offset_imag,
            };
            debug!(
                record = entry.name.as_str(),
                offset_real = entry.offset_real,
                offset_imag = ?entry.offset_imag,
                rows = entry.rows,
                cols = entry.cols,
                "record layout entry",
            );
            entries.push(entry);
        }
        Ok(Self { entries, scratch_len: offset })
    }

    pub fn entries(&self) -> &[LayoutEntry] { &self.entries }

    /// Check that `results` match the layout entry by entry.
    pub fn check_results(&self, results: &[SimResult])
        -> Result<(), SolverError>
    {
        if results.len() != self.entries.len() {
            let name
                = self.entries.get(results.len())
                .map(|e| e.name.clone())
                .unwrap_or_default();
            return Err(SolverError::ResultShape { name });
        }
        self.entries.iter().zip(results)
            .find(|(entry, res)| !res.matches(entry))
            .map_or(Ok(()), |(entry, _)| {
                Err(SolverError::ResultShape { name: entry.name.clone() })
            })
    }

    /// Allocate zeroed results for every entry, in layout order.
    pub fn new_results(&self) -> Vec<SimResult> {
        self.entries.iter().map(SimResult::for_entry).collect()
    }

    /// Total number of scratch elements.
    pub fn scratch_len(&self) -> usize { self.scratch_len }

    /// Sample every entry due at step `n` from `grid` into `scratch`.
    ///
    /// Entries are processed in turn; the points of each entry's window are
    /// split across the current rayon pool.
    pub fn record(
        &self,
        n: usize,
        grid: &GridState,
        scratch: &mut [f64],
        min_len: usize,
    ) {
        for entry in self.entries.iter().filter(|entry| entry.samples(n)) {
            let (re, im) = entry.row_ranges(n / entry.stride);
            let pos = entry.position;
            match &entry.probe {
                Probe::Electric => {
                    scratch[re].copy_from_slice(&grid.e[pos..pos + entry.cols]);
                },
                Probe::Magnetic => {
                    scratch[re].copy_from_slice(&grid.h[pos..pos + entry.cols]);
                },
                Probe::Quantum { re: f_re, im: f_im } => {
                    sample_affine(f_re, grid, pos, &mut scratch[re], min_len);
                    if let (Some(f_im), Some(im)) = (f_im, im) {
                        sample_affine(f_im, grid, pos, &mut scratch[im], min_len);
                    }
                },
            }
        }
    }
}

fn sample_affine(
    f: &Affine,
    grid: &GridState,
    position: usize,
    out: &mut [f64],
    min_len: usize,
) {
    out.par_iter_mut()
        .enumerate()
        .with_min_len(min_len)
        .for_each(|(j, x)| { *x = f.eval(&grid.bloch.row(position + j)); });
}

/// Backing storage of the scratch buffer.
pub trait ScratchStore: Send {
    /// Allocate `len` zeroed elements.
    fn allocate(len: usize) -> Result<Self, SolverError>
    where Self: Sized;

    fn as_slice(&self) -> &[f64];

    fn as_mut_slice(&mut self) -> &mut [f64];
}

/// Scratch buffer in host memory.
#[derive(Clone, Debug, Default)]
pub struct HostScratch(Vec<f64>);

impl ScratchStore for HostScratch {
    fn allocate(len: usize) -> Result<Self, SolverError> {
        try_filled("result scratch", len, 0.0).map(Self)
    }

    fn as_slice(&self) -> &[f64] { &self.0 }

    fn as_mut_slice(&mut self) -> &mut [f64] { &mut self.0 }
}

/// Caller-owned storage for one recorded observable, indexed by
/// `[sample, grid point]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SimResult {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub real: nd::Array2<f64>,
    pub imag: Option<nd::Array2<f64>>,
}

impl SimResult {
    /// Allocate zeroed storage matching `entry`.
    pub fn for_entry(entry: &LayoutEntry) -> Self {
        let shape = (entry.rows, entry.cols);
        Self {
            name: entry.name.clone(),
            rows: entry.rows,
            cols: entry.cols,
            real: nd::Array2::zeros(shape),
            imag: entry.is_complex().then(|| nd::Array2::zeros(shape)),
        }
    }

    pub fn is_complex(&self) -> bool { self.imag.is_some() }

    fn matches(&self, entry: &LayoutEntry) -> bool {
        let shape = [entry.rows, entry.cols];
        self.name == entry.name
            && self.rows == entry.rows
            && self.cols == entry.cols
            && self.real.shape() == shape
            && self.imag.as_ref().map(|a| a.shape() == shape)
                == entry.is_complex().then_some(true)
    }
}

/// Copy every entry's scratch range into `results`, which must be in layout
/// order.
pub fn materialize(
    layout: &RecordLayout,
    scratch: &[f64],
    results: &mut [SimResult],
) -> Result<(), SolverError>
{
    layout.check_results(results)?;
    for (entry, res) in layout.entries.iter().zip(results.iter_mut()) {
        let shape = (entry.rows, entry.cols);
        let size = entry.size();
        let view = |o: usize| {
            nd::ArrayView2::from_shape(shape, &scratch[o..o + size])
                .map_err(|_| SolverError::ResultShape { name: entry.name.clone() })
        };
        res.real.assign(&view(entry.offset_real)?);
        if let (Some(o), Some(imag)) = (entry.offset_imag, res.imag.as_mut()) {
            imag.assign(&view(o)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid() -> SimGrid {
        SimGrid { num_gridpoints: 10, num_timesteps: 7, d_x: 1e-6, d_t: 1e-15 }
    }

    #[test]
    fn parse_names() {
        assert_eq!(Observable::parse("e", 0).unwrap(), Observable::Electric);
        assert_eq!(Observable::parse("d12", 2).unwrap(), Observable::Density(0, 1));
        assert_eq!(Observable::parse("d3_3", 3).unwrap(), Observable::Density(2, 2));
        assert_eq!(Observable::parse("bloch7", 3).unwrap(), Observable::Bloch(7));
        assert!(Observable::parse("d12", 2).unwrap().is_complex());
        assert!(!Observable::parse("d22", 2).unwrap().is_complex());
        let bad_names = [
            "voltage", "d13", "d0_1", "bloch3", "inversion", "dxy",
            "bloch+2", "d+1_+2", "d1_", "bloch", "d+2",
        ];
        for bad in bad_names {
            let levels = if bad == "inversion" { 0 } else { 2 };
            assert!(matches!(
                Observable::parse(bad, levels),
                Err(SolverError::UnknownObservable(name)) if name == bad,
            ));
        }
    }

    #[test]
    fn layout_offsets_are_disjoint() {
        let basis = AdjointBasis::new(2);
        let records = vec![
            RecordSpec::new("e"),
            RecordSpec::new("d12").window(2, 3).every(2e-15),
            RecordSpec::new("h"),
            RecordSpec::new("inversion").every(3.2e-15),
        ];
        let layout = RecordLayout::new(&records, &grid(), Some(&basis)).unwrap();
        let mut covered = vec![0_usize; layout.scratch_len()];
        for entry in layout.entries() {
            let ranges
                = std::iter::once(entry.offset_real)
                .chain(entry.offset_imag);
            for o in ranges {
                covered[o..o + entry.size()].iter_mut().for_each(|c| { *c += 1; });
            }
        }
        assert!(covered.iter().all(|c| *c == 1));

        let e = &layout.entries()[0];
        assert_eq!((e.rows, e.cols, e.stride), (7, 10, 1));
        let d = &layout.entries()[1];
        assert_eq!((d.rows, d.cols, d.stride), (4, 3, 2));
        assert!(d.is_complex());
        assert_eq!(layout.entries()[2].cols, 11);
        assert_eq!(layout.entries()[3].stride, 3);
        assert_eq!(layout.entries()[3].rows, 3);
        assert_eq!(layout.scratch_len(), 70 + 2 * 12 + 77 + 30);
    }

    #[test]
    fn bad_records_rejected() {
        let basis = AdjointBasis::new(2);
        let out_of_range = vec![RecordSpec::new("e").window(8, 3)];
        assert!(matches!(
            RecordLayout::new(&out_of_range, &grid(), Some(&basis)),
            Err(SolverError::RecordOutOfRange { limit: 10, .. }),
        ));
        let overflowing = vec![RecordSpec::new("e").window(1, usize::MAX)];
        assert!(matches!(
            RecordLayout::new(&overflowing, &grid(), Some(&basis)),
            Err(SolverError::RecordOutOfRange { position: 1, limit: 10, .. }),
        ));
        let unknown = vec![RecordSpec::new("polarization")];
        assert!(matches!(
            RecordLayout::new(&unknown, &grid(), Some(&basis)),
            Err(SolverError::UnknownObservable(_)),
        ));
        let quantum_without_medium = vec![RecordSpec::new("inversion")];
        assert!(RecordLayout::new(&quantum_without_medium, &grid(), None).is_err());
        let bad_interval = vec![RecordSpec::new("e").every(-1.0)];
        assert!(matches!(
            RecordLayout::new(&bad_interval, &grid(), None),
            Err(SolverError::InvalidGrid(_)),
        ));
    }

    #[test]
    fn record_and_materialize() {
        let basis = AdjointBasis::new(2);
        let records = vec![
            RecordSpec::new("e").window(1, 2),
            RecordSpec::new("d12").window(0, 2),
            RecordSpec::new("inversion").window(0, 2),
        ];
        let sim = SimGrid { num_timesteps: 2, ..grid() };
        let layout = RecordLayout::new(&records, &sim, Some(&basis)).unwrap();
        let mut state = GridState::new(3, vec![0; 10]).unwrap();
        let mut rho: nd::Array2<C64> = nd::Array2::zeros((2, 2));
        rho[[0, 0]] = C64::from(0.25);
        rho[[1, 1]] = C64::from(0.75);
        rho[[0, 1]] = C64::new(0.1, -0.2);
        rho[[1, 0]] = C64::new(0.1, 0.2);
        state.bloch.row_mut(1).assign(&basis.to_bloch(&rho));
        state.e[1] = 3.0;
        state.e[2] = -1.0;
        let mut scratch = HostScratch::allocate(layout.scratch_len()).unwrap();
        layout.record(1, &state, scratch.as_mut_slice(), 1);

        let mut results: Vec<SimResult>
            = layout.entries().iter().map(SimResult::for_entry).collect();
        materialize(&layout, scratch.as_slice(), &mut results).unwrap();
        assert_eq!(results[0].real.row(1).to_vec(), vec![3.0, -1.0]);
        assert_eq!(results[0].real.row(0).to_vec(), vec![0.0, 0.0]);
        let d12 = &results[1];
        assert_abs_diff_eq!(d12.real[[1, 1]], 0.1, epsilon = 1e-15);
        assert_abs_diff_eq!(d12.imag.as_ref().unwrap()[[1, 1]], -0.2, epsilon = 1e-15);
        // a zero Bloch vector reads as the maximally mixed state
        assert_abs_diff_eq!(d12.real[[1, 0]], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(results[2].real[[1, 1]], 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(results[2].real[[1, 0]], 0.0, epsilon = 1e-15);

        results.pop();
        assert!(matches!(
            materialize(&layout, scratch.as_slice(), &mut results),
            Err(SolverError::ResultShape { .. }),
        ));
    }
}
