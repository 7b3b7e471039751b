//! Time-dependent excitations injected into the electric field.

use std::{ f64::consts::TAU, fmt, sync::Arc };

/// A scalar excitation waveform, evaluated at simulation time `t` (in s).
///
/// Implementations must be pure functions of `t`.
pub trait SourceTerm: Send + Sync {
    fn value(&self, t: f64) -> f64;
}

impl<F> SourceTerm for F
where F: Fn(f64) -> f64 + Send + Sync
{
    fn value(&self, t: f64) -> f64 { self(t) }
}

/// Hyperbolic-secant envelope on a sinusoidal carrier:
/// ```text
/// E(t) = A sech(w (2 t / T_p - 1)) sin(2π f t + φ),    T_p = N / f
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SechPulse {
    /// Peak amplitude `A` in V / m.
    pub amplitude: f64,
    /// Carrier frequency `f` in Hz.
    pub frequency: f64,
    /// Carrier phase `φ`.
    pub phase: f64,
    /// Envelope steepness `w`.
    pub width_factor: f64,
    /// Pulse window length `N` in carrier periods.
    pub period_count: f64,
}

impl SechPulse {
    /// Create a new pulse with zero phase, `w = 10` and `N = 20`.
    pub fn new(amplitude: f64, frequency: f64) -> Self {
        Self {
            amplitude,
            frequency,
            phase: 0.0,
            width_factor: 10.0,
            period_count: 20.0,
        }
    }
}

impl SourceTerm for SechPulse {
    fn value(&self, t: f64) -> f64 {
        let t_p = self.period_count / self.frequency;
        let gamma = 2.0 * t / t_p - 1.0;
        self.amplitude / (self.width_factor * gamma).cosh()
            * (TAU * self.frequency * t + self.phase).sin()
    }
}

/// Gaussian envelope on a sinusoidal carrier:
/// ```text
/// E(t) = A exp(-(t - t_0)^2 / (2 τ^2)) sin(2π f t)
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GaussianPulse {
    pub amplitude: f64,
    pub frequency: f64,
    /// Envelope center `t_0` in s.
    pub center: f64,
    /// Envelope width `τ` in s.
    pub width: f64,
}

impl SourceTerm for GaussianPulse {
    fn value(&self, t: f64) -> f64 {
        let x = (t - self.center) / self.width;
        self.amplitude * (-0.5 * x * x).exp()
            * (TAU * self.frequency * t).sin()
    }
}

/// How a source value is combined with the computed field.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// The source value replaces the field.
    #[default]
    Hard,
    /// The source value is added to the field.
    Soft,
}

/// A [`SourceTerm`] attached to a grid index.
#[derive(Clone)]
pub struct SourceSpec {
    pub name: String,
    pub term: Arc<dyn SourceTerm>,
    pub position: usize,
    pub kind: SourceKind,
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SourceSpec {{ name: {:?}, term: ..., position: {}, kind: {:?} }}",
            self.name, self.position, self.kind,
        )
    }
}

impl SourceSpec {
    /// Create a new hard source at grid index 0.
    pub fn new<T>(name: impl Into<String>, term: T) -> Self
    where T: SourceTerm + 'static
    {
        Self {
            name: name.into(),
            term: Arc::new(term),
            position: 0,
            kind: SourceKind::Hard,
        }
    }

    /// Move the source to a different grid index.
    pub fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Set the source kind.
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Apply the source value `value` to the field sample `e`.
    pub fn apply(kind: SourceKind, e: &mut f64, value: f64) {
        match kind {
            SourceKind::Hard => { *e = value; },
            SourceKind::Soft => { *e += value; },
        }
    }
}
