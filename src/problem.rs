//! The objective contract and the evaluation point that methods mutate.

use ndarray::Array1;
use std::fmt;

/// A property an objective may provide and a method may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The objective can evaluate its gradient.
    Gradient,
    /// The objective knows a Lipschitz constant of its gradient.
    LipschitzConstant,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::Gradient, Capability::LipschitzConstant];

    const fn bit(self) -> u8 {
        match self {
            Capability::Gradient => 1 << 0,
            Capability::LipschitzConstant => 1 << 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Capability::Gradient => "gradient",
            Capability::LipschitzConstant => "lipschitz constant",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A small set of [`Capability`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn gradient() -> Self {
        Self(Capability::Gradient.bit())
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl From<Capability> for Capabilities {
    fn from(capability: Capability) -> Self {
        Self::empty().with(capability)
    }
}

/// An objective to be minimized.
///
/// `f` writes the value at `point.x` into `point.f`; `df` writes the gradient into
/// `point.g`. Implementations only touch those fields: the driver's wrapper takes care of
/// zeroing the gradient beforehand and of refreshing the gradient norms afterwards.
pub trait Problem {
    fn name(&self) -> &str;

    /// Number of primal variables.
    fn size(&self) -> usize;

    /// Number of dual variables, zero when the objective has no dual.
    fn dual_size(&self) -> usize {
        0
    }

    fn capabilities(&self) -> Capabilities;

    fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    /// Lipschitz constant of the gradient, NaN when unknown.
    fn lipschitz_constant(&self) -> f64 {
        f64::NAN
    }

    fn f(&mut self, point: &mut Point);

    fn df(&mut self, point: &mut Point);

    /// Maps a primal point to a dual point (writes `dual.x`).
    fn dual_x(&mut self, point: &Point, dual: &mut Point) {
        let _ = (point, dual);
    }

    /// Evaluates the dual objective at `dual.x` into `dual.f`.
    fn dual_f(&mut self, dual: &mut Point) {
        let _ = dual;
    }

    /// Emits a problem-specific breakdown of `point` for diagnostics.
    fn describe(&mut self, point: &Point) {
        let _ = point;
    }
}

/// A candidate solution together with its cached evaluation results.
#[derive(Debug, Clone)]
pub struct Point {
    pub x: Array1<f64>,
    pub g: Array1<f64>,
    pub f: f64,
    pub g_norm_1: f64,
    pub g_norm_2: f64,
    pub g_norm_2_sq: f64,
    pub g_norm_inf: f64,
}

impl Default for Point {
    fn default() -> Self {
        Self::with_size(0, false)
    }
}

impl Point {
    /// A zero point sized for `problem`; the gradient buffer exists only when the
    /// problem provides gradients.
    pub fn new<P: Problem + ?Sized>(problem: &P) -> Self {
        Self::with_size(problem.size(), problem.has(Capability::Gradient))
    }

    pub fn with_size(size: usize, gradient: bool) -> Self {
        let g_len = if gradient { size } else { 0 };
        Self {
            x: Array1::zeros(size),
            g: Array1::zeros(g_len),
            f: f64::NAN,
            g_norm_1: f64::NAN,
            g_norm_2: f64::NAN,
            g_norm_2_sq: f64::NAN,
            g_norm_inf: f64::NAN,
        }
    }

    /// Resets to a zero point sized for `problem`, invalidating cached values.
    pub fn resize<P: Problem + ?Sized>(&mut self, problem: &P) {
        *self = Self::new(problem);
    }

    /// Copies coordinates and cached values from `other`, reusing this point's buffers
    /// when the sizes already match.
    pub fn assign(&mut self, other: &Point) {
        if self.x.len() == other.x.len() && self.g.len() == other.g.len() {
            self.x.assign(&other.x);
            self.g.assign(&other.g);
        } else {
            self.x = other.x.clone();
            self.g = other.g.clone();
        }
        self.f = other.f;
        self.g_norm_1 = other.g_norm_1;
        self.g_norm_2 = other.g_norm_2;
        self.g_norm_2_sq = other.g_norm_2_sq;
        self.g_norm_inf = other.g_norm_inf;
    }

    pub fn swap(&mut self, other: &mut Point) {
        std::mem::swap(self, other);
    }

    /// Recomputes the L1, L2, squared L2 and infinity norms of `g` in one pass.
    pub fn refresh_gradient_norms(&mut self) {
        let mut norm_1 = 0.0;
        let mut norm_2_sq = 0.0;
        let mut norm_inf: f64 = 0.0;
        for &value in self.g.iter() {
            norm_2_sq += value * value;
            let abs = value.abs();
            norm_1 += abs;
            norm_inf = norm_inf.max(abs);
        }
        self.g_norm_1 = norm_1;
        self.g_norm_2_sq = norm_2_sq;
        self.g_norm_2 = norm_2_sq.sqrt();
        self.g_norm_inf = norm_inf;
    }
}

/// Counters accumulated over one or more (resumed) runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunState {
    pub f_count: usize,
    pub g_count: usize,
    /// Wall time in seconds.
    pub time_total: f64,
    pub iter_total: usize,
}

impl RunState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
