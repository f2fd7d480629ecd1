//! One-dimensional step searches along a direction.
//!
//! A search never moves the caller's point. It evaluates trial points of the form
//! `point.x + step * dir` on a private probe point and reports the best step found
//! together with its objective value, or a zero step (with `point.f`) on a stall.

mod heuristic;
mod parabolic;

pub use heuristic::Heuristic;
pub use parabolic::Parabolic;

use ndarray::Array1;

use crate::problem::{Point, Problem};

/// A trial step and the objective value at `point.x + step * dir`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub step: f64,
    pub f: f64,
}

impl Probe {
    /// The result of a search that found nothing better than the current point.
    pub const fn stall(f: f64) -> Self {
        Self { step: 0.0, f }
    }

    pub fn is_stall(&self) -> bool {
        self.step == 0.0
    }
}

pub trait LineSearch {
    /// Sizes internal buffers for `problem`; called from the owning method's setup.
    fn setup(&mut self, problem: &dyn Problem);

    /// Searches along `dir` from `point`.
    ///
    /// When `dir_is_gradient` is set the direction is the gradient itself and steps are
    /// taken with a negative sign, otherwise with a positive one.
    fn search(
        &mut self,
        problem: &mut dyn Problem,
        point: &Point,
        dir: &Array1<f64>,
        dir_is_gradient: bool,
        start_step: f64,
    ) -> Probe;
}

/// Forces the sign of `step` to point downhill for the given direction kind.
pub fn fix_step(step: f64, dir_is_gradient: bool) -> f64 {
    if dir_is_gradient { -step.abs() } else { step.abs() }
}

// Evaluates `problem` at `point.x + step * dir` using `probe` as scratch.
fn evaluate(
    problem: &mut dyn Problem,
    probe: &mut Point,
    point: &Point,
    dir: &Array1<f64>,
    step: f64,
) -> Probe {
    probe.x.assign(&point.x);
    probe.x.scaled_add(step, dir);
    problem.f(probe);
    Probe { step, f: probe.f }
}
