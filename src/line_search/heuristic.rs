use ndarray::Array1;

use super::{LineSearch, Probe, evaluate, fix_step};
use crate::problem::{Point, Problem};

/// Expand-once / contract-until-better step search, or a fixed step.
///
/// The first probe is taken at the start step. If it already improves on the current
/// value, one expanded probe is tried and the better of the two is returned. Otherwise
/// the step is contracted until the value improves or the step falls below machine
/// epsilon, in which case a zero step is reported.
#[derive(Debug, Clone)]
pub struct Heuristic {
    contraction: f64,
    expansion: f64,
    min_step: f64,
    fixed_step: Option<f64>,
    probe: Point,
}

impl Default for Heuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl Heuristic {
    /// Contraction 0.5, expansion 1.5.
    pub fn new() -> Self {
        Self {
            contraction: 0.5,
            expansion: 1.5,
            min_step: f64::EPSILON,
            fixed_step: None,
            probe: Point::default(),
        }
    }

    /// Always returns a single probe at `step` (sign-fixed), improving or not.
    pub fn fixed(step: f64) -> Self {
        assert!(step.is_finite(), "fixed step must be finite");
        Self {
            fixed_step: Some(step),
            ..Self::new()
        }
    }

    /// Sets the contraction factor (in (0, 1)) and the expansion factor (zero disables
    /// the expansion probe).
    pub fn with_factors(mut self, contraction: f64, expansion: f64) -> Self {
        assert!(
            contraction > 0.0 && contraction < 1.0,
            "contraction factor must lie in (0, 1)"
        );
        assert!(
            expansion >= 0.0 && expansion.is_finite(),
            "expansion factor must be finite and non-negative"
        );
        self.contraction = contraction;
        self.expansion = expansion;
        self
    }
}

impl LineSearch for Heuristic {
    fn setup(&mut self, problem: &dyn Problem) {
        self.probe = Point::with_size(problem.size(), false);
    }

    fn search(
        &mut self,
        problem: &mut dyn Problem,
        point: &Point,
        dir: &Array1<f64>,
        dir_is_gradient: bool,
        start_step: f64,
    ) -> Probe {
        if let Some(step) = self.fixed_step {
            let step = fix_step(step, dir_is_gradient);
            return evaluate(problem, &mut self.probe, point, dir, step);
        }

        let start_step = if start_step.is_finite() {
            start_step
        } else {
            log::debug!("[LineSearch] non-finite start step {start_step}, using 1.0");
            1.0
        };
        let start_step = fix_step(start_step, dir_is_gradient);
        let mut best = evaluate(problem, &mut self.probe, point, dir, start_step);

        if best.f < point.f {
            if self.expansion != 0.0 {
                let expanded = evaluate(
                    problem,
                    &mut self.probe,
                    point,
                    dir,
                    start_step * self.expansion,
                );
                if expanded.f < best.f {
                    return expanded;
                }
            }
            return best;
        }

        while best.f >= point.f {
            if best.step.abs() < self.min_step {
                return Probe::stall(point.f);
            }
            best = evaluate(
                problem,
                &mut self.probe,
                point,
                dir,
                best.step * self.contraction,
            );
        }
        best
    }
}
