use ndarray::{Array1, Zip};

use crate::driver::{IterationOutcome, Method};
use crate::problem::{Capabilities, Capability, Point, Problem};
use crate::report::Column;

use super::DualAverage;

/// Nesterov's fast gradient method with a known Lipschitz constant.
#[derive(Debug, Clone, Default)]
pub struct Fgm {
    step: f64,
    iterations: usize,
    x_prev: Array1<f64>,
    y: Array1<f64>,
    dual: DualAverage,
}

impl Fgm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks the primal-dual gap of the averaged dual point (reported as `pd_gap`).
    pub fn with_dual_gap(mut self, enabled: bool) -> Self {
        self.dual.set_enabled(enabled);
        self
    }
}

impl Method for Fgm {
    fn name(&self) -> &str {
        "FGM"
    }

    fn requirements(&self) -> Capabilities {
        Capabilities::gradient().with(Capability::LipschitzConstant)
    }

    fn setup(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        self.step = 1.0 / problem.lipschitz_constant();
        self.iterations = 0;
        self.x_prev = Array1::zeros(problem.size());
        self.y = point.x.clone();
        self.dual.reset(problem);
    }

    fn iteration(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        _iter: usize,
    ) -> IterationOutcome {
        self.x_prev.assign(&point.x);

        // x = y - g / L
        let step = self.step;
        Zip::from(&mut point.x)
            .and(&self.y)
            .and(&point.g)
            .for_each(|x, &y, &g| *x = y - step * g);
        problem.f(point);
        problem.df(point);

        // y = x + k / (k + 3) * (x - x_prev), k counted from one
        self.iterations += 1;
        let k = self.iterations as f64;
        let momentum = k / (k + 3.0);
        Zip::from(&mut self.y)
            .and(&point.x)
            .and(&self.x_prev)
            .for_each(|y, &x, &xp| *y = x + momentum * (x - xp));

        self.dual.update(problem, point, 1.0);
        IterationOutcome::Continue
    }

    fn extra_columns(&self, columns: &mut Vec<Column>) {
        self.dual.push_column(columns);
    }
}
