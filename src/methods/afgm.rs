use ndarray::{Array1, Zip};

use crate::driver::{IterationOutcome, Method};
use crate::line_search::LineSearch;
use crate::problem::{Capabilities, Point, Problem};
use crate::report::Column;

use super::{DualAverage, LS_STEP};

/// Accelerated fast gradient method: the coupling coefficient between the aggregated
/// point `z` and the iterate is found by a line search, and the gradient step size by a
/// second one, so no Lipschitz constant is needed.
#[derive(Debug, Clone)]
pub struct Afgm<L> {
    ls: L,
    ls_step: f64,
    alpha: f64,
    iterations: usize,
    x: Point,
    z: Array1<f64>,
    zy: Array1<f64>,
    dual: DualAverage,
}

impl<L: LineSearch> Afgm<L> {
    pub fn new(ls: L) -> Self {
        Self {
            ls,
            ls_step: 1.0,
            alpha: 0.0,
            iterations: 0,
            x: Point::default(),
            z: Array1::zeros(0),
            zy: Array1::zeros(0),
            dual: DualAverage::new(false),
        }
    }

    /// Tracks the primal-dual gap of the averaged dual point (reported as `pd_gap`).
    pub fn with_dual_gap(mut self, enabled: bool) -> Self {
        self.dual.set_enabled(enabled);
        self
    }
}

impl<L: LineSearch> Method for Afgm<L> {
    fn name(&self) -> &str {
        "AFGM"
    }

    fn requirements(&self) -> Capabilities {
        Capabilities::gradient()
    }

    fn setup(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        self.ls.setup(problem);
        self.ls_step = -1.0 / point.g_norm_2;
        self.alpha = 0.0;
        self.iterations = 0;
        self.x = point.clone();
        self.z = point.x.clone();
        self.zy = Array1::zeros(problem.size());
        self.dual.reset(problem);
    }

    fn iteration(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        _iter: usize,
    ) -> IterationOutcome {
        // `point` is y_k; `self.x` starts out equal to it.
        if self.iterations > 0 {
            Zip::from(&mut self.zy)
                .and(&self.z)
                .and(&point.x)
                .for_each(|zy, &z, &y| *zy = z - y);
            let probe = self.ls.search(problem, point, &self.zy, false, 1.0);
            let tau = probe.step.clamp(0.0, 1.0);

            self.x.x.assign(&point.x);
            self.x.x.scaled_add(tau, &self.zy);
            if (0.0..=1.0).contains(&probe.step) {
                self.x.f = probe.f;
            } else {
                problem.f(&mut self.x);
            }
            problem.df(&mut self.x);
        }
        self.iterations += 1;

        let probe = self
            .ls
            .search(problem, &self.x, &self.x.g, true, self.ls_step);
        if probe.is_stall() {
            log::debug!("[AFGM] gradient line search stalled at f = {:.6e}", self.x.f);
            return IterationOutcome::NoProgress;
        }
        self.ls_step = probe.step;

        Zip::from(&mut point.x)
            .and(&self.x.x)
            .and(&self.x.g)
            .for_each(|y, &x, &g| *y = x + probe.step * g);
        point.f = probe.f;
        problem.df(point);

        let l = self.x.g_norm_2_sq / (2.0 * (self.x.f - point.f));
        self.alpha = 0.5 / l + (0.25 / (l * l) + self.alpha * self.alpha).sqrt();
        self.z.scaled_add(-self.alpha, &self.x.g);

        self.dual.update(problem, point, self.alpha);
        IterationOutcome::Continue
    }

    fn extra_columns(&self, columns: &mut Vec<Column>) {
        columns.push(Column::new(LS_STEP, -self.ls_step));
        self.dual.push_column(columns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ExitReason, RunSettings, optimize_with_sinks};
    use crate::line_search::Heuristic;
    use crate::methods::testing::trace;
    use crate::problem::RunState;
    use crate::problems::Quadratic;
    use spectral::prelude::*;

    #[test]
    fn converges_on_quadratic() {
        let mut problem = Quadratic::new(5);
        let settings = RunSettings::default()
            .with_min_gradient_norm(1e-5)
            .with_max_iterations(10_000);
        let run = trace(&mut Afgm::new(Heuristic::new()), &mut problem, &settings);
        assert_that!(&run.point.f).is_less_than(1e-9);
    }

    #[test]
    fn starting_at_the_minimizer_reports_no_progress() {
        let mut problem = Quadratic::new(3);
        let mut point = Point::new(&problem);
        point.x.fill(1.0);
        let mut state = RunState::default();
        let settings = RunSettings::default().with_min_gradient_norm(0.0);
        let outcome = optimize_with_sinks(
            &mut Afgm::new(Heuristic::new()),
            &mut problem,
            &mut point,
            &settings,
            &mut state,
            &mut std::io::sink(),
            &mut std::io::sink(),
        )
        .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::NoProgress);
        assert_eq!(point.f, 0.0);
    }

    #[test]
    fn dual_gap_adds_a_column() {
        let mut columns = Vec::new();
        Afgm::new(Heuristic::new())
            .with_dual_gap(true)
            .extra_columns(&mut columns);
        let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
        assert_eq!(names, ["ls_step", "pd_gap"]);
    }
}
