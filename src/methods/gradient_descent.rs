use crate::driver::{IterationOutcome, Method};
use crate::line_search::LineSearch;
use crate::problem::{Capabilities, Point, Problem};
use crate::report::Column;

use super::LS_STEP;

/// Steepest descent with a line search along the gradient.
#[derive(Debug, Clone)]
pub struct Gdm<L> {
    ls: L,
    ls_step: f64,
}

impl<L: LineSearch> Gdm<L> {
    pub fn new(ls: L) -> Self {
        Self {
            ls,
            ls_step: f64::NAN,
        }
    }
}

impl<L: LineSearch> Method for Gdm<L> {
    fn name(&self) -> &str {
        "GDM"
    }

    fn requirements(&self) -> Capabilities {
        Capabilities::gradient()
    }

    fn setup(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        self.ls.setup(problem);
        self.ls_step = -1.0 / point.g_norm_2;
    }

    fn iteration(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        _iter: usize,
    ) -> IterationOutcome {
        let probe = self.ls.search(problem, point, &point.g, true, self.ls_step);
        if probe.is_stall() {
            log::debug!("[GDM] line search stalled at f = {:.6e}", point.f);
            return IterationOutcome::NoProgress;
        }

        self.ls_step = probe.step;
        let Point { x, g, .. } = point;
        x.scaled_add(probe.step, &*g);
        point.f = probe.f;
        problem.df(point);
        IterationOutcome::Continue
    }

    fn extra_columns(&self, columns: &mut Vec<Column>) {
        columns.push(Column::new(LS_STEP, -self.ls_step));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ExitReason, RunSettings};
    use crate::line_search::{Heuristic, Parabolic};
    use crate::methods::testing::{is_monotone, trace};
    use crate::problems::Quadratic;
    use spectral::prelude::*;

    #[test]
    fn converges_monotonically_on_quadratic() {
        let mut problem = Quadratic::new(4);
        let settings = RunSettings::default()
            .with_min_gradient_norm(1e-5)
            .with_max_iterations(100_000);
        let run = trace(&mut Gdm::new(Heuristic::new()), &mut problem, &settings);

        assert_eq!(run.outcome.exit_reason, ExitReason::GradientNorm);
        assert!(is_monotone(&run.values));
        assert_that!(&run.point.f).is_less_than(1e-10);
        for &xi in run.point.x.iter() {
            assert_that!(&xi).is_close_to(1.0, 1e-5);
        }
    }

    #[test]
    fn parabolic_search_also_converges() {
        let mut problem = Quadratic::new(3);
        let settings = RunSettings::default()
            .with_min_gradient_norm(1e-6)
            .with_max_iterations(10_000);
        let run = trace(
            &mut Gdm::new(Parabolic::with_gradient()),
            &mut problem,
            &settings,
        );
        assert!(is_monotone(&run.values));
        assert_that!(&run.point.g_norm_2).is_less_than(1e-6);
    }

    #[test]
    fn reports_positive_step_column() {
        let mut problem = Quadratic::new(2);
        let mut gdm = Gdm::new(Heuristic::new());
        let settings = RunSettings::default().with_max_iterations(3);
        let _ = trace(&mut gdm, &mut problem, &settings);

        let mut columns = Vec::new();
        gdm.extra_columns(&mut columns);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "ls_step");
        assert_that!(&columns[0].value).is_greater_than(0.0);
    }
}
