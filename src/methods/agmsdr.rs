use ndarray::{Array1, Zip};

use crate::driver::{IterationOutcome, Method};
use crate::line_search::LineSearch;
use crate::problem::{Capabilities, Point, Problem};
use crate::report::Column;

use super::{DualAverage, LS_STEP};

/// Accelerated gradient method with small-dimensional relaxation.
///
/// Each iteration searches the segment between the iterate and the estimate sequence
/// point `v`, takes a gradient step with a second line search, and derives the new
/// weight from a scalar quadratic equation.
#[derive(Debug, Clone)]
pub struct AgmsDr<L> {
    ls: L,
    ls_start_step: f64,
    ls_step: f64,
    weight_sum: f64,
    iterations: usize,
    y: Point,
    v: Array1<f64>,
    vx: Array1<f64>,
    dual: DualAverage,
}

impl<L: LineSearch> AgmsDr<L> {
    pub fn new(ls: L) -> Self {
        Self {
            ls,
            ls_start_step: 1.0,
            ls_step: 1.0,
            weight_sum: 0.0,
            iterations: 0,
            y: Point::default(),
            v: Array1::zeros(0),
            vx: Array1::zeros(0),
            dual: DualAverage::new(false),
        }
    }

    /// Tracks the primal-dual gap of the averaged dual point (reported as `pd_gap`).
    pub fn with_dual_gap(mut self, enabled: bool) -> Self {
        self.dual.set_enabled(enabled);
        self
    }
}

/// Larger root of `a t² + b t + c = 0`, or `None` when there is no real root.
fn larger_root(a: f64, b: f64, c: f64) -> Option<f64> {
    let d = b * b - 4.0 * a * c;
    if a == 0.0 || !(d >= 0.0) || !d.is_finite() {
        return None;
    }
    let sqrt_d = d.sqrt();
    let r1 = 0.5 * (-b + sqrt_d) / a;
    let r2 = 0.5 * (-b - sqrt_d) / a;
    Some(r1.max(r2))
}

impl<L: LineSearch> Method for AgmsDr<L> {
    fn name(&self) -> &str {
        "AGMsDR"
    }

    fn requirements(&self) -> Capabilities {
        Capabilities::gradient()
    }

    fn setup(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        self.ls.setup(problem);
        self.ls_step = self.ls_start_step;
        self.weight_sum = 0.0;
        self.iterations = 0;
        self.y = point.clone();
        self.v = point.x.clone();
        self.vx = Array1::zeros(problem.size());
        self.dual.reset(problem);
    }

    fn iteration(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        _iter: usize,
    ) -> IterationOutcome {
        // Searching from the iterate towards v (rather than from v) reuses the value and
        // gradient already known at the iterate.
        if self.iterations > 0 {
            Zip::from(&mut self.vx)
                .and(&self.v)
                .and(&point.x)
                .for_each(|vx, &v, &x| *vx = v - x);
            let probe = self.ls.search(problem, point, &self.vx, false, 1.0);
            let beta = probe.step.clamp(0.0, 1.0);

            self.y.x.assign(&point.x);
            self.y.x.scaled_add(beta, &self.vx);
            if (0.0..=1.0).contains(&probe.step) {
                self.y.f = probe.f;
            } else {
                problem.f(&mut self.y);
            }
            problem.df(&mut self.y);
        }
        self.iterations += 1;

        let probe = self
            .ls
            .search(problem, &self.y, &self.y.g, true, self.ls_step);
        if probe.is_stall() {
            log::debug!("[AGMsDR] gradient line search stalled at f = {:.6e}", self.y.f);
            return IterationOutcome::NoProgress;
        }
        self.ls_step = probe.step;

        Zip::from(&mut point.x)
            .and(&self.y.x)
            .and(&self.y.g)
            .for_each(|x, &y, &g| *x = y + probe.step * g);
        point.f = probe.f;
        problem.df(point);

        let eq_a = -self.y.g_norm_2_sq;
        let eq_b = 2.0 * (self.y.f - point.f);
        let eq_c = self.weight_sum * eq_b;
        let Some(a) = larger_root(eq_a, eq_b, eq_c) else {
            log::error!(
                "[AGMsDR] weight equation has no real root (a = {eq_a:e}, b = {eq_b:e}, c = {eq_c:e})"
            );
            return IterationOutcome::NoProgress;
        };
        self.weight_sum += a;
        self.v.scaled_add(-a, &self.y.g);

        self.dual.update(problem, point, a);
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
    use crate::driver::RunSettings;
    use crate::line_search::{Heuristic, Parabolic};
    use crate::methods::testing::trace;
    use crate::problems::Quadratic;
    use spectral::prelude::*;

    #[test]
    fn larger_root_of_simple_quadratics() {
        // -t² + 2t = 0 has roots 0 and 2
        assert_that!(&larger_root(-1.0, 2.0, 0.0).unwrap()).is_close_to(2.0, 1e-15);
        // -t² + t + 2 = 0 has roots -1 and 2
        assert_that!(&larger_root(-1.0, 1.0, 2.0).unwrap()).is_close_to(2.0, 1e-15);
        assert!(larger_root(1.0, 0.0, 1.0).is_none());
        assert!(larger_root(0.0, 1.0, 1.0).is_none());
    }

    #[test]
    fn converges_on_quadratic() {
        let mut problem = Quadratic::new(5);
        let settings = RunSettings::default()
            .with_min_gradient_norm(1e-5)
            .with_max_iterations(10_000);
        let run = trace(&mut AgmsDr::new(Heuristic::new()), &mut problem, &settings);
        assert_that!(&run.point.f).is_less_than(1e-9);
        assert_that!(&run.state.iter_total).is_greater_than(1);
    }

    #[test]
    fn works_with_parabolic_search() {
        let mut problem = Quadratic::new(3);
        let settings = RunSettings::default()
            .with_min_gradient_norm(1e-5)
            .with_max_iterations(10_000);
        let run = trace(
            &mut AgmsDr::new(Parabolic::with_gradient()),
            &mut problem,
            &settings,
        );
        assert_that!(&run.point.f).is_less_than(1e-8);
    }
}
