use ndarray::{Array1, Zip};

use crate::driver::{IterationOutcome, Method};
use crate::problem::{Capabilities, Point, Problem};
use crate::report::Column;

use super::DualAverage;

/// Universal fast gradient method: an accelerated method that estimates the Lipschitz
/// constant by backtracking on an ε-relaxed descent inequality.
#[derive(Debug, Clone)]
pub struct Ufgm {
    epsilon: f64,
    alpha: f64,
    lipschitz: f64,
    // Estimates tried by the last iteration, the accepted one last.
    trials: Vec<f64>,
    v: Array1<f64>,
    z: Array1<f64>,
    dyx: Array1<f64>,
    x_next: Point,
    y_next: Point,
    dual: DualAverage,
}

impl Ufgm {
    /// `epsilon` is the target accuracy that relaxes the acceptance inequality.
    pub fn new(epsilon: f64) -> Self {
        assert!(
            epsilon.is_finite() && epsilon >= 0.0,
            "epsilon must be finite and non-negative"
        );
        Self {
            epsilon,
            alpha: 0.0,
            lipschitz: 1.0,
            trials: Vec::new(),
            v: Array1::zeros(0),
            z: Array1::zeros(0),
            dyx: Array1::zeros(0),
            x_next: Point::default(),
            y_next: Point::default(),
            dual: DualAverage::new(false),
        }
    }

    /// Tracks the primal-dual gap of the averaged dual point (reported as `pd_gap`).
    pub fn with_dual_gap(mut self, enabled: bool) -> Self {
        self.dual.set_enabled(enabled);
        self
    }

    /// Current estimate of the Lipschitz constant.
    pub fn lipschitz_estimate(&self) -> f64 {
        self.lipschitz
    }

    /// Estimates tried during the last iteration, in order; the last one was accepted.
    pub fn last_trials(&self) -> &[f64] {
        &self.trials
    }
}

impl Method for Ufgm {
    fn name(&self) -> &str {
        "UFGM"
    }

    fn requirements(&self) -> Capabilities {
        Capabilities::gradient()
    }

    fn setup(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        let n = problem.size();
        self.alpha = 0.0;
        self.lipschitz = 1.0;
        self.trials.clear();
        self.v = point.x.clone();
        self.z = Array1::zeros(n);
        self.dyx = Array1::zeros(n);
        self.x_next = Point::new(&*problem);
        self.y_next = Point::new(&*problem);
        self.dual.reset(problem);
    }

    fn iteration(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        _iter: usize,
    ) -> IterationOutcome {
        // The iterate y_k is `point`; the accepted y_{k+1} is swapped into it at the end.
        let mut l_next = 0.5 * self.lipschitz;
        self.trials.clear();
        let alpha_next = loop {
            if !(l_next.is_finite() && l_next > 0.0) {
                log::error!("[UFGM] Lipschitz estimate became {l_next:e}, giving up");
                return IterationOutcome::NoProgress;
            }
            self.trials.push(l_next);

            let alpha_next = (0.25 / (l_next * l_next)
                + self.alpha * self.alpha * self.lipschitz / l_next)
                .sqrt()
                + 0.5 / l_next;
            let tau = 1.0 / (alpha_next * l_next);

            Zip::from(&mut self.x_next.x)
                .and(&self.v)
                .and(&point.x)
                .for_each(|x, &v, &y| *x = tau * v + (1.0 - tau) * y);
            problem.f(&mut self.x_next);
            problem.df(&mut self.x_next);

            Zip::from(&mut self.z)
                .and(&self.v)
                .and(&self.x_next.g)
                .for_each(|z, &v, &g| *z = v - alpha_next * g);
            Zip::from(&mut self.y_next.x)
                .and(&self.z)
                .and(&point.x)
                .for_each(|y_next, &z, &y| *y_next = tau * z + (1.0 - tau) * y);
            problem.f(&mut self.y_next);

            Zip::from(&mut self.dyx)
                .and(&self.y_next.x)
                .and(&self.x_next.x)
                .for_each(|d, &y, &x| *d = y - x);
            let accepted = self.x_next.f - self.y_next.f
                + self.x_next.g.dot(&self.dyx)
                + 0.5 * l_next * self.dyx.dot(&self.dyx)
                + 0.5 * tau * self.epsilon;
            if accepted >= 0.0 {
                break alpha_next;
            }
            l_next *= 2.0;
        };

        self.lipschitz = l_next;
        self.alpha = alpha_next;
        self.v.scaled_add(-alpha_next, &self.x_next.g);

        problem.df(&mut self.y_next);
        point.swap(&mut self.y_next);

        self.dual.update(problem, point, self.alpha);
        IterationOutcome::Continue
    }

    fn extra_columns(&self, columns: &mut Vec<Column>) {
        self.dual.push_column(columns);
    }
}
