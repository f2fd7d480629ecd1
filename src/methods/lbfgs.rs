use ndarray::{Array1, Zip};

use crate::driver::{IterationOutcome, Method};
use crate::line_search::LineSearch;
use crate::problem::{Capabilities, Point, Problem};
use crate::report::Column;

use super::{LS_STEP, scaled_copy};

/// Limited-memory BFGS with a circular history of `m` correction pairs.
#[derive(Debug, Clone)]
pub struct Lbfgs<L> {
    m: usize,
    name: String,
    ls: L,
    ls_start_step: f64,
    ls_step: f64,

    s: Vec<Array1<f64>>,
    y: Vec<Array1<f64>>,
    ys: Vec<f64>,
    alpha: Vec<f64>,
    // Next slot to write.
    end: usize,
    // Number of slots holding usable pairs, at most `m`.
    valid: usize,

    x_prev: Array1<f64>,
    g_prev: Array1<f64>,
    dir: Array1<f64>,
}

impl<L: LineSearch> Lbfgs<L> {
    pub fn new(m: usize, ls: L) -> Self {
        assert!(m > 0, "L-BFGS history must hold at least one pair");
        Self {
            m,
            name: format!("LBFGS_{m}"),
            ls,
            ls_start_step: 1.0,
            ls_step: 1.0,
            s: Vec::new(),
            y: Vec::new(),
            ys: vec![0.0; m],
            alpha: vec![0.0; m],
            end: 0,
            valid: 0,
            x_prev: Array1::zeros(0),
            g_prev: Array1::zeros(0),
            dir: Array1::zeros(0),
        }
    }

    pub fn history_len(&self) -> usize {
        self.m
    }

    fn reset_direction(&mut self, point: &Point) {
        scaled_copy(&mut self.dir, -1.0 / point.g_norm_2, &point.g);
    }

    /// Stores the correction pair of the step just taken and rebuilds the direction.
    ///
    /// A pair without positive curvature drops the history and resets the direction to
    /// the normalized anti-gradient.
    fn store_pair(&mut self, point: &Point) {
        let end = self.end;
        Zip::from(&mut self.s[end])
            .and(&point.x)
            .and(&self.x_prev)
            .for_each(|s, &x, &xp| *s = x - xp);
        Zip::from(&mut self.y[end])
            .and(&point.g)
            .and(&self.g_prev)
            .for_each(|y, &g, &gp| *y = g - gp);

        let ys = self.y[end].dot(&self.s[end]);
        let yy = self.y[end].dot(&self.y[end]);
        if !(ys > 0.0 && ys.is_finite() && yy.is_finite()) {
            log::debug!("[{}] curvature y·s = {ys:.3e}, dropping history", self.name);
            self.valid = 0;
            self.reset_direction(point);
            return;
        }
        self.ys[end] = ys;
        self.end = (end + 1) % self.m;
        self.valid = (self.valid + 1).min(self.m);

        // two-loop recursion over the newest `valid` pairs
        scaled_copy(&mut self.dir, -1.0, &point.g);
        let mut j = self.end;
        for _ in 0..self.valid {
            j = (j + self.m - 1) % self.m;
            self.alpha[j] = self.s[j].dot(&self.dir) / self.ys[j];
            self.dir.scaled_add(-self.alpha[j], &self.y[j]);
        }
        self.dir *= ys / yy;
        for _ in 0..self.valid {
            let beta = self.y[j].dot(&self.dir) / self.ys[j];
            self.dir.scaled_add(self.alpha[j] - beta, &self.s[j]);
            j = (j + 1) % self.m;
        }
    }
}

impl<L: LineSearch> Method for Lbfgs<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> Capabilities {
        Capabilities::gradient()
    }

    fn setup(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        self.ls.setup(problem);
        self.ls_step = self.ls_start_step;

        let n = problem.size();
        self.s = vec![Array1::zeros(n); self.m];
        self.y = vec![Array1::zeros(n); self.m];
        self.ys.fill(0.0);
        self.alpha.fill(0.0);
        self.end = 0;
        self.valid = 0;
        self.x_prev = Array1::zeros(n);
        self.g_prev = Array1::zeros(n);
        self.dir = Array1::zeros(n);
        self.reset_direction(point);
    }

    fn iteration(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        _iter: usize,
    ) -> IterationOutcome {
        self.x_prev.assign(&point.x);
        self.g_prev.assign(&point.g);

        let mut probe = self.ls.search(problem, point, &self.dir, false, self.ls_step);
        if probe.is_stall() {
            if self.valid == 0 {
                // already the anti-gradient
                return IterationOutcome::NoProgress;
            }
            log::debug!(
                "[{}] line search stalled, restarting from the anti-gradient",
                self.name
            );
            self.reset_direction(point);
            probe = self
                .ls
                .search(problem, point, &self.dir, false, self.ls_start_step);
            if probe.is_stall() {
                return IterationOutcome::NoProgress;
            }
            self.valid = 0;
        }

        self.ls_step = probe.step;
        point.x.scaled_add(probe.step, &self.dir);
        point.f = probe.f;
        problem.df(point);
        self.store_pair(point);
        IterationOutcome::Continue
    }

    fn extra_columns(&self, columns: &mut Vec<Column>) {
        columns.push(Column::new(LS_STEP, self.ls_step));
    }
}
