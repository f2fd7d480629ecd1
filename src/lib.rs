//! A first-order minimization engine for smooth objectives.
//!
//! This crate drives interchangeable iterative methods over user-supplied objectives that
//! expose a value, a gradient and optionally a Lipschitz constant of the gradient. A
//! shared driver owns the iteration loop: it checks capabilities, counts evaluations,
//! enforces budgets and emits progress rows to a console sink and a record sink.
//!
//! # Features
//! - Methods: gradient descent (`GDM`), nonlinear conjugate gradients in seven variants
//!   (`CG_HS`, `CG_FR`, `CG_PRP`, `CG_PRP+`, `CG_CD`, `CG_LS`, `CG_DY`), limited-memory
//!   BFGS (`LBFGS_<m>`), and the accelerated family `FGM`, `UFGM`, `AFGM`, `AGMsDR`.
//! - Pluggable line searches: an expand/contract [`Heuristic`] (or a fixed step) and a
//!   quadratic-interpolation [`Parabolic`] search with or without gradient information.
//! - Budgets on iterations and wall time, thresholds on the objective value and the
//!   gradient norm, and resumable runs that accumulate counters across calls.
//! - Fixed-width console rows that overwrite in place, plus a `;`-delimited record file.
//! - Optional primal-dual gap tracking for the accelerated methods on objectives with a
//!   dual.
//!
//! ## Defaults
//! - Iterations: unbounded; time: 3600 s; gradient norm threshold: 1e-6; console
//!   interval: 0.1 s.
//! - Heuristic search: contraction 0.5, expansion 1.5.
//! - CG restarts along the anti-gradient every 100 iterations.
//!
//! # Example
//!
//! Minimize `f(x) = Σ i (x_i - 1)²` with L-BFGS.
//!
//! ```
//! use first_order::{ExitReason, Heuristic, Lbfgs, Method, Point, RunSettings, RunState};
//! use first_order::problems::Quadratic;
//!
//! let mut problem = Quadratic::new(10);
//! let mut point = Point::new(&problem);
//! let mut state = RunState::default();
//!
//! let settings = RunSettings::default()
//!     .with_min_gradient_norm(1e-8)
//!     .with_max_iterations(1_000);
//! let outcome = Lbfgs::new(5, Heuristic::new())
//!     .optimize(&mut problem, &mut point, &settings, &mut state)
//!     .expect("quadratic provides a gradient");
//!
//! assert_eq!(outcome.exit_reason, ExitReason::GradientNorm);
//! assert!(point.x.iter().all(|x| (x - 1.0).abs() < 1e-8));
//! println!("{} iterations, {} value evaluations", state.iter_total, state.f_count);
//! ```

pub mod diagnostics;
pub mod driver;
pub mod line_search;
pub mod methods;
pub mod problem;
pub mod problems;
pub mod report;

pub use driver::{
    ExitReason, IterationOutcome, Method, RunOutcome, RunSettings, optimize, optimize_with_sinks,
};
pub use line_search::{Heuristic, LineSearch, Parabolic, Probe};
pub use methods::{Afgm, AgmsDr, Cg, CgVariant, Fgm, Gdm, Lbfgs, Ufgm};
pub use problem::{Capabilities, Capability, Point, Problem, RunState};

/// An error type for clear diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error("method {method} requires the {capability} capability, which problem '{problem}' lacks")]
    MissingCapability {
        method: String,
        capability: Capability,
        problem: String,
    },
    #[error("method {method} requires a Lipschitz constant, but problem '{problem}' reports NaN")]
    InvalidLipschitzConstant { method: String, problem: String },
    #[error("failed to write progress rows: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::testing::{is_monotone, trace};
    use crate::problems::Quadratic;
    use ndarray::Array1;
    use spectral::prelude::*;
    use std::io;

    /// Rosenbrock in two variables; not convex, but smooth.
    struct Rosenbrock;

    impl Problem for Rosenbrock {
        fn name(&self) -> &str {
            "rosenbrock"
        }
        fn size(&self) -> usize {
            2
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::gradient()
        }
        fn f(&mut self, point: &mut Point) {
            let x = &point.x;
            point.f = (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2);
        }
        fn df(&mut self, point: &mut Point) {
            let (a, b) = (point.x[0], point.x[1]);
            point.g[0] = -2.0 * (1.0 - a) - 400.0 * (b - a * a) * a;
            point.g[1] = 200.0 * (b - a * a);
        }
    }

    fn run(
        method: &mut dyn Method,
        problem: &mut dyn Problem,
        point: &mut Point,
        settings: &RunSettings,
        state: &mut RunState,
    ) -> Result<RunOutcome, OptimizeError> {
        optimize_with_sinks(
            method,
            problem,
            point,
            settings,
            state,
            &mut io::sink(),
            &mut io::sink(),
        )
    }

    #[test]
    fn gradient_descent_reaches_the_minimizer_monotonically() {
        let mut problem = Quadratic::new(5);
        let settings = RunSettings::default()
            .with_min_gradient_norm(1e-5)
            .with_max_iterations(100_000);
        let descent = trace(&mut Gdm::new(Heuristic::new()), &mut problem, &settings);

        assert_eq!(descent.outcome.exit_reason, ExitReason::GradientNorm);
        assert!(is_monotone(&descent.values));
        assert_that!(&descent.point.f).is_close_to(0.0, 1e-10);
        for &xi in descent.point.x.iter() {
            assert_that!(&xi).is_close_to(1.0, 1e-5);
        }
    }

    #[test]
    fn lbfgs_is_at_least_as_good_as_gradient_descent() {
        let settings = RunSettings::default()
            .with_max_iterations(40)
            .with_min_gradient_norm(0.0);
        let gd = trace(&mut Gdm::new(Heuristic::new()), &mut Quadratic::new(5), &settings);
        let lbfgs = trace(
            &mut Lbfgs::new(3, Heuristic::new()),
            &mut Quadratic::new(5),
            &settings,
        );
        assert_that!(&lbfgs.point.f).is_less_than_or_equal_to(gd.point.f);
    }

    #[test]
    fn resumed_run_doubles_the_iterations() {
        let n = 7;
        let mut problem = Quadratic::new(4);
        let mut point = Point::new(&problem);
        let mut state = RunState::default();
        let mut method = Cg::new(CgVariant::PrpPlus, Heuristic::new());
        let settings = RunSettings::default()
            .with_max_iterations(n)
            .with_min_gradient_norm(0.0);

        let first = run(&mut method, &mut problem, &mut point, &settings, &mut state).unwrap();
        assert_eq!(first.exit_reason, ExitReason::Iterations);
        let (f_count, g_count, time) = (state.f_count, state.g_count, state.time_total);

        let resumed = settings.clone().with_resume(true);
        run(&mut method, &mut problem, &mut point, &resumed, &mut state).unwrap();
        assert_eq!(state.iter_total, 2 * n);
        assert_that!(&state.f_count).is_greater_than(f_count);
        assert_that!(&state.g_count).is_greater_than(g_count);
        assert_that!(&state.time_total).is_greater_than_or_equal_to(time);

        // Without resume the state starts over.
        run(&mut method, &mut problem, &mut point, &settings, &mut state).unwrap();
        assert_eq!(state.iter_total, n);
    }

    #[test]
    fn fgm_on_a_problem_without_lipschitz_constant_is_refused() {
        let mut problem = Quadratic::new(3);
        let mut point = Point::new(&problem);
        let mut state = RunState::default();
        let err = run(
            &mut Fgm::new(),
            &mut problem,
            &mut point,
            &RunSettings::default(),
            &mut state,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OptimizeError::MissingCapability {
                capability: Capability::LipschitzConstant,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "method FGM requires the lipschitz constant capability, which problem 'Test quadratic problem' lacks"
        );
        assert_eq!(state, RunState::default());
        assert_eq!(point.x, Array1::<f64>::zeros(3));
    }

    #[test]
    fn every_method_improves_rosenbrock() {
        let mut methods: Vec<Box<dyn Method>> = vec![
            Box::new(Gdm::new(Heuristic::new())),
            Box::new(Cg::new(CgVariant::Hs, Heuristic::new())),
            Box::new(Lbfgs::new(5, Parabolic::with_gradient())),
            Box::new(Ufgm::new(1e-6)),
            Box::new(Afgm::new(Heuristic::new())),
            Box::new(AgmsDr::new(Heuristic::new())),
        ];
        for method in methods.iter_mut() {
            let mut problem = Rosenbrock;
            let mut point = Point::new(&problem);
            point.x[0] = -1.2;
            point.x[1] = 1.0;
            let mut state = RunState::default();
            let settings = RunSettings::default().with_max_iterations(200);
            run(
                method.as_mut(),
                &mut problem,
                &mut point,
                &settings,
                &mut state,
            )
            .unwrap();
            // f(-1.2, 1) = 24.2
            assert_that!(&point.f).is_less_than(24.2);
            assert!(point.x.iter().all(|x| x.is_finite()), "{}", method.name());
        }
    }

    #[test]
    fn record_file_is_truncated_then_appended() {
        let path = std::env::temp_dir().join(format!(
            "first_order_record_{}.csv",
            std::process::id()
        ));
        let mut problem = Quadratic::new(2);
        let mut point = Point::new(&problem);
        let mut state = RunState::default();
        let settings = RunSettings::default()
            .with_max_iterations(3)
            .with_min_gradient_norm(0.0)
            .with_record_file(&path);
        let mut method = Gdm::new(Heuristic::new());

        method
            .optimize(&mut problem, &mut point, &settings, &mut state)
            .unwrap();
        let fresh = std::fs::read_to_string(&path).unwrap();
        assert_eq!(fresh.lines().count(), 5);

        let resumed = settings.clone().with_resume(true);
        method
            .optimize(&mut problem, &mut point, &resumed, &mut state)
            .unwrap();
        let appended = std::fs::read_to_string(&path).unwrap();
        assert_eq!(appended.lines().count(), 8);
        assert_eq!(appended.matches("method;").count(), 1);

        method
            .optimize(&mut problem, &mut point, &settings, &mut state)
            .unwrap();
        let again = std::fs::read_to_string(&path).unwrap();
        assert_eq!(again.lines().count(), 5);

        std::fs::remove_file(&path).unwrap();
    }
}
