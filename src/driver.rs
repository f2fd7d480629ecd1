//! The shared iteration loop: capability checks, evaluation counting, exit conditions
//! and progress rows.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::OptimizeError;
use crate::problem::{Capabilities, Capability, Point, Problem, RunState};
use crate::report::{Column, Row, RowWriter, SinkStyle};

// Console milestones: a row is kept on screen every time the gradient infinity norm
// drops below this threshold, which then shrinks by `MILESTONE_FACTOR`.
const MILESTONE_START: f64 = 1e-1;
const MILESTONE_FACTOR: f64 = 0.5;

/// Options for one `optimize` call.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub(crate) max_iterations: usize,
    pub(crate) max_time: f64,
    pub(crate) min_value: f64,
    pub(crate) min_gradient_norm: f64,
    pub(crate) print_interval: f64,
    pub(crate) resume: bool,
    pub(crate) record_file: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iterations: usize::MAX,
            max_time: 3600.0,
            min_value: f64::MIN,
            min_gradient_norm: 1e-6,
            print_interval: 0.1,
            resume: false,
            record_file: None,
        }
    }
}

impl RunSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iteration budget of this call (default: unbounded). On resume it is added to the
    /// iterations already accumulated in the run state.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Wall-time budget of this call in seconds (default: 3600), relative like
    /// `with_max_iterations`.
    pub fn with_max_time(mut self, seconds: f64) -> Self {
        assert!(!seconds.is_nan(), "max_time must not be NaN");
        self.max_time = seconds;
        self
    }

    /// Stops once the objective value drops below `value` (default: lowest f64).
    pub fn with_min_value(mut self, value: f64) -> Self {
        self.min_value = value;
        self
    }

    /// Stops once the gradient L2 norm drops below `norm` (default: 1e-6).
    pub fn with_min_gradient_norm(mut self, norm: f64) -> Self {
        self.min_gradient_norm = norm;
        self
    }

    /// Minimum number of seconds between console rows (default: 0.1).
    pub fn with_print_interval(mut self, seconds: f64) -> Self {
        self.print_interval = seconds;
        self
    }

    /// Continue accumulating into the given run state instead of resetting it.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Writes `;`-delimited rows to `path` (truncated on a fresh run, appended on resume).
    pub fn with_record_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.record_file = Some(path.into());
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn resume(&self) -> bool {
        self.resume
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The method could not make any further progress (e.g. a stalled line search).
    NoProgress,
    Iterations,
    Time,
    FunctionValue,
    GradientNorm,
}

impl ExitReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExitReason::NoProgress => "no relaxation",
            ExitReason::Iterations => "max iteration",
            ExitReason::Time => "max time",
            ExitReason::FunctionValue => "function value",
            ExitReason::GradientNorm => "gradient norm value",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single `Method::iteration` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Continue,
    NoProgress,
}

/// Summary of one `optimize` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOutcome {
    pub exit_reason: ExitReason,
    /// Iterations performed by this call (not cumulative).
    pub iterations: usize,
    /// Wall time of this call in seconds.
    pub elapsed: f64,
}

/// An optimization algorithm driven by [`optimize`].
///
/// Implementors provide one iteration of their algorithm; the driver owns the loop,
/// evaluation counting, exit conditions and progress rows.
pub trait Method {
    fn name(&self) -> &str;

    /// Capabilities the objective must provide.
    fn requirements(&self) -> Capabilities;

    fn uses(&self, capability: Capability) -> bool {
        self.requirements().contains(capability)
    }

    /// Called once after the initial evaluation at the start point.
    fn setup(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        let _ = (problem, point);
    }

    /// Performs one iteration, leaving `point` evaluated at the new iterate.
    fn iteration(&mut self, problem: &mut dyn Problem, point: &mut Point, iter: usize)
    -> IterationOutcome;

    fn teardown(&mut self, problem: &mut dyn Problem, point: &mut Point) {
        let _ = (problem, point);
    }

    /// Appends method-specific trailing columns to a progress row.
    fn extra_columns(&self, columns: &mut Vec<Column>) {
        let _ = columns;
    }

    /// Runs [`optimize`] with this method.
    fn optimize(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        settings: &RunSettings,
        state: &mut RunState,
    ) -> Result<RunOutcome, OptimizeError>
    where
        Self: Sized,
    {
        optimize(self, problem, point, settings, state)
    }
}

/// Decorator that counts evaluations, guards against non-finite values and keeps the
/// gradient norms of every evaluated point up to date.
pub struct CountingProblem<'a> {
    inner: &'a mut dyn Problem,
    f_count: usize,
    g_count: usize,
}

impl<'a> CountingProblem<'a> {
    pub fn new(inner: &'a mut dyn Problem, state: &RunState) -> Self {
        Self {
            inner,
            f_count: state.f_count,
            g_count: state.g_count,
        }
    }

    pub fn f_count(&self) -> usize {
        self.f_count
    }

    pub fn g_count(&self) -> usize {
        self.g_count
    }
}

impl Problem for CountingProblem<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn dual_size(&self) -> usize {
        self.inner.dual_size()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn lipschitz_constant(&self) -> f64 {
        self.inner.lipschitz_constant()
    }

    fn f(&mut self, point: &mut Point) {
        self.inner.f(point);
        if !point.f.is_finite() {
            point.f = f64::MAX;
        }
        self.f_count += 1;
    }

    fn df(&mut self, point: &mut Point) {
        point.g.fill(0.0);
        self.inner.df(point);
        point.refresh_gradient_norms();
        self.g_count += 1;
    }

    fn dual_x(&mut self, point: &Point, dual: &mut Point) {
        self.inner.dual_x(point, dual);
    }

    fn dual_f(&mut self, dual: &mut Point) {
        self.inner.dual_f(dual);
    }

    fn describe(&mut self, point: &Point) {
        self.inner.describe(point);
    }
}

/// Checks that `problem` provides everything `method` requires.
pub fn check_capabilities<M: Method + ?Sized>(
    method: &M,
    problem: &dyn Problem,
) -> Result<(), OptimizeError> {
    for capability in method.requirements().iter() {
        if !problem.has(capability) {
            return Err(OptimizeError::MissingCapability {
                method: method.name().to_owned(),
                capability,
                problem: problem.name().to_owned(),
            });
        }
    }
    if method.uses(Capability::LipschitzConstant) && problem.lipschitz_constant().is_nan() {
        return Err(OptimizeError::InvalidLipschitzConstant {
            method: method.name().to_owned(),
            problem: problem.name().to_owned(),
        });
    }
    Ok(())
}

fn open_record_file(path: &Path, resume: bool) -> io::Result<BufWriter<File>> {
    let file = if resume {
        OpenOptions::new().create(true).append(true).open(path)?
    } else {
        File::create(path)?
    };
    Ok(BufWriter::new(file))
}

/// Minimizes `problem` from `point` with `method`, writing console rows to stdout and
/// record rows to the settings' record file, if any.
///
/// `point` is left at the last iterate and `state` accumulates counters, wall time and
/// iterations.
pub fn optimize<M: Method + ?Sized>(
    method: &mut M,
    problem: &mut dyn Problem,
    point: &mut Point,
    settings: &RunSettings,
    state: &mut RunState,
) -> Result<RunOutcome, OptimizeError> {
    check_capabilities(method, problem).inspect_err(|err| log::warn!("{err}"))?;

    let stdout = io::stdout();
    let mut console = stdout.lock();
    match &settings.record_file {
        Some(path) => {
            let mut record = open_record_file(path, settings.resume)?;
            drive(method, problem, point, settings, state, &mut console, &mut record)
        }
        None => drive(method, problem, point, settings, state, &mut console, &mut io::sink()),
    }
}

/// [`optimize`] with explicit console and record sinks.
pub fn optimize_with_sinks<M: Method + ?Sized>(
    method: &mut M,
    problem: &mut dyn Problem,
    point: &mut Point,
    settings: &RunSettings,
    state: &mut RunState,
    console: &mut dyn Write,
    record: &mut dyn Write,
) -> Result<RunOutcome, OptimizeError> {
    check_capabilities(method, problem).inspect_err(|err| log::warn!("{err}"))?;
    drive(method, problem, point, settings, state, console, record)
}

// The loop proper; capabilities have already been checked.
fn drive<M: Method + ?Sized>(
    method: &mut M,
    problem: &mut dyn Problem,
    point: &mut Point,
    settings: &RunSettings,
    state: &mut RunState,
    console: &mut dyn Write,
    record: &mut dyn Write,
) -> Result<RunOutcome, OptimizeError> {
    if !settings.resume {
        state.reset();
    }

    let name = method.name().to_owned();
    let uses_gradient = method.uses(Capability::Gradient);
    let mut console = RowWriter::new(console, SinkStyle::Console, &name, uses_gradient);
    let mut record = RowWriter::new(record, SinkStyle::Delimited, &name, uses_gradient);

    let mut problem = CountingProblem::new(problem, state);
    log::info!(
        "[{name}] starting on '{}' (size {}, resume: {})",
        problem.name(),
        problem.size(),
        settings.resume
    );

    let started = Instant::now();
    let mut last_print = started;
    let start_iter = state.iter_total;
    let mut iter = start_iter;

    problem.f(point);
    if problem.has(Capability::Gradient) {
        problem.df(point);
    }
    method.setup(&mut problem, point);

    let mut extra = Vec::new();
    method.extra_columns(&mut extra);

    let iteration_limit = settings.max_iterations.saturating_add(state.iter_total);
    let time_limit = settings.max_time + state.time_total;
    let mut milestone = MILESTONE_START;

    // A failed write stops the run; the counters below are still folded into `state`.
    let exit: io::Result<ExitReason> = 'run: {
        let row = Row {
            time: state.time_total + started.elapsed().as_secs_f64(),
            iter,
            point,
            f_count: problem.f_count(),
            g_count: problem.g_count(),
            extra: &extra,
        };
        if let Err(err) = write_start(&mut console, &mut record, &row, settings.resume) {
            break 'run Err(err);
        }

        loop {
            if point.f < settings.min_value {
                break 'run Ok(ExitReason::FunctionValue);
            }
            if uses_gradient && point.g_norm_2 < settings.min_gradient_norm {
                break 'run Ok(ExitReason::GradientNorm);
            }

            let outcome = method.iteration(&mut problem, point, iter);
            iter += 1;

            let now = Instant::now();
            let time = state.time_total + now.duration_since(started).as_secs_f64();

            extra.clear();
            method.extra_columns(&mut extra);
            let row = Row {
                time,
                iter,
                point,
                f_count: problem.f_count(),
                g_count: problem.g_count(),
                extra: &extra,
            };
            if let Err(err) = record.row(&row) {
                break 'run Err(err);
            }

            let crossed = point.g_norm_inf <= milestone;
            if crossed {
                milestone *= MILESTONE_FACTOR;
            }
            if crossed || now.duration_since(last_print).as_secs_f64() > settings.print_interval {
                last_print = now;
                if let Err(err) = write_progress(&mut console, &mut record, &row, crossed) {
                    break 'run Err(err);
                }
            }

            if outcome == IterationOutcome::NoProgress {
                break 'run Ok(ExitReason::NoProgress);
            }
            if iter >= iteration_limit {
                break 'run Ok(ExitReason::Iterations);
            }
            if time >= time_limit {
                break 'run Ok(ExitReason::Time);
            }
        }
    };

    method.teardown(&mut problem, point);

    let elapsed = started.elapsed().as_secs_f64();
    state.time_total += elapsed;
    state.iter_total = iter;
    state.f_count = problem.f_count();
    state.g_count = problem.g_count();

    let exit_reason = exit.inspect_err(|err| {
        log::error!(
            "[{name}] writing progress failed after {} iterations: {err}",
            iter - start_iter
        );
    })?;

    extra.clear();
    method.extra_columns(&mut extra);
    console.row(&Row {
        time: state.time_total,
        iter: state.iter_total,
        point,
        f_count: state.f_count,
        g_count: state.g_count,
        extra: &extra,
    })?;
    console.new_line()?;
    console.message(&format!("Exit by: {exit_reason}"))?;
    console.flush()?;
    record.flush()?;

    log::info!(
        "[{name}] exit by: {exit_reason}; iterations={}, f={:.6e}, ||g||={:.3e}, fe={}, ge={}",
        iter - start_iter,
        point.f,
        point.g_norm_2,
        state.f_count,
        state.g_count
    );

    Ok(RunOutcome {
        exit_reason,
        iterations: iter - start_iter,
        elapsed,
    })
}

// Header and start row; the record gets neither when a run is resumed.
fn write_start(
    console: &mut RowWriter<'_>,
    record: &mut RowWriter<'_>,
    row: &Row<'_>,
    resume: bool,
) -> io::Result<()> {
    console.header(row.extra)?;
    console.new_line()?;
    console.row(row)?;
    console.new_line()?;
    if !resume {
        record.header(row.extra)?;
        record.row(row)?;
    }
    Ok(())
}

// A console row kept on screen when `keep` is set, overwritten by the next one otherwise.
fn write_progress(
    console: &mut RowWriter<'_>,
    record: &mut RowWriter<'_>,
    row: &Row<'_>,
    keep: bool,
) -> io::Result<()> {
    console.row(row)?;
    console.flush()?;
    record.flush()?;
    if keep {
        console.new_line()?;
    }
    Ok(())
}
