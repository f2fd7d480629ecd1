//! Helpers for checking a new objective before optimizing it.

use std::time::Instant;

use ndarray::Array1;

use crate::problem::{Point, Problem};

/// Distance between the analytic gradient and its finite-difference estimates for one
/// step size `h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientCheckRow {
    pub h: f64,
    pub forward: f64,
    pub backward: f64,
    pub central: f64,
}

/// Compares `problem.df` at `point` against forward, backward and central differences
/// for `h = 0.1, 0.01, …` down to machine epsilon.
///
/// `point` is evaluated in place and its coordinates are restored afterwards.
pub fn gradient_check(problem: &mut dyn Problem, point: &mut Point) -> Vec<GradientCheckRow> {
    const H_MAX: f64 = 1e-1;
    let h_min = f64::EPSILON;

    problem.f(point);
    point.g.fill(0.0);
    problem.df(point);

    let f0 = point.f;
    let g0 = point.g.clone();
    let n = problem.size();
    let mut forward = Array1::zeros(n);
    let mut backward = Array1::zeros(n);
    let mut central = Array1::zeros(n);

    let mut rows = Vec::new();
    let mut h = H_MAX;
    while h >= h_min {
        for i in 0..n {
            let saved = point.x[i];
            let f_plus = value_at(problem, point, i, saved + h);
            let f_minus = value_at(problem, point, i, saved - h);
            point.x[i] = saved;

            forward[i] = (f_plus - f0) / h;
            backward[i] = (f0 - f_minus) / h;
            central[i] = (f_plus - f_minus) / (2.0 * h);
        }
        let row = GradientCheckRow {
            h,
            forward: distance(&g0, &forward),
            backward: distance(&g0, &backward),
            central: distance(&g0, &central),
        };
        log::info!(
            "[GradientCheck] h = {:.0e}: forward {:e}, backward {:e}, central {:e}",
            row.h,
            row.forward,
            row.backward,
            row.central
        );
        rows.push(row);
        h *= 0.1;
    }

    point.f = f0;
    rows
}

fn value_at(problem: &mut dyn Problem, point: &mut Point, i: usize, x: f64) -> f64 {
    point.x[i] = x;
    problem.f(point);
    point.f
}

fn distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Timings of repeated evaluations, with checksums so the work cannot be skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedReport {
    pub count: usize,
    pub f_millis: f64,
    pub f_sum: f64,
    pub g_millis: f64,
    pub g_norm_sum: f64,
}

/// Times `count` value evaluations followed by `count` gradient evaluations at `point`.
pub fn speed_test(problem: &mut dyn Problem, point: &mut Point, count: usize) -> SpeedReport {
    let started = Instant::now();
    let mut f_sum = 0.0;
    for _ in 0..count {
        problem.f(point);
        f_sum += point.f;
    }
    let f_millis = started.elapsed().as_secs_f64() * 1e3;

    let started = Instant::now();
    let mut g_norm_sum = 0.0;
    for _ in 0..count {
        point.g.fill(0.0);
        problem.df(point);
        point.refresh_gradient_norms();
        g_norm_sum += point.g_norm_2;
    }
    let g_millis = started.elapsed().as_secs_f64() * 1e3;

    log::info!("[SpeedTest] f time = {f_millis:.3} ms, f_sum = {f_sum:e}");
    log::info!("[SpeedTest] g time = {g_millis:.3} ms, g_nrm2_sum = {g_norm_sum:e}");

    SpeedReport {
        count,
        f_millis,
        f_sum,
        g_millis,
        g_norm_sum,
    }
}
