use ndarray::Array1;

use super::{LineSearch, Probe, evaluate, fix_step};
use crate::problem::{Point, Problem};

// Upper bound on probes per search, initial ones included.
const MAX_PROBES: usize = 20;

/// Quadratic-interpolation step search.
///
/// With gradient information the second probe is placed at the vertex of the 1-D model
/// built from the current value, the directional derivative and the first probe, so an
/// exactly quadratic line is solved in two probes. Without gradients three probes
/// bracket the current point. Further probes go to the vertex of the parabola through
/// the three best probes.
#[derive(Debug, Clone)]
pub struct Parabolic {
    probes: usize,
    use_gradient: bool,
    // Slot 0 holds the current point until the first sort.
    p: [Probe; 4],
    probe: Point,
}

impl Parabolic {
    pub fn new(probes: usize, use_gradient: bool) -> Self {
        let min_probes = if use_gradient { 2 } else { 3 };
        assert!(
            probes >= min_probes,
            "parabolic search needs at least {min_probes} probes (use_gradient: {use_gradient})"
        );
        assert!(
            probes <= MAX_PROBES,
            "parabolic search allows at most {MAX_PROBES} probes"
        );
        Self {
            probes,
            use_gradient,
            p: [Probe::stall(f64::NAN); 4],
            probe: Point::default(),
        }
    }

    /// Two probes, using the directional derivative at the current point.
    pub fn with_gradient() -> Self {
        Self::new(2, true)
    }

    /// Three probes, values only.
    pub fn without_gradient() -> Self {
        Self::new(3, false)
    }

    fn candidate(
        &mut self,
        problem: &mut dyn Problem,
        point: &Point,
        dir: &Array1<f64>,
        step: f64,
    ) -> Probe {
        if step.is_finite() {
            evaluate(problem, &mut self.probe, point, dir, step)
        } else {
            Probe::stall(point.f)
        }
    }

    fn sort(&mut self, count: usize) {
        self.p[..count].sort_by(|a, b| a.f.total_cmp(&b.f));
    }
}

/// Vertex of the parabola through three `(step, f)` probes.
fn vertex(p: &[Probe]) -> f64 {
    let det_a = p[0].f * (p[1].step - p[2].step) - p[0].step * (p[1].f - p[2].f)
        + (p[1].f * p[2].step - p[2].f * p[1].step);
    let det_b = p[0].step * p[0].step * (p[1].f - p[2].f)
        - p[0].f * (p[1].step * p[1].step - p[2].step * p[2].step)
        + (p[1].step * p[1].step * p[2].f - p[2].step * p[2].step * p[1].f);
    -0.5 * det_b / det_a
}

impl LineSearch for Parabolic {
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
        let start_step = if start_step.is_finite() { start_step } else { 1.0 };
        let start_step = fix_step(start_step, dir_is_gradient);

        self.p[0] = Probe::stall(point.f);
        let mut sorted = false;
        for i in 1..=self.probes {
            match i {
                1 => {
                    let step = if self.use_gradient {
                        start_step
                    } else {
                        -0.5 * start_step
                    };
                    self.p[1] = evaluate(problem, &mut self.probe, point, dir, step);
                }
                2 => {
                    let step = if self.use_gradient {
                        // directional derivative of f along dir at the current point
                        let gdp = if dir_is_gradient {
                            point.g_norm_2_sq
                        } else {
                            point.g.dot(dir)
                        };
                        let s1 = self.p[1].step;
                        -0.5 * (gdp * s1 * s1) / (self.p[1].f - self.p[0].f - gdp * s1)
                    } else {
                        -self.p[1].step
                    };
                    self.p[2] = self.candidate(problem, point, dir, step);
                }
                _ => {
                    let step = vertex(&self.p[..3]);
                    self.p[3] = self.candidate(problem, point, dir, step);
                    self.sort(4);
                    sorted = true;
                }
            }
        }
        if !sorted {
            self.sort((self.probes + 1).min(4));
        }
        if self.p[0].f < point.f {
            return self.p[0];
        }

        for _ in self.probes..MAX_PROBES {
            let step = vertex(&self.p[..3]);
            self.p[3] = self.candidate(problem, point, dir, step);
            self.sort(4);
            if self.p[0].f < point.f {
                return self.p[0];
            }
        }

        log::debug!(
            "[LineSearch] parabolic search stalled after {MAX_PROBES} probes (f = {:.6e})",
            point.f
        );
        Probe::stall(point.f)
    }
}
