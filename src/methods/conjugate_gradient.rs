use std::fmt;

use ndarray::Array1;

use crate::driver::{IterationOutcome, Method};
use crate::line_search::{LineSearch, Probe};
use crate::problem::{Capabilities, Point, Problem};
use crate::report::Column;

use super::{LS_STEP, scaled_copy};

/// Conjugation formula for the β coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CgVariant {
    /// Hestenes-Stiefel: `y·g / y·s`.
    Hs,
    /// Fletcher-Reeves: `|g|² / |g_prev|²`.
    Fr,
    /// Polak-Ribière-Polyak: `y·g / |g_prev|²`.
    Prp,
    /// PRP clamped at zero.
    PrpPlus,
    /// Fletcher's conjugate descent: `-|g|² / g_prev·d_prev`.
    Cd,
    /// Liu-Storey: `-y·g / g_prev·d_prev`.
    Ls,
    /// Dai-Yuan: `|g|² / y·s`.
    Dy,
}

// Which history vectors a variant reads, and whether the new direction mixes against the
// position difference `s` instead of the previous direction.
struct VariantTraits {
    name: &'static str,
    uses_y: bool,
    uses_s: bool,
    uses_g_prev: bool,
    dir_by_s: bool,
}

const fn traits(
    name: &'static str,
    uses_y: bool,
    uses_s: bool,
    uses_g_prev: bool,
    dir_by_s: bool,
) -> VariantTraits {
    VariantTraits {
        name,
        uses_y,
        uses_s,
        uses_g_prev,
        dir_by_s,
    }
}

// Indexed by `CgVariant as usize`.
static VARIANT_TRAITS: [VariantTraits; 7] = [
    traits("HS", true, true, false, true),
    traits("FR", false, false, false, false),
    traits("PRP", true, false, false, false),
    traits("PRP+", true, false, false, false),
    traits("CD", false, false, true, false),
    traits("LS", true, false, true, false),
    traits("DY", true, true, false, true),
];

impl CgVariant {
    pub const ALL: [CgVariant; 7] = [
        CgVariant::Hs,
        CgVariant::Fr,
        CgVariant::Prp,
        CgVariant::PrpPlus,
        CgVariant::Cd,
        CgVariant::Ls,
        CgVariant::Dy,
    ];

    fn traits(self) -> &'static VariantTraits {
        &VARIANT_TRAITS[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.traits().name
    }
}

impl fmt::Display for CgVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nonlinear conjugate gradients with periodic restarts along the anti-gradient.
#[derive(Debug, Clone)]
pub struct Cg<L> {
    variant: CgVariant,
    name: String,
    ls: L,
    ls_start_step: f64,
    ls_step: f64,
    restart_interval: usize,
    iterations: usize,
    restart: bool,

    g_norm_prev: f64,
    dir: Array1<f64>,
    dir_prev: Array1<f64>,
    dir_unit: Array1<f64>,
    y: Array1<f64>,
    s: Array1<f64>,
    g_prev: Array1<f64>,
}

impl<L: LineSearch> Cg<L> {
    pub fn new(variant: CgVariant, ls: L) -> Self {
        Self {
            variant,
            name: format!("CG_{variant}"),
            ls,
            ls_start_step: 1.0,
            ls_step: 1.0,
            restart_interval: 100,
            iterations: 0,
            restart: true,
            g_norm_prev: f64::NAN,
            dir: Array1::zeros(0),
            dir_prev: Array1::zeros(0),
            dir_unit: Array1::zeros(0),
            y: Array1::zeros(0),
            s: Array1::zeros(0),
            g_prev: Array1::zeros(0),
        }
    }

    /// Number of iterations between forced restarts (default: 100).
    pub fn with_restart_interval(mut self, interval: usize) -> Self {
        assert!(interval > 0, "restart interval must be positive");
        self.restart_interval = interval;
        self
    }

    pub fn variant(&self) -> CgVariant {
        self.variant
    }

    fn beta(&self, point: &Point) -> f64 {
        let g = &point.g;
        let g_sq = point.g_norm_2_sq;
        let g_prev_sq = self.g_norm_prev * self.g_norm_prev;
        match self.variant {
            CgVariant::Hs => self.y.dot(g) / self.y.dot(&self.s),
            CgVariant::Fr => g_sq / g_prev_sq,
            CgVariant::Prp => self.y.dot(g) / g_prev_sq,
            CgVariant::PrpPlus => (self.y.dot(g) / g_prev_sq).max(0.0),
            CgVariant::Cd => -g_sq / self.g_prev.dot(&self.dir_prev),
            CgVariant::Ls => -self.y.dot(g) / self.g_prev.dot(&self.dir_prev),
            CgVariant::Dy => g_sq / self.y.dot(&self.s),
        }
    }

    fn compute_direction(&mut self, point: &Point) {
        scaled_copy(&mut self.dir, -1.0, &point.g);
        if self.restart {
            return;
        }
        let beta = self.beta(point);
        if self.variant.traits().dir_by_s {
            self.dir.scaled_add(beta, &self.s);
        } else {
            self.dir.scaled_add(beta, &self.dir_prev);
        }
    }

    // Snapshots the quantities the next β needs from the point before it moves.
    fn remember(&mut self, point: &Point) {
        let traits = self.variant.traits();
        self.dir_prev.assign(&self.dir);
        self.g_norm_prev = point.g_norm_2;
        if traits.uses_s {
            self.s.assign(&point.x);
        }
        if traits.uses_y {
            self.y.assign(&point.g);
        }
        if traits.uses_g_prev {
            self.g_prev.assign(&point.g);
        }
    }

    // Turns the snapshots into differences once the point has moved.
    fn differences(&mut self, point: &Point) {
        let traits = self.variant.traits();
        if traits.uses_s {
            self.s.zip_mut_with(&point.x, |s, &x| *s = x - *s);
        }
        if traits.uses_y {
            self.y.zip_mut_with(&point.g, |y, &g| *y = g - *y);
        }
    }

    fn step(&mut self, problem: &mut dyn Problem, point: &Point) -> Probe {
        self.compute_direction(point);
        self.remember(point);
        let norm = self.dir.dot(&self.dir).sqrt();
        scaled_copy(&mut self.dir_unit, 1.0 / norm, &self.dir);
        self.ls
            .search(problem, point, &self.dir_unit, false, self.ls_step)
    }
}

impl<L: LineSearch> Method for Cg<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> Capabilities {
        Capabilities::gradient()
    }

    fn setup(&mut self, problem: &mut dyn Problem, _point: &mut Point) {
        self.ls.setup(problem);
        self.ls_step = self.ls_start_step;
        self.iterations = 0;
        self.g_norm_prev = f64::NAN;

        let n = problem.size();
        let traits = self.variant.traits();
        let sized = |used: bool| Array1::zeros(if used { n } else { 0 });
        self.dir = Array1::zeros(n);
        self.dir_prev = Array1::zeros(n);
        self.dir_unit = Array1::zeros(n);
        self.s = sized(traits.uses_s);
        self.y = sized(traits.uses_y);
        self.g_prev = sized(traits.uses_g_prev);
    }

    fn iteration(
        &mut self,
        problem: &mut dyn Problem,
        point: &mut Point,
        _iter: usize,
    ) -> IterationOutcome {
        self.restart = self.iterations % self.restart_interval == 0;
        self.iterations += 1;

        let mut probe = self.step(problem, point);
        if probe.is_stall() {
            if self.restart {
                log::debug!("[{}] line search stalled along the anti-gradient", self.name);
                return IterationOutcome::NoProgress;
            }
            log::debug!(
                "[{}] line search stalled, restarting from the anti-gradient",
                self.name
            );
            self.restart = true;
            self.ls_step = self.ls_start_step;
            probe = self.step(problem, point);
            if probe.is_stall() {
                return IterationOutcome::NoProgress;
            }
        }

        self.ls_step = probe.step;
        point.f = probe.f;
        point.x.scaled_add(probe.step, &self.dir_unit);
        problem.df(point);
        self.differences(point);
        IterationOutcome::Continue
    }

    fn extra_columns(&self, columns: &mut Vec<Column>) {
        columns.push(Column::new(LS_STEP, self.ls_step));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RunSettings;
    use crate::line_search::Heuristic;
    use crate::methods::testing::{is_monotone, trace};
    use crate::problems::Quadratic;
    use ndarray::array;
    use spectral::prelude::*;

    #[test]
    fn variant_names() {
        let names: Vec<String> = CgVariant::ALL
            .iter()
            .map(|v| Cg::new(*v, Heuristic::new()).name().to_owned())
            .collect();
        assert_eq!(
            names,
            ["CG_HS", "CG_FR", "CG_PRP", "CG_PRP+", "CG_CD", "CG_LS", "CG_DY"]
        );
    }

    #[test]
    fn history_table_matches_formulas() {
        for variant in CgVariant::ALL {
            let t = variant.traits();
            // mixing against s needs s, and both s-based formulas divide by y·s
            if t.dir_by_s {
                assert!(t.uses_s && t.uses_y, "{variant}");
            }
            let needs_g_prev = matches!(variant, CgVariant::Cd | CgVariant::Ls);
            assert_eq!(t.uses_g_prev, needs_g_prev, "{variant}");
        }
    }

    #[test]
    fn every_variant_is_monotone_on_quadratic() {
        for variant in CgVariant::ALL {
            let mut problem = Quadratic::new(5);
            let settings = RunSettings::default()
                .with_min_gradient_norm(1e-6)
                .with_max_iterations(2_000);
            let run = trace(&mut Cg::new(variant, Heuristic::new()), &mut problem, &settings);

            assert!(is_monotone(&run.values), "{variant} is not monotone");
            let first = run.values[0];
            assert_that!(&run.point.f).is_less_than(first * 1e-3);
        }
    }

    #[test]
    fn restart_direction_is_anti_gradient() {
        let mut cg = Cg::new(CgVariant::Fr, Heuristic::new());
        let mut problem = Quadratic::new(2);
        let mut point = Point::new(&problem);
        problem.f(&mut point);
        problem.df(&mut point);
        point.refresh_gradient_norms();
        cg.setup(&mut problem, &mut point);

        cg.restart = true;
        cg.compute_direction(&point);
        assert_eq!(cg.dir, point.g.mapv(|v| -v));
    }

    #[test]
    fn fletcher_reeves_mixes_previous_direction() {
        let mut cg = Cg::new(CgVariant::Fr, Heuristic::new());
        let mut problem = Quadratic::new(2);
        let mut point = Point::new(&problem);
        cg.setup(&mut problem, &mut point);

        point.g = array![1.0, 0.0];
        point.refresh_gradient_norms();
        cg.g_norm_prev = 2.0;
        cg.dir_prev = array![0.0, 4.0];
        cg.restart = false;
        cg.compute_direction(&point);
        // beta = 1 / 4
        assert_eq!(cg.dir, array![-1.0, 1.0]);
    }

    #[test]
    fn restart_interval_is_configurable() {
        let cg = Cg::new(CgVariant::Hs, Heuristic::new()).with_restart_interval(5);
        assert_eq!(cg.restart_interval, 5);
        assert_eq!(cg.variant(), CgVariant::Hs);
    }
}
