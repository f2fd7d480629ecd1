//! Optimization methods driven by [`crate::optimize`].

mod afgm;
mod agmsdr;
mod conjugate_gradient;
mod fgm;
mod gradient_descent;
mod lbfgs;
mod ufgm;

pub use afgm::Afgm;
pub use agmsdr::AgmsDr;
pub use conjugate_gradient::{Cg, CgVariant};
pub use fgm::Fgm;
pub use gradient_descent::Gdm;
pub use lbfgs::Lbfgs;
pub use ufgm::Ufgm;

use ndarray::Array1;

use crate::problem::{Point, Problem};
use crate::report::Column;

const LS_STEP: &str = "ls_step";
const PD_GAP: &str = "pd_gap";

/// Weighted running average of dual points and the resulting primal-dual gap.
///
/// Only used for reporting; it never feeds back into an iteration.
#[derive(Debug, Clone, Default)]
pub(crate) struct DualAverage {
    enabled: bool,
    dual: Point,
    sum: Array1<f64>,
    weight_sum: f64,
    gap: f64,
}

impl DualAverage {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn reset(&mut self, problem: &dyn Problem) {
        let size = problem.dual_size();
        self.dual = Point::with_size(size, false);
        self.sum = Array1::zeros(size);
        self.weight_sum = 0.0;
        self.gap = 0.0;
    }

    /// Adds the dual image of `point` with `weight` and recomputes the gap.
    pub(crate) fn update(&mut self, problem: &mut dyn Problem, point: &Point, weight: f64) {
        if !self.enabled {
            return;
        }
        problem.dual_x(point, &mut self.dual);
        self.weight_sum += weight;
        self.sum.scaled_add(weight, &self.dual.x);
        self.dual.x.assign(&self.sum);
        self.dual.x /= self.weight_sum;
        problem.dual_f(&mut self.dual);
        self.gap = point.f + self.dual.f;
    }

    pub(crate) fn push_column(&self, columns: &mut Vec<Column>) {
        if self.enabled {
            columns.push(Column::new(PD_GAP, self.gap));
        }
    }

    pub(crate) fn gap(&self) -> f64 {
        self.gap
    }
}

/// `dst = src * scale`, reusing `dst`'s buffer.
pub(crate) fn scaled_copy(dst: &mut Array1<f64>, scale: f64, src: &Array1<f64>) {
    dst.zip_mut_with(src, |d, &s| *d = scale * s);
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Capabilities;
    use ndarray::array;
    use spectral::prelude::*;

    /// Primal `f(x) = x^2`; dual image `-x^2` so the gap vanishes at every point.
    struct SelfDual;

    impl Problem for SelfDual {
        fn name(&self) -> &str {
            "self dual"
        }
        fn size(&self) -> usize {
            1
        }
        fn dual_size(&self) -> usize {
            1
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::gradient()
        }
        fn f(&mut self, point: &mut Point) {
            point.f = point.x[0] * point.x[0];
        }
        fn df(&mut self, point: &mut Point) {
            point.g[0] = 2.0 * point.x[0];
        }
        fn dual_x(&mut self, point: &Point, dual: &mut Point) {
            dual.x[0] = point.x[0];
        }
        fn dual_f(&mut self, dual: &mut Point) {
            dual.f = -dual.x[0] * dual.x[0];
        }
    }

    #[test]
    fn dual_average_is_weighted() {
        let mut problem = SelfDual;
        let mut avg = DualAverage::new(true);
        avg.reset(&problem);

        let mut point = Point::with_size(1, true);
        point.x[0] = 2.0;
        point.f = 4.0;
        avg.update(&mut problem, &point, 1.0);
        assert_that!(&avg.gap()).is_close_to(0.0, 1e-15);

        point.x[0] = 0.0;
        point.f = 0.0;
        avg.update(&mut problem, &point, 3.0);
        // averaged dual x = (2 * 1 + 0 * 3) / 4 = 0.5
        assert_that!(&avg.gap()).is_close_to(-0.25, 1e-15);

        let mut columns = Vec::new();
        avg.push_column(&mut columns);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "pd_gap");
    }

    #[test]
    fn disabled_dual_average_stays_silent() {
        let mut problem = SelfDual;
        let mut avg = DualAverage::new(false);
        avg.reset(&problem);
        let point = Point::with_size(1, true);
        avg.update(&mut problem, &point, 1.0);
        let mut columns = Vec::new();
        avg.push_column(&mut columns);
        assert!(columns.is_empty());
        assert_eq!(avg.gap(), 0.0);
    }

    #[test]
    fn scaled_copy_overwrites() {
        let mut dst = array![9.0, 9.0];
        scaled_copy(&mut dst, -0.5, &array![2.0, -4.0]);
        assert_eq!(dst, array![-1.0, 2.0]);
    }
}
