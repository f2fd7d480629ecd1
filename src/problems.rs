//! Reference objectives.

use crate::problem::{Capabilities, Capability, Point, Problem};

/// `f(x) = Σ_{i=1..n} i (x_i - 1)²`, minimized at `x = 1` with `f = 0`.
#[derive(Debug, Clone)]
pub struct Quadratic {
    size: usize,
    lipschitz: bool,
}

impl Quadratic {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "quadratic needs at least one variable");
        Self {
            size,
            lipschitz: false,
        }
    }

    /// Advertises the Lipschitz constant `2n` of the gradient.
    pub fn with_lipschitz_constant(mut self) -> Self {
        self.lipschitz = true;
        self
    }
}

impl Problem for Quadratic {
    fn name(&self) -> &str {
        "Test quadratic problem"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn capabilities(&self) -> Capabilities {
        if self.lipschitz {
            Capabilities::gradient().with(Capability::LipschitzConstant)
        } else {
            Capabilities::gradient()
        }
    }

    fn lipschitz_constant(&self) -> f64 {
        if self.lipschitz {
            2.0 * self.size as f64
        } else {
            f64::NAN
        }
    }

    fn f(&mut self, point: &mut Point) {
        point.f = point
            .x
            .iter()
            .enumerate()
            .map(|(i, &x)| (i + 1) as f64 * (x - 1.0) * (x - 1.0))
            .sum();
    }

    fn df(&mut self, point: &mut Point) {
        for (i, (g, &x)) in point.g.iter_mut().zip(point.x.iter()).enumerate() {
            *g = 2.0 * (i + 1) as f64 * (x - 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use spectral::prelude::*;

    #[test]
    fn value_and_gradient() {
        let mut q = Quadratic::new(3);
        let mut p = Point::new(&q);
        p.x = array![0.0, 2.0, 1.5];
        q.f(&mut p);
        q.df(&mut p);
        // 1 * 1 + 2 * 1 + 3 * 0.25
        assert_that!(&p.f).is_close_to(3.75, 1e-15);
        assert_eq!(p.g, array![-2.0, 4.0, 3.0]);
    }

    #[test]
    fn lipschitz_constant_is_opt_in() {
        let plain = Quadratic::new(4);
        assert!(!plain.has(Capability::LipschitzConstant));
        assert!(plain.lipschitz_constant().is_nan());

        let with_l = Quadratic::new(4).with_lipschitz_constant();
        assert!(with_l.has(Capability::LipschitzConstant));
        assert_that!(&with_l.lipschitz_constant()).is_close_to(8.0, 0.0);
    }
}
