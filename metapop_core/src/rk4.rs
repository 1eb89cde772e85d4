//! Runge-Kutta 4 solver for the SIR equations.
//!
//! ```text
//! dS/dt = -x          x = beta * I * S / N
//! dI/dt =  x - y      y = alpha * I
//! dR/dt =  y
//! ```

use crate::population::Population;

/// Stateless RK4 integrator.
pub struct Rk4;

impl Rk4 {
    /// SIR derivative at `population`.
    ///
    /// A population with `N <= 0` has a zero derivative, so the empty city
    /// is a fixed point instead of a division by zero.
    pub fn derivative(alpha: f64, beta: f64, population: &Population) -> Population {
        let n = population.N();
        if n <= 0.0 {
            return Population::default();
        }
        let x = beta * population.I * population.S / n;
        let y = alpha * population.I;
        Population::new(-x, x - y, y)
    }

    /// Advances `population` by one step of size `h`.
    ///
    /// Pure function of its inputs: identical inputs give bit-identical
    /// outputs.
    pub fn solve(alpha: f64, beta: f64, h: f64, population: &Population) -> Population {
        let p = *population;
        let k1 = Self::derivative(alpha, beta, &p);
        let k2 = Self::derivative(alpha, beta, &(p + (h / 2.0) * k1));
        let k3 = Self::derivative(alpha, beta, &(p + (h / 2.0) * k2));
        let k4 = Self::derivative(alpha, beta, &(p + h * k3));

        p + (h / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4)
    }
}
