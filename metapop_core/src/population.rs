//! SIR population triple and its arithmetic.

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, SubAssign};

/// Susceptible / Infected / Removed head counts of one city.
///
/// Plain value type. Migration moves mass between populations with a paired
/// `-=` / `+=`, so `N()` summed over all cities is conserved by migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct Population {
    /// Susceptible
    pub S: f64,

    /// Infected
    pub I: f64,

    /// Removed
    pub R: f64,
}

#[allow(non_snake_case)]
impl Population {
    /// Creates a population from its three compartments.
    pub fn new(S: f64, I: f64, R: f64) -> Self {
        Self { S, I, R }
    }

    /// Total head count S + I + R.
    pub fn N(&self) -> f64 {
        self.S + self.I + self.R
    }

    /// Returns true if every compartment is finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [self.S, self.I, self.R]
            .iter()
            .all(|c| c.is_finite() && *c >= 0.0)
    }
}

impl Add for Population {
    type Output = Population;

    fn add(self, rhs: Population) -> Population {
        Population::new(self.S + rhs.S, self.I + rhs.I, self.R + rhs.R)
    }
}

impl AddAssign for Population {
    fn add_assign(&mut self, rhs: Population) {
        self.S += rhs.S;
        self.I += rhs.I;
        self.R += rhs.R;
    }
}

impl SubAssign for Population {
    fn sub_assign(&mut self, rhs: Population) {
        self.S -= rhs.S;
        self.I -= rhs.I;
        self.R -= rhs.R;
    }
}

impl Mul<Population> for f64 {
    type Output = Population;

    fn mul(self, rhs: Population) -> Population {
        Population::new(self * rhs.S, self * rhs.I, self * rhs.R)
    }
}

impl Sum for Population {
    fn sum<I: Iterator<Item = Population>>(iter: I) -> Population {
        iter.fold(Population::default(), |acc, p| acc + p)
    }
}

impl std::fmt::Display for Population {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S={:.3} I={:.3} R={:.3} (N={:.3})", self.S, self.I, self.R, self.N())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_arithmetic_is_componentwise() {
        let a = Population::new(10.0, 2.0, 1.0);
        let b = Population::new(1.0, 1.0, 3.0);

        assert_eq!(a + b, Population::new(11.0, 3.0, 4.0));
        assert_eq!(0.5 * a, Population::new(5.0, 1.0, 0.5));

        let mut c = a;
        c += b;
        c -= b;
        assert_eq!(c, a);
    }

    #[test]
    fn test_paired_debit_credit_conserves_mass() {
        let mut source = Population::new(900.0, 80.0, 20.0);
        let mut target = Population::new(50.0, 0.0, 0.0);
        let before = source.N() + target.N();

        let packet = 0.12 * source;
        source -= packet;
        target += packet;

        assert_relative_eq!(source.N() + target.N(), before, epsilon = 1e-9);
        assert!(source.is_valid() && target.is_valid());
    }

    #[test]
    fn test_sum_and_n() {
        let total: Population = vec![
            Population::new(1.0, 2.0, 3.0),
            Population::new(4.0, 5.0, 6.0),
        ]
        .into_iter()
        .sum();
        assert_eq!(total, Population::new(5.0, 7.0, 9.0));
        assert_eq!(total.N(), 21.0);
        assert_eq!(Population::default().N(), 0.0);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(Population::new(999.0, 1.0, 0.0)).unwrap();
        assert_eq!(json, serde_json::json!({"S": 999.0, "I": 1.0, "R": 0.0}));

        let back: Population = serde_json::from_value(json).unwrap();
        assert_eq!(back, Population::new(999.0, 1.0, 0.0));
    }

    #[test]
    fn test_json_roundtrip_is_bit_exact() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);

        for _ in 0..10_000 {
            let p = Population::new(
                rng.gen_range(0.0..50000.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..10.0),
            );
            let back: Population = serde_json::from_str(&serde_json::to_string(&p).unwrap()).unwrap();
            assert_eq!(
                [back.S.to_bits(), back.I.to_bits(), back.R.to_bits()],
                [p.S.to_bits(), p.I.to_bits(), p.R.to_bits()],
                "{} came back as {}",
                p,
                back
            );
        }
    }

    #[test]
    fn test_negative_compartment_is_invalid() {
        assert!(!Population::new(-1.0, 0.0, 0.0).is_valid());
        assert!(!Population::new(f64::NAN, 0.0, 0.0).is_valid());
    }
}
