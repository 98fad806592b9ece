//! Built-in reference suites. Only a handful of classic functions are provided; their
//! instance transformations are deliberately simple (a seeded shift or bit mask).

use super::{Bounds, Objective, OptimizationType, ProblemType};
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

/// rule on the dimension a suite function accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionRule {
    Any,
    AtLeast(usize),
    PerfectSquare,
}

impl DimensionRule {
    pub fn accepts(&self, dimension: usize) -> bool {
        match self {
            Self::Any => dimension > 0,
            Self::AtLeast(min) => dimension >= *min,
            Self::PerfectSquare => {
                let root = (dimension as f64).sqrt().round() as usize;
                dimension > 0 && root * root == dimension
            }
        }
    }
}

pub type Builder = fn(u32, usize) -> Arc<dyn Objective>;

/// static description of one built-in function
#[derive(Clone, Copy, Debug)]
pub struct SuiteEntry {
    pub id: u32,
    pub name: &'static str,
    pub problem_type: ProblemType,
    pub optimization_type: OptimizationType,
    pub bounds: Bounds,
    pub rule: DimensionRule,
    pub build: Builder,
}

fn real(id: u32, name: &'static str, build: Builder) -> SuiteEntry {
    SuiteEntry {
        id,
        name,
        problem_type: ProblemType::Real,
        optimization_type: OptimizationType::Minimization,
        bounds: Bounds::new(-5.0, 5.0),
        rule: DimensionRule::AtLeast(2),
        build,
    }
}

fn integer(id: u32, name: &'static str, rule: DimensionRule, build: Builder) -> SuiteEntry {
    SuiteEntry {
        id,
        name,
        problem_type: ProblemType::Integer,
        optimization_type: OptimizationType::Maximization,
        bounds: Bounds::new(0.0, 1.0),
        rule,
        build,
    }
}

pub static BUILTIN: Lazy<Vec<SuiteEntry>> = Lazy::new(|| {
    vec![
        real(1, "Sphere", |instance, dimension| {
            Arc::new(Sphere(Shift::new(1, instance, dimension)))
        }),
        real(2, "Ellipsoid", |instance, dimension| {
            Arc::new(Ellipsoid(Shift::new(2, instance, dimension)))
        }),
        real(3, "Rastrigin", |instance, dimension| {
            Arc::new(Rastrigin(Shift::new(3, instance, dimension)))
        }),
        integer(1, "OneMax", DimensionRule::Any, |instance, dimension| {
            Arc::new(OneMax(Mask::new(1, instance, dimension)))
        }),
        integer(2, "LeadingOnes", DimensionRule::Any, |instance, dimension| {
            Arc::new(LeadingOnes(Mask::new(2, instance, dimension)))
        }),
        integer(23, "NQueens", DimensionRule::PerfectSquare, |_, dimension| {
            Arc::new(NQueens::new(dimension))
        }),
    ]
});

fn instance_rng(function: u32, instance: u32) -> StdRng {
    StdRng::seed_from_u64(u64::from(function) * 10_000 + u64::from(instance))
}

/// optimum location of a real-valued instance; instance 1 is unshifted
#[derive(Debug)]
struct Shift(Vec<f64>);

impl Shift {
    fn new(function: u32, instance: u32, dimension: usize) -> Self {
        if instance <= 1 {
            return Self(vec![0.0; dimension]);
        }

        let mut rng = instance_rng(function, instance);
        Self((0..dimension).map(|_| rng.gen_range(-4.0..4.0)).collect())
    }

    fn apply<'a>(&'a self, x: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
        x.iter().zip(self.0.iter()).map(|(x, shift)| x - shift)
    }
}

#[derive(Debug)]
struct Sphere(Shift);

impl Objective for Sphere {
    fn evaluate(&self, x: &[f64]) -> f64 {
        self.0.apply(x).map(|z| z * z).sum()
    }
}

#[derive(Debug)]
struct Ellipsoid(Shift);

impl Objective for Ellipsoid {
    fn evaluate(&self, x: &[f64]) -> f64 {
        let n = x.len().max(2) as f64;

        self.0
            .apply(x)
            .enumerate()
            .map(|(i, z)| 10f64.powf(6.0 * i as f64 / (n - 1.0)) * z * z)
            .sum()
    }
}

#[derive(Debug)]
struct Rastrigin(Shift);

impl Objective for Rastrigin {
    fn evaluate(&self, x: &[f64]) -> f64 {
        let n = x.len() as f64;

        10.0 * n
            + self
                .0
                .apply(x)
                .map(|z| z * z - 10.0 * (2.0 * std::f64::consts::PI * z).cos())
                .sum::<f64>()
    }
}

/// xor mask of a pseudo-boolean instance; instance 1 is unmasked
#[derive(Debug)]
struct Mask(Vec<bool>);

impl Mask {
    fn new(function: u32, instance: u32, dimension: usize) -> Self {
        if instance <= 1 {
            return Self(vec![false; dimension]);
        }

        let mut rng = instance_rng(function, instance);
        Self((0..dimension).map(|_| rng.gen_bool(0.5)).collect())
    }

    fn apply<'a>(&'a self, x: &'a [f64]) -> impl Iterator<Item = bool> + 'a {
        x.iter()
            .zip(self.0.iter())
            .map(|(x, flip)| (*x >= 0.5) ^ flip)
    }
}

#[derive(Debug)]
struct OneMax(Mask);

impl Objective for OneMax {
    fn evaluate(&self, x: &[f64]) -> f64 {
        self.0.apply(x).filter(|bit| *bit).count() as f64
    }
}

#[derive(Debug)]
struct LeadingOnes(Mask);

impl Objective for LeadingOnes {
    fn evaluate(&self, x: &[f64]) -> f64 {
        self.0.apply(x).take_while(|bit| *bit).count() as f64
    }
}

/// queens on an n x n board, penalized per conflicting pair
#[derive(Debug)]
struct NQueens {
    n: usize,
}

impl NQueens {
    fn new(dimension: usize) -> Self {
        Self {
            n: (dimension as f64).sqrt().round() as usize,
        }
    }
}

impl Objective for NQueens {
    fn evaluate(&self, x: &[f64]) -> f64 {
        let queens: Vec<(i64, i64)> = x
            .iter()
            .enumerate()
            .filter(|(_, value)| **value >= 0.5)
            .map(|(i, _)| ((i / self.n) as i64, (i % self.n) as i64))
            .collect();

        let mut conflicts = 0usize;
        for (a, (ra, ca)) in queens.iter().enumerate() {
            for (rb, cb) in queens.iter().skip(a + 1) {
                if ra == rb || ca == cb || (ra - rb).abs() == (ca - cb).abs() {
                    conflicts += 1;
                }
            }
        }

        queens.len() as f64 - (self.n as f64) * conflicts as f64
    }
}
