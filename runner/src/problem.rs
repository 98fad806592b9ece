mod registry;
mod suites;

pub use registry::{ObjectiveFn, ProblemRegistry};

use crate::logger::{LogInfo, Logger};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::debug;

/// identifier of a problem inside its suite, either by number or by name
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum ProblemId {
    Id(u32),
    Name(String),
}

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u32> for ProblemId {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ProblemId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// search space family of a suite
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Real,
    Integer,
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => f.write_str("Real"),
            Self::Integer => f.write_str("Integer"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationType {
    Minimization,
    Maximization,
}

impl OptimizationType {
    /// true if `candidate` is strictly better than `reference`
    pub fn improves(&self, candidate: f64, reference: f64) -> bool {
        match self {
            Self::Minimization => candidate < reference,
            Self::Maximization => candidate > reference,
        }
    }

    /// worst possible value, used as the initial best-so-far
    pub fn initial(&self) -> f64 {
        match self {
            Self::Minimization => f64::INFINITY,
            Self::Maximization => f64::NEG_INFINITY,
        }
    }
}

/// identity of an instantiated problem
#[derive(Clone, Debug, PartialEq)]
pub struct MetaData {
    pub problem_id: u32,
    pub instance: u32,
    pub name: String,
    pub n_variables: usize,
    pub optimization_type: OptimizationType,
    pub problem_type: ProblemType,
}

/// box constraints shared by every coordinate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// sum of squared distances of `x` to the box, zero when inside
    pub fn violation(&self, x: &[f64]) -> f64 {
        x.iter()
            .map(|value| {
                if *value < self.lower {
                    (self.lower - value).powi(2)
                } else if *value > self.upper {
                    (value - self.upper).powi(2)
                } else {
                    0.0
                }
            })
            .sum()
    }
}

/// evaluation bookkeeping of the current run
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub evaluations: usize,
    pub current_y: f64,
    pub best_y: f64,
    pub best_x: Vec<f64>,
}

impl State {
    fn new(optimization_type: OptimizationType) -> Self {
        Self {
            evaluations: 0,
            current_y: f64::NAN,
            best_y: optimization_type.initial(),
            best_x: Vec::new(),
        }
    }
}

/// The problem contract consumed by the runner: a resettable objective with an identity
/// that loggers can be attached to.
pub trait Problem: Send {
    fn meta_data(&self) -> &MetaData;

    fn bounds(&self) -> Bounds;

    fn state(&self) -> &State;

    /// evaluate `x`, returning the (possibly penalized) objective value
    fn evaluate(&mut self, x: &[f64]) -> f64;

    /// end the current run and start a fresh one
    fn reset(&mut self);

    fn attach_logger(&mut self, logger: Box<dyn Logger>);

    fn detach_logger(&mut self) -> Option<Box<dyn Logger>>;

    fn logger_mut(&mut self) -> Option<&mut (dyn Logger + 'static)>;

    /// penalize out-of-bounds queries instead of evaluating them blindly
    fn enforce_bounds(&mut self, weight: f64);
}

/// pure objective function, as provided by a suite or wrapped from a closure
pub trait Objective: Send + Sync {
    fn evaluate(&self, x: &[f64]) -> f64;
}

/// the concrete problem handed to algorithms
pub struct BenchmarkProblem {
    meta: MetaData,
    bounds: Bounds,
    objective: Arc<dyn Objective>,
    state: State,
    logger: Option<Box<dyn Logger>>,
    penalty_weight: Option<f64>,
}

impl fmt::Debug for BenchmarkProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkProblem")
            .field("meta", &self.meta)
            .field("bounds", &self.bounds)
            .field("state", &self.state)
            .field("logged", &self.logger.is_some())
            .field("penalty_weight", &self.penalty_weight)
            .finish()
    }
}

impl BenchmarkProblem {
    pub fn new(meta: MetaData, bounds: Bounds, objective: Arc<dyn Objective>) -> Self {
        Self {
            state: State::new(meta.optimization_type),
            meta,
            bounds,
            objective,
            logger: None,
            penalty_weight: None,
        }
    }
}

impl Problem for BenchmarkProblem {
    fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn state(&self) -> &State {
        &self.state
    }

    fn evaluate(&mut self, x: &[f64]) -> f64 {
        let raw_y = self.objective.evaluate(x);

        let (violation, penalty) = match self.penalty_weight {
            Some(weight) => {
                let violation = self.bounds.violation(x);
                (violation, weight * violation)
            }
            None => (0.0, 0.0),
        };
        let y = match self.meta.optimization_type {
            OptimizationType::Minimization => raw_y + penalty,
            OptimizationType::Maximization => raw_y - penalty,
        };

        self.state.evaluations += 1;
        self.state.current_y = y;
        let has_improved = self
            .meta
            .optimization_type
            .improves(y, self.state.best_y);
        if has_improved {
            self.state.best_y = y;
            self.state.best_x = x.to_vec();
        }

        if let Some(logger) = self.logger.as_mut() {
            logger.log(&LogInfo {
                evaluations: self.state.evaluations,
                raw_y,
                y,
                best_y: self.state.best_y,
                has_improved,
                violation,
                penalty,
                x,
            });
        }

        y
    }

    fn reset(&mut self) {
        if let Some(logger) = self.logger.as_mut() {
            logger.reset();
        }

        debug!(
            problem = self.meta.problem_id,
            instance = self.meta.instance,
            evaluations = self.state.evaluations,
            "Resetting problem"
        );
        self.state = State::new(self.meta.optimization_type);
    }

    fn attach_logger(&mut self, mut logger: Box<dyn Logger>) {
        logger.attach_problem(&self.meta);
        self.logger = Some(logger);
    }

    fn detach_logger(&mut self) -> Option<Box<dyn Logger>> {
        self.logger.take()
    }

    fn logger_mut(&mut self) -> Option<&mut (dyn Logger + 'static)> {
        self.logger.as_deref_mut()
    }

    fn enforce_bounds(&mut self, weight: f64) {
        self.penalty_weight = Some(weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sum;

    impl Objective for Sum {
        fn evaluate(&self, x: &[f64]) -> f64 {
            x.iter().sum()
        }
    }

    fn problem(optimization_type: OptimizationType) -> BenchmarkProblem {
        BenchmarkProblem::new(
            MetaData {
                problem_id: 1,
                instance: 1,
                name: "Sum".into(),
                n_variables: 2,
                optimization_type,
                problem_type: ProblemType::Real,
            },
            Bounds::new(-1.0, 1.0),
            Arc::new(Sum),
        )
    }

    #[test]
    fn tracks_best_so_far() {
        let mut p = problem(OptimizationType::Minimization);
        p.evaluate(&[0.5, 0.5]);
        p.evaluate(&[-0.5, 0.0]);
        p.evaluate(&[1.0, 1.0]);

        assert_eq!(p.state().evaluations, 3);
        assert_eq!(p.state().best_y, -0.5);
        assert_eq!(p.state().best_x, vec![-0.5, 0.0]);
        assert_eq!(p.state().current_y, 2.0);
    }

    #[test]
    fn reset_starts_a_new_run() {
        let mut p = problem(OptimizationType::Maximization);
        p.evaluate(&[0.5, 0.5]);
        p.reset();

        assert_eq!(p.state().evaluations, 0);
        assert_eq!(p.state().best_y, f64::NEG_INFINITY);
    }

    #[test]
    fn enforced_bounds_penalize() {
        let mut p = problem(OptimizationType::Minimization);
        assert_eq!(p.evaluate(&[3.0, 0.0]), 3.0);

        p.enforce_bounds(2.0);
        // violation is (3 - 1)^2 = 4, weighted by 2
        assert_eq!(p.evaluate(&[3.0, 0.0]), 11.0);
        assert_eq!(p.evaluate(&[0.5, 0.0]), 0.5);

        let mut p = problem(OptimizationType::Maximization);
        p.enforce_bounds(1.0);
        assert_eq!(p.evaluate(&[-2.0, 0.0]), -3.0);
    }

    #[test]
    fn problem_id_from_yaml() {
        let ids: Vec<ProblemId> = serde_yaml::from_str("[1, Sphere]").unwrap();
        assert_eq!(ids, vec![ProblemId::Id(1), ProblemId::Name("Sphere".into())]);
    }
}
