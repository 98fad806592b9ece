use super::{
    suites::{DimensionRule, SuiteEntry, BUILTIN},
    BenchmarkProblem, Bounds, MetaData, Objective, OptimizationType, ProblemId, ProblemType,
};
use crate::config::ConfigErrors;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// signature of a user supplied objective
pub type ObjectiveFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

struct Wrapped(ObjectiveFn);

impl Objective for Wrapped {
    fn evaluate(&self, x: &[f64]) -> f64 {
        (self.0)(x)
    }
}

#[derive(Clone)]
enum Source {
    Builtin(SuiteEntry),
    Custom {
        id: u32,
        name: String,
        problem_type: ProblemType,
        optimization_type: OptimizationType,
        bounds: Bounds,
        function: ObjectiveFn,
    },
}

impl Source {
    fn id(&self) -> u32 {
        match self {
            Self::Builtin(entry) => entry.id,
            Self::Custom { id, .. } => *id,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Builtin(entry) => entry.name,
            Self::Custom { name, .. } => name,
        }
    }

    fn problem_type(&self) -> ProblemType {
        match self {
            Self::Builtin(entry) => entry.problem_type,
            Self::Custom { problem_type, .. } => *problem_type,
        }
    }

    fn matches(&self, problem_type: ProblemType, id: &ProblemId) -> bool {
        self.problem_type() == problem_type
            && match id {
                ProblemId::Id(id) => self.id() == *id,
                ProblemId::Name(name) => self.name() == name,
            }
    }
}

/// Factory for problems, holding the built-in suites and any wrapped custom functions.
#[derive(Clone)]
pub struct ProblemRegistry {
    sources: Vec<Source>,
}

impl fmt::Debug for ProblemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.sources
                    .iter()
                    .map(|source| (source.problem_type(), source.id(), source.name())),
            )
            .finish()
    }
}

impl Default for ProblemRegistry {
    fn default() -> Self {
        Self {
            sources: BUILTIN.iter().copied().map(Source::Builtin).collect(),
        }
    }
}

impl ProblemRegistry {
    /// a registry without any built-in function
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// look up the numeric id of a registered name
    pub fn problem_id(&self, name: &str, problem_type: ProblemType) -> Option<u32> {
        let key = ProblemId::Name(name.to_string());

        self.sources
            .iter()
            .rev()
            .find(|source| source.matches(problem_type, &key))
            .map(Source::id)
    }

    /// register a custom objective; a name that is already wrapped is overridden and keeps its id
    pub fn wrap(
        &mut self,
        name: &str,
        problem_type: ProblemType,
        optimization_type: OptimizationType,
        bounds: Bounds,
        function: ObjectiveFn,
    ) -> u32 {
        let key = ProblemId::Name(name.to_string());
        let existing = self.sources.iter().position(|source| {
            matches!(source, Source::Custom { .. }) && source.matches(problem_type, &key)
        });

        let id = match existing {
            Some(index) => {
                warn!("Overriding previously wrapped problem {name}");
                self.sources.remove(index).id()
            }
            None => {
                self.sources
                    .iter()
                    .filter(|source| source.problem_type() == problem_type)
                    .map(Source::id)
                    .max()
                    .unwrap_or(0)
                    + 1
            }
        };

        debug!(id, name, %problem_type, "Wrapped custom problem");
        self.sources.push(Source::Custom {
            id,
            name: name.to_string(),
            problem_type,
            optimization_type,
            bounds,
            function,
        });

        id
    }

    /// check that `create` would succeed without building the objective
    pub fn validate(
        &self,
        problem_type: ProblemType,
        id: &ProblemId,
        dimension: usize,
    ) -> Result<(), ConfigErrors> {
        let source = self.find(problem_type, id)?;

        let rule = match source {
            Source::Builtin(entry) => entry.rule,
            Source::Custom { .. } => DimensionRule::Any,
        };

        match rule {
            _ if rule.accepts(dimension) => Ok(()),
            DimensionRule::PerfectSquare => Err(ConfigErrors::NonSquareDimension {
                problem: id.clone(),
                dimension,
            }),
            _ => Err(ConfigErrors::UnsupportedDimension {
                problem: id.clone(),
                dimension,
            }),
        }
    }

    pub fn create(
        &self,
        problem_type: ProblemType,
        id: &ProblemId,
        instance: u32,
        dimension: usize,
    ) -> Result<BenchmarkProblem, ConfigErrors> {
        self.validate(problem_type, id, dimension)?;

        Ok(match self.find(problem_type, id)? {
            Source::Builtin(entry) => BenchmarkProblem::new(
                MetaData {
                    problem_id: entry.id,
                    instance,
                    name: entry.name.to_string(),
                    n_variables: dimension,
                    optimization_type: entry.optimization_type,
                    problem_type,
                },
                entry.bounds,
                (entry.build)(instance, dimension),
            ),
            Source::Custom {
                id,
                name,
                optimization_type,
                bounds,
                function,
                ..
            } => BenchmarkProblem::new(
                MetaData {
                    problem_id: *id,
                    instance,
                    name: name.clone(),
                    n_variables: dimension,
                    optimization_type: *optimization_type,
                    problem_type,
                },
                *bounds,
                Arc::new(Wrapped(function.clone())),
            ),
        })
    }

    fn find(&self, problem_type: ProblemType, id: &ProblemId) -> Result<&Source, ConfigErrors> {
        // custom problems shadow built-in ones of the same name
        self.sources
            .iter()
            .rev()
            .find(|source| source.matches(problem_type, id))
            .ok_or_else(|| ConfigErrors::UnknownProblem {
                problem: id.clone(),
                problem_type,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Problem;

    #[test]
    fn create_by_id_and_name() {
        let registry = ProblemRegistry::default();
        let by_id = registry
            .create(ProblemType::Real, &ProblemId::Id(1), 1, 5)
            .unwrap();
        let by_name = registry
            .create(ProblemType::Real, &"Sphere".into(), 1, 5)
            .unwrap();

        assert_eq!(by_id.meta_data(), by_name.meta_data());
        assert_eq!(by_id.meta_data().name, "Sphere");
        assert_eq!(by_id.meta_data().n_variables, 5);
    }

    #[test]
    fn unknown_problem() {
        let registry = ProblemRegistry::default();

        assert!(matches!(
            registry.validate(ProblemType::Real, &ProblemId::Id(99), 5),
            Err(ConfigErrors::UnknownProblem { .. })
        ));
        assert!(matches!(
            registry.validate(ProblemType::Integer, &"Sphere".into(), 5),
            Err(ConfigErrors::UnknownProblem { .. })
        ));
    }

    #[test]
    fn dimension_rules() {
        let registry = ProblemRegistry::default();

        assert!(matches!(
            registry.validate(ProblemType::Integer, &ProblemId::Id(23), 10),
            Err(ConfigErrors::NonSquareDimension { dimension: 10, .. })
        ));
        assert!(registry
            .validate(ProblemType::Integer, &ProblemId::Id(23), 9)
            .is_ok());
        assert!(matches!(
            registry.validate(ProblemType::Real, &ProblemId::Id(1), 1),
            Err(ConfigErrors::UnsupportedDimension { .. })
        ));
    }

    #[test]
    fn wrapped_problems_get_fresh_ids() {
        let mut registry = ProblemRegistry::default();
        let id = registry.wrap(
            "Zero",
            ProblemType::Real,
            OptimizationType::Minimization,
            Bounds::new(-1.0, 1.0),
            Arc::new(|_: &[f64]| 0.0),
        );
        assert_eq!(id, 4);
        assert_eq!(registry.problem_id("Zero", ProblemType::Real), Some(4));

        let again = registry.wrap(
            "Zero",
            ProblemType::Real,
            OptimizationType::Minimization,
            Bounds::new(-1.0, 1.0),
            Arc::new(|x: &[f64]| x.len() as f64),
        );
        assert_eq!(again, 4);

        let mut problem = registry
            .create(ProblemType::Real, &ProblemId::Id(4), 1, 3)
            .unwrap();
        assert_eq!(problem.evaluate(&[0.0, 0.0, 0.0]), 3.0);
    }
}
