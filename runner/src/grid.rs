use crate::{config::ProblemsConfig, problem::ProblemId, problem::ProblemType};
use itertools::iproduct;
use std::fmt;

/// one problem configuration: function x instance x dimension
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub function: ProblemId,
    pub instance: u32,
    pub dimension: usize,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "f{} i{} d{}",
            self.function, self.instance, self.dimension
        )
    }
}

/// The cartesian product of the configured axes.
///
/// Keys are enumerated function-major with the dimension varying fastest, i.e. in the order
/// of `functions x instances x dimensions`. Job indices start at 1 and follow this order.
#[derive(Clone, Debug)]
pub struct JobGrid {
    pub problem_type: ProblemType,
    pub functions: Vec<ProblemId>,
    pub instances: Vec<u32>,
    pub dimensions: Vec<usize>,
    /// runs per key, performed inside a single run context
    pub repetitions: usize,
}

impl JobGrid {
    pub fn new(problems: &ProblemsConfig, repetitions: usize) -> Self {
        Self {
            problem_type: problems.problem_type,
            functions: problems.functions.clone(),
            instances: problems.instances.clone(),
            dimensions: problems.dimensions.clone(),
            repetitions,
        }
    }

    /// lazily enumerate all keys, can be called any number of times
    pub fn iter(&self) -> impl Iterator<Item = JobKey> + '_ {
        iproduct!(
            self.functions.iter(),
            self.instances.iter(),
            self.dimensions.iter()
        )
        .map(|(function, instance, dimension)| JobKey {
            function: function.clone(),
            instance: *instance,
            dimension: *dimension,
        })
    }

    /// keys together with their job index
    pub fn jobs(&self) -> impl Iterator<Item = (usize, JobKey)> + '_ {
        self.iter().enumerate().map(|(index, key)| (index + 1, key))
    }

    pub fn len(&self) -> usize {
        self.functions.len() * self.instances.len() * self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> JobGrid {
        JobGrid {
            problem_type: ProblemType::Real,
            functions: vec![ProblemId::Id(1), "Rastrigin".into()],
            instances: vec![1, 2],
            dimensions: vec![5, 10],
            repetitions: 3,
        }
    }

    #[test]
    fn dimension_varies_fastest() {
        let keys = grid().iter().collect::<Vec<_>>();

        assert_eq!(keys.len(), 8);
        assert_eq!(
            keys[..3]
                .iter()
                .map(|key| (key.instance, key.dimension))
                .collect::<Vec<_>>(),
            vec![(1, 5), (1, 10), (2, 5)]
        );
        assert_eq!(keys[4].function, ProblemId::Name("Rastrigin".into()));
    }

    #[test]
    fn indices_start_at_one() {
        let grid = grid();
        let indices = grid.jobs().map(|(index, _)| index).collect::<Vec<_>>();

        assert_eq!(indices, (1..=grid.len()).collect::<Vec<_>>());
    }

    #[test]
    fn restartable() {
        let grid = grid();

        assert_eq!(grid.iter().collect::<Vec<_>>(), grid.iter().collect::<Vec<_>>());
    }

    #[test]
    fn empty_axis_means_no_jobs() {
        let grid = JobGrid {
            instances: vec![],
            ..grid()
        };

        assert!(grid.is_empty());
        assert_eq!(grid.iter().count(), 0);
    }
}
