use super::{Accessors, Algorithm, AlgorithmError, Watch};
use crate::{
    config::AlgorithmConfig,
    problem::{Problem, ProblemType},
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Uniform random sampling inside the problem bounds, used by the command line runner.
#[derive(Clone, Debug)]
pub struct RandomSearch {
    budget: usize,
    rng: StdRng,
    best: f64,
    iteration: Watch,
}

impl RandomSearch {
    pub fn new(budget: usize, seed: u64) -> Self {
        Self {
            budget,
            rng: StdRng::seed_from_u64(seed),
            best: f64::NAN,
            iteration: Watch::default(),
        }
    }

    pub fn from_config(config: &AlgorithmConfig) -> Self {
        Self::new(config.budget, config.seed)
    }
}

impl Algorithm for RandomSearch {
    fn name(&self) -> String {
        "RandomSearch".to_string()
    }

    fn run(&mut self, problem: &mut dyn Problem) -> Result<(), AlgorithmError> {
        let bounds = problem.bounds();
        let meta = problem.meta_data().clone();

        if bounds.lower > bounds.upper {
            return Err(AlgorithmError::new(format!(
                "invalid bounds [{}, {}] for {}",
                bounds.lower, bounds.upper, meta.name
            )));
        }

        let mut x = vec![0.0; meta.n_variables];
        for iteration in 0..self.budget {
            for value in x.iter_mut() {
                *value = match meta.problem_type {
                    ProblemType::Real => self.rng.gen_range(bounds.lower..=bounds.upper),
                    ProblemType::Integer => f64::from(u8::from(self.rng.gen_bool(0.5))),
                };
            }

            problem.evaluate(&x);
            self.iteration.set(iteration as f64);
        }

        self.best = problem.state().best_y;

        Ok(())
    }

    fn accessors() -> Accessors<Self> {
        Accessors::<Self>::default()
            .run_attribute("best", |search| search.best)
            .run_attribute("budget", |search| search.budget as f64)
            .watched_attribute("iteration", |search| &search.iteration)
    }
}
