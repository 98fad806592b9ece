mod random_search;

pub use random_search::RandomSearch;

use crate::problem::Problem;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;

/// error raised by an algorithm during a run, aborts the remaining runs of its job
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct AlgorithmError(pub String);

impl AlgorithmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An optimizer benchmarked by the runner. Every job works on its own clone, so
/// implementations may freely mutate `self` during a run.
pub trait Algorithm: Clone + Send + Sync {
    fn name(&self) -> String;

    fn run(&mut self, problem: &mut dyn Problem) -> Result<(), AlgorithmError>;

    /// attributes this algorithm exposes for tracking
    fn accessors() -> Accessors<Self>
    where
        Self: Sized,
    {
        Accessors::default()
    }
}

/// Explicit registration of trackable attributes, replacing lookups by name at runtime.
pub struct Accessors<A> {
    run: BTreeMap<String, fn(&A) -> f64>,
    watched: BTreeMap<String, fn(&A) -> &Watch>,
}

impl<A> Default for Accessors<A> {
    fn default() -> Self {
        Self {
            run: BTreeMap::new(),
            watched: BTreeMap::new(),
        }
    }
}

impl<A> fmt::Debug for Accessors<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessors")
            .field("run", &self.run.keys().collect::<Vec<_>>())
            .field("watched", &self.watched.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<A> Accessors<A> {
    /// register an attribute read once at the end of every run
    pub fn run_attribute(mut self, name: &str, accessor: fn(&A) -> f64) -> Self {
        self.run.insert(name.to_string(), accessor);
        self
    }

    /// register an attribute sampled whenever the logger writes a row
    pub fn watched_attribute(mut self, name: &str, accessor: fn(&A) -> &Watch) -> Self {
        self.watched.insert(name.to_string(), accessor);
        self
    }

    pub fn has_run_attribute(&self, name: &str) -> bool {
        self.run.contains_key(name)
    }

    pub fn has_watched_attribute(&self, name: &str) -> bool {
        self.watched.contains_key(name)
    }

    /// read the given run attributes, unknown names are skipped
    pub fn read_run_attributes(&self, algorithm: &A, names: &[String]) -> BTreeMap<String, f64> {
        names
            .iter()
            .filter_map(|name| {
                self.run
                    .get(name)
                    .map(|accessor| (name.clone(), accessor(algorithm)))
            })
            .collect()
    }

    /// handles on the given watched attributes, unknown names are skipped
    pub fn watch_handles(&self, algorithm: &A, names: &[String]) -> Vec<(String, WatchHandle)> {
        names
            .iter()
            .filter_map(|name| {
                self.watched
                    .get(name)
                    .map(|accessor| (name.clone(), accessor(algorithm).handle()))
            })
            .collect()
    }
}

/// A value an algorithm updates while it runs and the logger samples.
///
/// Cloning a `Watch` creates an independent cell holding the current value, so cloned
/// algorithms never share state. Observers use a [`WatchHandle`] instead.
#[derive(Debug, Default)]
pub struct Watch(Arc<AtomicU64>);

impl Watch {
    pub fn new(value: f64) -> Self {
        Self(Arc::new(AtomicU64::new(value.to_bits())))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn handle(&self) -> WatchHandle {
        WatchHandle(Arc::clone(&self.0))
    }
}

impl Clone for Watch {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// read-only view on a [`Watch`]
#[derive(Debug, Clone)]
pub struct WatchHandle(Arc<AtomicU64>);

impl WatchHandle {
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Counter {
        calls: usize,
        step: Watch,
    }

    #[test]
    fn clones_do_not_share_watches() {
        let original = Watch::new(1.0);
        let handle = original.handle();
        let copy = original.clone();

        copy.set(5.0);
        assert_eq!(handle.get(), 1.0);

        original.set(2.0);
        assert_eq!(handle.get(), 2.0);
        assert_eq!(copy.get(), 5.0);
    }

    #[test]
    fn accessors_read_registered_names() {
        let accessors = Accessors::<Counter>::default()
            .run_attribute("calls", |counter| counter.calls as f64)
            .watched_attribute("step", |counter| &counter.step);
        let counter = Counter {
            calls: 3,
            step: Watch::new(0.5),
        };

        assert!(accessors.has_run_attribute("calls"));
        assert!(!accessors.has_run_attribute("step"));
        assert!(accessors.has_watched_attribute("step"));

        let values =
            accessors.read_run_attributes(&counter, &["calls".to_string(), "nope".to_string()]);
        assert_eq!(values, BTreeMap::from([("calls".to_string(), 3.0)]));

        let handles = accessors.watch_handles(&counter, &["step".to_string()]);
        counter.step.set(0.75);
        assert_eq!(handles[0].0, "step");
        assert_eq!(handles[0].1.get(), 0.75);
    }
}
