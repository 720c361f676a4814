//! Ordered filter chains.
//!
//! A chain owns no audio; it only fixes the order in which filters run on
//! one channel. Filter `i`'s output is filter `i + 1`'s input.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::Filter;

/// Execution time of one filter inside a chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTiming {
    /// Name reported by the filter.
    pub name: String,
    /// Wall-clock time spent in `apply`.
    pub elapsed: Duration,
}

/// Result of running a chain over one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    /// The processed samples.
    pub samples: Vec<f32>,
    /// Filter names joined by `_`, in execution order. Empty for an empty chain.
    pub tag: String,
    /// Per-filter execution times, in execution order.
    pub timings: Vec<FilterTiming>,
}

/// An ordered list of shared filters.
///
/// Filters are reference-counted so a common prefix can be cloned and
/// extended per output channel.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|flt| flt.name()))
            .finish()
    }
}

impl FilterChain {
    /// Creates an empty chain (the identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter.
    pub fn with_filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Appends an already shared filter.
    pub fn with_shared(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Appends a filter in place.
    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Runs every filter in order over `samples`.
    ///
    /// The input is never modified. An empty chain returns a copy of it.
    ///
    /// # Errors
    ///
    /// Propagates the first filter error unchanged.
    pub fn apply(&self, samples: &[f32]) -> Result<ChainOutput> {
        let mut current = samples.to_vec();
        let mut timings = Vec::with_capacity(self.filters.len());

        for filter in &self.filters {
            let start = Instant::now();
            current = filter.apply(&current)?;
            let elapsed = start.elapsed();

            tracing::debug!(
                filter = filter.name(),
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                output_len = current.len(),
                "Filter applied"
            );
            timings.push(FilterTiming {
                name: filter.name().to_string(),
                elapsed,
            });
        }

        Ok(ChainOutput {
            samples: current,
            tag: self.names().join("_"),
            timings,
        })
    }
}
