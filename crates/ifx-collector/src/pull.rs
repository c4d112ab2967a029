//! Pull interface for metrics consumers.
//!
//! [`PullInterface`] is the read side of the registry: it describes every
//! known series and collects current samples on demand. Reads may run
//! concurrently with a scrape cycle and observe a partially updated cycle.
//!
//! # Example
//!
//! ```rust
//! use ifx_collector::{MetricRegistry, PullInterface};
//!
//! let registry = MetricRegistry::new();
//! let pull = PullInterface::new(registry.clone());
//!
//! registry.set("pf_isreads", "ol_prod", 42.0);
//!
//! assert!(pull.describe().any(|d| d.counter == "pf_isreads"));
//! assert_eq!(pull.collect().count(), 1);
//!
//! let output = pull.encode();
//! assert!(output.contains("informix_pf_isreads"));
//! ```

use crate::registry::{MetricRegistry, Sample, SeriesDescriptor};

/// Read-only view of a [`MetricRegistry`].
#[derive(Debug, Clone)]
pub struct PullInterface {
    registry: MetricRegistry,
}

impl PullInterface {
    /// Creates a pull interface over the given registry.
    #[must_use]
    pub const fn new(registry: MetricRegistry) -> Self {
        Self { registry }
    }

    /// Describes every known series, whether or not it has a value.
    pub fn describe(&self) -> impl Iterator<Item = SeriesDescriptor> + '_ {
        self.registry.describe()
    }

    /// Collects every sample that has been observed at least once.
    pub fn collect(&self) -> impl Iterator<Item = Sample> + '_ {
        self.registry.collect()
    }

    /// Encodes all series in Prometheus text format.
    ///
    /// This output can be served directly from a `/metrics` HTTP endpoint.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if self.registry.encode_into(&mut buffer).is_err() {
            tracing::error!("failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }

    /// Returns the Content-Type header value for the text format.
    #[must_use]
    pub const fn content_type() -> &'static str {
        "text/plain; version=0.0.4; charset=utf-8"
    }
}

/// Adapts a [`PullInterface`] to HTTP frameworks.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    pull: PullInterface,
}

impl MetricsHandler {
    /// Creates a new metrics handler.
    #[must_use]
    pub const fn new(pull: PullInterface) -> Self {
        Self { pull }
    }

    /// Renders one exposition response.
    #[must_use]
    pub fn handle(&self) -> MetricsResponse {
        let samples = self.pull.collect().count();
        let body = self.pull.encode();
        MetricsResponse {
            body,
            content_type: PullInterface::content_type(),
            samples,
        }
    }
}

/// One rendered exposition.
#[derive(Debug, Clone)]
pub struct MetricsResponse {
    /// The response body in Prometheus text format.
    pub body: String,
    /// The Content-Type header value.
    pub content_type: &'static str,
    /// Observed samples at render time.
    pub samples: usize,
}
