//! Informix performance counter collector.
//!
//! `ifx-collector` polls one or more Informix instances for internal
//! performance counters and keeps the latest value of each counter as a
//! labeled gauge, ready to be pulled by a Prometheus scraper.
//!
//! # Components
//!
//! - **Catalog**: the fixed list of monitored counters ([`catalog::CATALOG`])
//! - **Registry**: one gauge series per counter, labeled by instance
//! - **Connection manager**: bounded-retry connections with sticky exclusion
//! - **Scrape engine**: serialized cycles running the query battery
//! - **Pull interface**: `describe` / `collect` / text exposition
//!
//! # Example
//!
//! ```rust
//! use ifx_collector::testing::{ScriptedConnector, ScriptedInstance, floats};
//! use ifx_collector::{ConnectionManager, InstanceConfig, MetricRegistry, RetryPolicy, ScrapeEngine};
//!
//! let logs_sql = ifx_collector::queries::by_name("logs").unwrap().sql;
//! let connector = ScriptedConnector::new().instance(
//!     "DSN=ol_prod",
//!     ScriptedInstance::new().rows(logs_sql, vec![floats(&[3.0])]),
//! );
//! let instances = vec![InstanceConfig {
//!     name: "ol_prod".to_string(),
//!     descriptor: "DSN=ol_prod".to_string(),
//! }];
//!
//! let manager = ConnectionManager::new(connector, instances, RetryPolicy::default());
//! let engine = ScrapeEngine::new(manager, MetricRegistry::new());
//!
//! engine.run_cycle();
//!
//! let samples: Vec<_> = engine.pull().collect().collect();
//! assert_eq!(samples.len(), 1);
//! assert_eq!(samples[0].counter, "logs_without_backup");
//! assert_eq!(samples[0].value, 3.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod pull;
pub mod queries;
pub mod registry;
pub mod scrape;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types at crate root
pub use catalog::{CATALOG, CounterDef};
pub use config::{ExporterConfig, InstanceConfig};
pub use connection::{
    Backoff, Connection, ConnectionManager, Connector, InstanceHandle, RetryPolicy, Row,
    RowCursor, Value,
};
pub use error::{CollectorError, Result};
pub use pull::{MetricsHandler, MetricsResponse, PullInterface};
pub use registry::{MetricRegistry, Sample, SeriesDescriptor};
pub use scrape::{CycleStats, ScrapeEngine};
