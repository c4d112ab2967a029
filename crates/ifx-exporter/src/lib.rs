//! Prometheus exporter for Informix performance counters.
//!
//! Wires an [`ifx_collector::ScrapeEngine`] to a periodic scheduler and an
//! axum HTTP server exposing `/metrics` and `/health`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod error;
#[cfg(feature = "odbc")]
pub mod odbc;
pub mod scheduler;
pub mod server;

pub use app::Exporter;
pub use error::{ExporterError, ExporterResult};
pub use scheduler::{SchedulerHandle, start_scrape_task};
pub use server::{ExporterServer, ExporterState, HealthResponse, create_router};
