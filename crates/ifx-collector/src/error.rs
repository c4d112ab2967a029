//! Error types for the ifx-collector crate.

use thiserror::Error;

/// Errors that can occur while collecting database counters.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Opening a connection to an instance failed.
    #[error("connect to {instance} failed: {reason}")]
    Connect {
        /// The instance label.
        instance: String,
        /// The reason the connection failed.
        reason: String,
    },

    /// The liveness check on a freshly opened connection failed.
    #[error("ping {instance} failed: {reason}")]
    Ping {
        /// The instance label.
        instance: String,
        /// The reason the ping failed.
        reason: String,
    },

    /// Executing a query failed before any row was produced.
    #[error("query {query} failed: {reason}")]
    Query {
        /// The query name within the battery.
        query: String,
        /// The reason the query failed.
        reason: String,
    },

    /// Advancing the row cursor failed after the query executed.
    #[error("row scan in {query} failed: {reason}")]
    RowScan {
        /// The query name within the battery.
        query: String,
        /// The reason the scan failed.
        reason: String,
    },

    /// A column could not be read as the requested type.
    #[error("column {index}: {reason}")]
    Column {
        /// Zero-based column index.
        index: usize,
        /// The reason the column could not be read.
        reason: String,
    },

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;
