//! Database connection interfaces and the per-instance connection manager.
//!
//! The query execution layer is abstracted behind [`Connector`],
//! [`Connection`] and [`RowCursor`], so any driver that can run a query and
//! yield rows of text or float columns can back the collector.
//!
//! [`ConnectionManager::reconcile`] opens a connection to every configured
//! instance, retrying with a bounded number of attempts. Instances that never
//! become reachable are excluded for the lifetime of the manager.

use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::InstanceConfig;
use crate::error::{CollectorError, Result};

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A text column.
    Text(String),
    /// A numeric column.
    Float(f64),
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Creates a row from column values.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Reads a column as text, with surrounding whitespace trimmed.
    pub fn text(&self, index: usize) -> Result<&str> {
        match self.column(index)? {
            Value::Text(s) => Ok(s.trim()),
            Value::Null => Err(column_error(index, "value is NULL")),
            Value::Float(_) => Err(column_error(index, "expected text, found number")),
        }
    }

    /// Reads a column as a float. Text columns are parsed.
    pub fn float(&self, index: usize) -> Result<f64> {
        match self.column(index)? {
            Value::Float(v) => Ok(*v),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| column_error(index, &format!("not a number: {e}"))),
            Value::Null => Err(column_error(index, "value is NULL")),
        }
    }

    fn column(&self, index: usize) -> Result<&Value> {
        self.0
            .get(index)
            .ok_or_else(|| column_error(index, &format!("row has {} columns", self.0.len())))
    }
}

fn column_error(index: usize, reason: &str) -> CollectorError {
    CollectorError::Column {
        index,
        reason: reason.to_string(),
    }
}

/// A forward-only cursor over a query's result rows.
pub trait RowCursor {
    /// Advances to the next row. `Ok(None)` marks the end of the result set.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while fetching.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Releases the cursor. Must be safe to call more than once.
    fn close(&mut self);
}

/// A live connection to one database instance.
pub trait Connection: Send {
    /// Runs a no-op round trip to confirm the connection is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer.
    fn ping(&mut self) -> Result<()>;

    /// Executes a query and returns its row cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be executed.
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>>;

    /// Releases the connection. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens connections from opaque descriptors.
pub trait Connector: Send + Sync {
    /// The connection type produced by this connector.
    type Conn: Connection;

    /// Opens a connection using the given descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn open(&self, descriptor: &str) -> Result<Self::Conn>;
}

/// A cursor that is closed when dropped.
pub struct ScopedCursor<'a> {
    inner: Box<dyn RowCursor + 'a>,
}

impl<'a> ScopedCursor<'a> {
    /// Wraps a cursor so it is released on every exit path.
    #[must_use]
    pub fn new(inner: Box<dyn RowCursor + 'a>) -> Self {
        Self { inner }
    }

    /// Advances to the next row.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while fetching.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        self.inner.next_row()
    }
}

impl Drop for ScopedCursor<'_> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// An open connection owned by the current scrape cycle.
///
/// The underlying connection is closed when the handle is dropped.
pub struct InstanceHandle<C: Connection> {
    name: String,
    conn: C,
}

impl<C: Connection> InstanceHandle<C> {
    /// Returns the instance label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C: Connection> fmt::Debug for InstanceHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Deref for InstanceHandle<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: Connection> DerefMut for InstanceHandle<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: Connection> Drop for InstanceHandle<C> {
    fn drop(&mut self) {
        debug!(instance = %self.name, "closing connection");
        self.conn.close();
    }
}

/// Delay schedule between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed(Duration),
    /// Doubling delay starting at `initial`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Upper bound on any single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Returns the delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Bounded retry policy for opening connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per instance, including the first.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
        }
    }
}

/// Opens per-instance connections and tracks permanently excluded instances.
pub struct ConnectionManager<K: Connector> {
    connector: K,
    instances: Vec<InstanceConfig>,
    policy: RetryPolicy,
    excluded: RwLock<HashSet<String>>,
}

impl<K: Connector> fmt::Debug for ConnectionManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("instances", &self.instances.len())
            .field("policy", &self.policy)
            .field("excluded", &*self.excluded.read())
            .finish_non_exhaustive()
    }
}

impl<K: Connector> ConnectionManager<K> {
    /// Creates a manager over an immutable list of configured instances.
    pub fn new(connector: K, instances: Vec<InstanceConfig>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            instances,
            policy,
            excluded: RwLock::new(HashSet::new()),
        }
    }

    /// Returns the configured instances.
    #[must_use]
    pub fn instances(&self) -> &[InstanceConfig] {
        &self.instances
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns `true` if the instance was permanently excluded.
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.read().contains(name)
    }

    /// Returns the permanently excluded instance names, sorted.
    #[must_use]
    pub fn excluded(&self) -> Vec<String> {
        let mut names: Vec<_> = self.excluded.read().iter().cloned().collect();
        names.sort();
        names
    }

    /// Opens a connection to every instance that is not excluded.
    ///
    /// Failures never propagate: an instance that exhausts its retry budget
    /// is excluded from this and every later call, and the remaining
    /// instances are returned. An empty result is valid.
    pub fn reconcile(&self) -> Vec<InstanceHandle<K::Conn>> {
        let mut live = Vec::with_capacity(self.instances.len());

        for instance in &self.instances {
            if self.is_excluded(&instance.name) {
                debug!(instance = %instance.name, "skipping excluded instance");
                continue;
            }

            match self.connect_with_retry(instance) {
                Ok(conn) => live.push(InstanceHandle {
                    name: instance.name.clone(),
                    conn,
                }),
                Err(e) => {
                    warn!(
                        instance = %instance.name,
                        attempts = self.policy.max_attempts,
                        error = %e,
                        "instance unreachable, excluding it from future scrapes"
                    );
                    self.excluded.write().insert(instance.name.clone());
                }
            }
        }

        info!(
            live = live.len(),
            excluded = self.excluded.read().len(),
            "reconciled instances"
        );
        live
    }

    fn connect_with_retry(&self, instance: &InstanceConfig) -> Result<K::Conn> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(instance = %instance.name, attempt, "connecting");
            match self.connect_once(instance) {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.policy.backoff.delay(attempt);
                    warn!(
                        instance = %instance.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connection attempt failed"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn connect_once(&self, instance: &InstanceConfig) -> Result<K::Conn> {
        let mut conn = self.connector.open(&instance.descriptor)?;
        if let Err(e) = conn.ping() {
            conn.close();
            return Err(e);
        }
        Ok(conn)
    }
}
