//! Scripted in-memory connector.
//!
//! [`ScriptedConnector`] answers connections and queries from a script
//! prepared up front, and records how it was used: connection attempts,
//! open handles, open cursors and executed queries. Clones share the same
//! script and counters, so a test can keep one clone for inspection and
//! hand the other to a [`ConnectionManager`](crate::ConnectionManager).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::connection::{Connection, Connector, Row, RowCursor, Value};
use crate::error::{CollectorError, Result};

/// Scripted response to one query.
#[derive(Debug, Clone)]
pub enum QueryScript {
    /// Return these rows, then end the result set.
    Rows(Vec<Row>),
    /// Fail at execution time.
    FailExecute(String),
    /// Return these rows, then fail while fetching the next one.
    FailScanAfter(Vec<Row>, String),
}

/// Script for a single instance.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInstance {
    connect_failures: u32,
    ping_failures: u32,
    query_delay: Duration,
    queries: HashMap<String, QueryScript>,
}

impl ScriptedInstance {
    /// An instance that connects on the first attempt and returns no rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` open attempts.
    #[must_use]
    pub fn fail_connects(mut self, n: u32) -> Self {
        self.connect_failures = n;
        self
    }

    /// Fail the next `n` pings.
    #[must_use]
    pub fn fail_pings(mut self, n: u32) -> Self {
        self.ping_failures = n;
        self
    }

    /// Sleep this long inside every query.
    #[must_use]
    pub fn query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Answer `sql` with the given rows.
    #[must_use]
    pub fn rows(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.queries.insert(sql.to_string(), QueryScript::Rows(rows));
        self
    }

    /// Fail `sql` at execution time.
    #[must_use]
    pub fn fail_query(mut self, sql: &str, reason: &str) -> Self {
        self.queries
            .insert(sql.to_string(), QueryScript::FailExecute(reason.to_string()));
        self
    }

    /// Answer `sql` with `rows`, then fail the following fetch.
    #[must_use]
    pub fn fail_scan_after(mut self, sql: &str, rows: Vec<Row>, reason: &str) -> Self {
        self.queries.insert(
            sql.to_string(),
            QueryScript::FailScanAfter(rows, reason.to_string()),
        );
        self
    }
}

/// Builds a two-column name/value row.
#[must_use]
pub fn name_value(name: &str, value: f64) -> Row {
    Row::new(vec![Value::Text(name.to_string()), Value::Float(value)])
}

/// Builds a row of float columns.
#[must_use]
pub fn floats(values: &[f64]) -> Row {
    Row::new(values.iter().copied().map(Value::Float).collect())
}

#[derive(Debug, Default)]
struct Usage {
    connect_attempts: u32,
    open_handles: i64,
    max_open_handles: i64,
    open_cursors: i64,
    queries: u32,
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<String, ScriptedInstance>,
    usage: HashMap<String, Usage>,
}

/// In-memory [`Connector`] driven by per-descriptor scripts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<State>>,
}

impl ScriptedConnector {
    /// A connector with no instances; every open fails until one is added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the script for `descriptor`.
    #[must_use]
    pub fn instance(self, descriptor: &str, script: ScriptedInstance) -> Self {
        self.replace(descriptor, script);
        self
    }

    /// Replaces the script for `descriptor`, keeping its usage counters.
    pub fn replace(&self, descriptor: &str, script: ScriptedInstance) {
        self.state
            .lock()
            .scripts
            .insert(descriptor.to_string(), script);
    }

    /// Returns a handle sharing this connector's counters.
    #[must_use]
    pub fn stats(&self) -> Self {
        self.clone()
    }

    /// Total open attempts made against `descriptor`.
    #[must_use]
    pub fn connect_attempts(&self, descriptor: &str) -> u32 {
        self.usage(descriptor, |u| u.connect_attempts)
    }

    /// Connections to `descriptor` currently open.
    #[must_use]
    pub fn open_handles(&self, descriptor: &str) -> i64 {
        self.usage(descriptor, |u| u.open_handles)
    }

    /// Highest number of simultaneously open connections to `descriptor`.
    #[must_use]
    pub fn max_open_handles(&self, descriptor: &str) -> i64 {
        self.usage(descriptor, |u| u.max_open_handles)
    }

    /// Cursors on `descriptor` currently open.
    #[must_use]
    pub fn open_cursors(&self, descriptor: &str) -> i64 {
        self.usage(descriptor, |u| u.open_cursors)
    }

    /// Queries executed against `descriptor`.
    #[must_use]
    pub fn queries(&self, descriptor: &str) -> u32 {
        self.usage(descriptor, |u| u.queries)
    }

    fn usage<T: Default>(&self, descriptor: &str, f: impl FnOnce(&Usage) -> T) -> T {
        self.state.lock().usage.get(descriptor).map(f).unwrap_or_default()
    }
}

impl Connector for ScriptedConnector {
    type Conn = ScriptedConnection;

    fn open(&self, descriptor: &str) -> Result<ScriptedConnection> {
        let mut state = self.state.lock();
        let State { scripts, usage } = &mut *state;
        let usage = usage.entry(descriptor.to_string()).or_default();
        usage.connect_attempts += 1;

        let Some(script) = scripts.get_mut(descriptor) else {
            return Err(CollectorError::Connect {
                instance: descriptor.to_string(),
                reason: "unknown data source".to_string(),
            });
        };

        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(CollectorError::Connect {
                instance: descriptor.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        usage.open_handles += 1;
        usage.max_open_handles = usage.max_open_handles.max(usage.open_handles);

        Ok(ScriptedConnection {
            descriptor: descriptor.to_string(),
            state: Arc::clone(&self.state),
            closed: false,
        })
    }
}

/// Connection produced by [`ScriptedConnector`].
#[derive(Debug)]
pub struct ScriptedConnection {
    descriptor: String,
    state: Arc<Mutex<State>>,
    closed: bool,
}

impl Connection for ScriptedConnection {
    fn ping(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(script) = state.scripts.get_mut(&self.descriptor) {
            if script.ping_failures > 0 {
                script.ping_failures -= 1;
                return Err(CollectorError::Ping {
                    instance: self.descriptor.clone(),
                    reason: "server not answering".to_string(),
                });
            }
        }
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>> {
        let (delay, script) = {
            let state = self.state.lock();
            let instance = state.scripts.get(&self.descriptor);
            (
                instance.map(|s| s.query_delay).unwrap_or_default(),
                instance.and_then(|s| s.queries.get(sql).cloned()),
            )
        };

        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let (rows, fail) = match script {
            None => (Vec::new(), None),
            Some(QueryScript::Rows(rows)) => (rows, None),
            Some(QueryScript::FailScanAfter(rows, reason)) => (rows, Some(reason)),
            Some(QueryScript::FailExecute(reason)) => {
                return Err(CollectorError::Query {
                    query: sql.to_string(),
                    reason,
                });
            }
        };

        {
            let mut state = self.state.lock();
            let usage = state.usage.entry(self.descriptor.clone()).or_default();
            usage.queries += 1;
            usage.open_cursors += 1;
        }

        Ok(Box::new(ScriptedCursor {
            descriptor: self.descriptor.clone(),
            state: Arc::clone(&self.state),
            rows: rows.into(),
            fail,
            closed: false,
        }))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(usage) = self.state.lock().usage.get_mut(&self.descriptor) {
            usage.open_handles -= 1;
        }
    }
}

struct ScriptedCursor {
    descriptor: String,
    state: Arc<Mutex<State>>,
    rows: VecDeque<Row>,
    fail: Option<String>,
    closed: bool,
}

impl RowCursor for ScriptedCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.rows.pop_front() {
            return Ok(Some(row));
        }
        match self.fail.take() {
            Some(reason) => Err(CollectorError::RowScan {
                query: self.descriptor.clone(),
                reason,
            }),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(usage) = self.state.lock().usage.get_mut(&self.descriptor) {
            usage.open_cursors -= 1;
        }
    }
}
