//! ODBC driver for the collector's connection interfaces.
//!
//! Instance descriptors are ODBC connection strings, for example
//! `DSN=ol_prod;UID=informix;PWD=secret`.

use std::sync::OnceLock;

use ifx_collector::{CollectorError, Connection, Connector, Result, Row, RowCursor, Value};
use odbc_api::{ConnectionOptions, Cursor, CursorImpl, Environment, ResultSetMetadata};
use odbc_api::handles::StatementImpl;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| CollectorError::Connect {
        instance: "odbc".to_string(),
        reason: format!("failed to allocate ODBC environment: {e}"),
    })?;
    let _ = ENVIRONMENT.set(env);
    ENVIRONMENT.get().ok_or_else(|| CollectorError::Connect {
        instance: "odbc".to_string(),
        reason: "ODBC environment unavailable".to_string(),
    })
}

/// Opens ODBC connections from connection strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct OdbcConnector;

impl Connector for OdbcConnector {
    type Conn = OdbcConnection;

    fn open(&self, descriptor: &str) -> Result<OdbcConnection> {
        let conn = environment()?
            .connect_with_connection_string(descriptor, ConnectionOptions::default())
            .map_err(|e| CollectorError::Connect {
                instance: redact(descriptor),
                reason: e.to_string(),
            })?;
        Ok(OdbcConnection {
            label: redact(descriptor),
            inner: Some(conn),
        })
    }
}

/// One open ODBC connection.
pub struct OdbcConnection {
    label: String,
    inner: Option<odbc_api::Connection<'static>>,
}

impl OdbcConnection {
    fn live(&self) -> Result<&odbc_api::Connection<'static>> {
        self.inner.as_ref().ok_or_else(|| CollectorError::Ping {
            instance: self.label.clone(),
            reason: "connection already closed".to_string(),
        })
    }
}

impl Connection for OdbcConnection {
    fn ping(&mut self) -> Result<()> {
        let dead = self.live()?.is_dead().map_err(|e| CollectorError::Ping {
            instance: self.label.clone(),
            reason: e.to_string(),
        })?;
        if dead {
            return Err(CollectorError::Ping {
                instance: self.label.clone(),
                reason: "connection is dead".to_string(),
            });
        }
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>> {
        let query_error = |reason: String| CollectorError::Query {
            query: sql.to_string(),
            reason,
        };
        let conn = self.live().map_err(|e| query_error(e.to_string()))?;
        let cursor = conn
            .execute(sql, (), None)
            .map_err(|e| query_error(e.to_string()))?;
        Ok(Box::new(OdbcCursor {
            sql: sql.to_string(),
            cursor,
            buffer: Vec::new(),
        }))
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

struct OdbcCursor<'c> {
    sql: String,
    cursor: Option<CursorImpl<StatementImpl<'c>>>,
    buffer: Vec<u8>,
}

fn scan_error(sql: &str, reason: impl ToString) -> CollectorError {
    CollectorError::RowScan {
        query: sql.to_string(),
        reason: reason.to_string(),
    }
}

impl RowCursor for OdbcCursor<'_> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        let columns = match cursor.num_result_cols() {
            Ok(n) => u16::try_from(n).unwrap_or(0),
            Err(e) => return Err(scan_error(&self.sql, e)),
        };

        let mut row = match cursor.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(scan_error(&self.sql, e)),
        };

        let mut values = Vec::with_capacity(usize::from(columns));
        for column in 1..=columns {
            self.buffer.clear();
            match row.get_text(column, &mut self.buffer) {
                Ok(true) => values.push(Value::Text(
                    String::from_utf8_lossy(&self.buffer).into_owned(),
                )),
                Ok(false) => values.push(Value::Null),
                Err(e) => return Err(scan_error(&self.sql, e)),
            }
        }
        Ok(Some(Row::new(values)))
    }

    fn close(&mut self) {
        self.cursor = None;
    }
}

/// Strips credentials from a connection string before it reaches a log line.
fn redact(descriptor: &str) -> String {
    descriptor
        .split(';')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, _)) if key.trim().eq_ignore_ascii_case("pwd") => format!("{key}=***"),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
