//! The fixed battery of monitoring queries run against every instance.
//!
//! Each [`Query`] declares how its rows map onto catalog counters: either a
//! stream of `(name, value)` pairs, or a fixed list of columns each feeding
//! one counter.

use tracing::debug;

use crate::connection::Row;
use crate::error::Result;

/// How the rows of a query map onto counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// Column 0 is the counter name, column 1 its value.
    NameValue,
    /// Column `i` is the value of counter `i`.
    Columns(&'static [&'static str]),
}

/// One named query of the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    /// Short name used in logs.
    pub name: &'static str,
    /// SQL text sent to the server.
    pub sql: &'static str,
    /// Row layout.
    pub shape: RowShape,
}

impl Query {
    /// Extracts every `(counter, value)` pair from `row` into `store`.
    ///
    /// A column that is NULL or not numeric skips only its own counter.
    /// For name/value rows an unreadable name or value skips the row.
    ///
    /// Returns the number of pairs handed to `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if a name/value row cannot be read.
    pub fn map_row(&self, row: &Row, mut store: impl FnMut(&str, f64)) -> Result<usize> {
        match self.shape {
            RowShape::NameValue => {
                let name = row.text(0)?;
                let value = row.float(1)?;
                store(name, value);
                Ok(1)
            }
            RowShape::Columns(counters) => {
                let mut stored = 0;
                for (index, &counter) in counters.iter().enumerate() {
                    match row.float(index) {
                        Ok(value) => {
                            store(counter, value);
                            stored += 1;
                        }
                        Err(e) => {
                            debug!(query = self.name, counter, error = %e, "skipping column");
                        }
                    }
                }
                Ok(stored)
            }
        }
    }

    /// Counter names this query can produce, if they are fixed.
    #[must_use]
    pub fn counters(&self) -> &'static [&'static str] {
        match self.shape {
            RowShape::NameValue => &[],
            RowShape::Columns(counters) => counters,
        }
    }
}

/// Every query run per instance per cycle, in execution order.
pub static BATTERY: &[Query] = &[
    Query {
        name: "sysshmhdr",
        sql: "select name, value from sysshmhdr",
        shape: RowShape::NameValue,
    },
    Query {
        name: "transactions",
        sql: "select count(*) as open_transactions, sum(tx_nlocks) as total_locks, \
              (select count(*) from syslocks where waiter is not null \
              and dbsname != 'sysmaster' and tabname != 'sysdatabases') as locks_with_waiter \
              from systrans",
        shape: RowShape::Columns(&["open_transactions", "total_locks", "locks_with_waiter"]),
    },
    Query {
        name: "logs",
        sql: "select count(*) as logs_without_backup from syslogs where is_backed_up = 0",
        shape: RowShape::Columns(&["logs_without_backup"]),
    },
    Query {
        name: "checkpoint",
        sql: "select first 1 cp_time::decimal(10,2) as ckptotal, n_dirty_buffs, dskflush_per_sec \
              from syscheckpoint order by intvl desc",
        shape: RowShape::Columns(&["ckptotal", "n_dirty_buffs", "dskflush_per_sec"]),
    },
    Query {
        name: "hdr_lag",
        sql: "select lt_time_last_update from sysha_lagtime",
        shape: RowShape::Columns(&["LastHdrPing"]),
    },
    Query {
        name: "last_backup",
        sql: "select first 1 level0 from sysdbstab order by 1 desc",
        shape: RowShape::Columns(&["LastBackup"]),
    },
    Query {
        name: "btr_ratio",
        sql: "select 'brt_' || bufsize, \
              (((pagreads + bufwrites) / nbuffs) \
              / (select round(((sh_curtime - sh_pfclrtime) / 60) / 60) from sysshmvals)) as btr \
              from sysbufpool where bufsize in (2048, 16384)",
        shape: RowShape::NameValue,
    },
];

/// Looks up a battery query by name.
pub fn by_name(name: &str) -> Option<&'static Query> {
    BATTERY.iter().find(|q| q.name == name)
}
