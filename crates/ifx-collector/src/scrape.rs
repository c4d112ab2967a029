//! The scrape engine.
//!
//! One call to [`ScrapeEngine::run_cycle`] reconciles connections, runs the
//! query battery against every live instance, writes results into the
//! [`MetricRegistry`], and closes every connection it opened. Cycles are
//! serialized: a second caller blocks until the running cycle finishes.
//!
//! Failures are reported through `tracing` only. A query that fails to
//! execute leaves its counters at their last value; a cursor that fails
//! mid-iteration keeps the rows already read and skips the rest of that
//! query.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionManager, Connector, InstanceHandle, ScopedCursor};
use crate::error::{CollectorError, Result};
use crate::pull::PullInterface;
use crate::queries::{BATTERY, Query};
use crate::registry::MetricRegistry;

/// Summary of one completed scrape cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Instances connected and queried during the cycle.
    pub live: usize,
    /// Instances permanently excluded after the cycle.
    pub excluded: usize,
    /// Wall-clock duration of the cycle, lock wait excluded.
    pub duration: Duration,
}

/// Drives scrape cycles against every configured instance.
pub struct ScrapeEngine<K: Connector> {
    manager: ConnectionManager<K>,
    registry: MetricRegistry,
    cycle_lock: Mutex<()>,
    cycles: AtomicU64,
}

impl<K: Connector> fmt::Debug for ScrapeEngine<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeEngine")
            .field("manager", &self.manager)
            .field("registry", &self.registry)
            .field("queries", &BATTERY.len())
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K: Connector> ScrapeEngine<K> {
    /// Creates an engine running the standard query battery.
    pub fn new(manager: ConnectionManager<K>, registry: MetricRegistry) -> Self {
        Self {
            manager,
            registry,
            cycle_lock: Mutex::new(()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Returns the metric registry written by this engine.
    #[must_use]
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Returns the connection manager.
    #[must_use]
    pub fn connections(&self) -> &ConnectionManager<K> {
        &self.manager
    }

    /// Returns a read-only pull interface over the registry.
    #[must_use]
    pub fn pull(&self) -> PullInterface {
        PullInterface::new(self.registry.clone())
    }

    /// Returns the number of cycles completed so far.
    #[must_use]
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Runs one full scrape cycle, blocking while another cycle is running.
    ///
    /// Per-instance and per-query failures are logged and never returned.
    pub fn run_cycle(&self) -> CycleStats {
        let _guard = self.cycle_lock.lock();
        let started = Instant::now();
        let cycle = self.cycles.load(Ordering::Acquire) + 1;
        info!(cycle, "starting scrape cycle");

        let mut live = self.manager.reconcile();
        for handle in &mut live {
            self.scrape_instance(handle);
        }

        let stats = CycleStats {
            live: live.len(),
            excluded: self.manager.excluded().len(),
            duration: started.elapsed(),
        };

        // Handles close their connections on drop.
        drop(live);

        self.cycles.fetch_add(1, Ordering::AcqRel);
        info!(
            cycle,
            live = stats.live,
            excluded = stats.excluded,
            duration_ms = stats.duration.as_millis() as u64,
            "finished scrape cycle"
        );
        stats
    }

    fn scrape_instance(&self, handle: &mut InstanceHandle<K::Conn>) {
        let instance = handle.name().to_string();
        debug!(instance = %instance, queries = BATTERY.len(), "running queries");

        for query in BATTERY {
            match self.run_query(&mut **handle, &instance, query) {
                Ok(stored) => {
                    debug!(instance = %instance, query = query.name, stored, "query complete");
                }
                Err(e @ CollectorError::RowScan { .. }) => {
                    error!(
                        instance = %instance,
                        query = query.name,
                        error = %e,
                        "row scan failed, skipping remaining rows"
                    );
                }
                Err(e) => {
                    warn!(instance = %instance, query = query.name, error = %e, "query failed");
                }
            }
        }
    }

    fn run_query(&self, conn: &mut K::Conn, instance: &str, query: &Query) -> Result<usize> {
        let cursor = conn.query(query.sql).map_err(|e| CollectorError::Query {
            query: query.name.to_string(),
            reason: e.to_string(),
        })?;
        let mut cursor = ScopedCursor::new(cursor);

        let mut stored = 0;
        loop {
            let row = match cursor.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    return Err(CollectorError::RowScan {
                        query: query.name.to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            let mapped = query.map_row(&row, |counter, value| {
                if self.registry.set(counter, instance, value) {
                    stored += 1;
                }
            });
            if let Err(e) = mapped {
                debug!(instance, query = query.name, error = %e, "skipping unreadable row");
            }
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::connection::{Backoff, RetryPolicy};
    use crate::queries::by_name;
    use crate::testing::{ScriptedConnector, ScriptedInstance, floats, name_value};

    fn sql(name: &str) -> &'static str {
        by_name(name).unwrap().sql
    }

    fn engine(connector: ScriptedConnector, names: &[&str]) -> ScrapeEngine<ScriptedConnector> {
        let instances = names
            .iter()
            .map(|n| InstanceConfig {
                name: (*n).to_string(),
                descriptor: format!("DSN={n}"),
            })
            .collect();
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Backoff::Fixed(Duration::ZERO),
        };
        ScrapeEngine::new(
            ConnectionManager::new(connector, instances, policy),
            MetricRegistry::new(),
        )
    }

    mod cycle_tests {
        use super::*;

        #[test]
        fn stores_values_from_every_query_shape() {
            let connector = ScriptedConnector::new().instance(
                "DSN=a",
                ScriptedInstance::new()
                    .rows(sql("sysshmhdr"), vec![name_value("pf_isreads ", 100.0)])
                    .rows(sql("transactions"), vec![floats(&[2.0, 30.0, 1.0])])
                    .rows(sql("checkpoint"), vec![floats(&[0.5, 120.0, 8.0])])
                    .rows(sql("btr_ratio"), vec![name_value("brt_2048", 3.5)]),
            );
            let engine = engine(connector, &["a"]);

            let stats = engine.run_cycle();

            assert_eq!(stats.live, 1);
            assert_eq!(stats.excluded, 0);
            let registry = engine.registry();
            assert_eq!(registry.get("pf_isreads", "a"), Some(100.0));
            assert_eq!(registry.get("total_locks", "a"), Some(30.0));
            assert_eq!(registry.get("n_dirty_buffs", "a"), Some(120.0));
            assert_eq!(registry.get("brt_2048", "a"), Some(3.5));
            assert_eq!(registry.get("logs_without_backup", "a"), None);
        }

        #[test]
        fn unknown_counter_names_are_ignored() {
            let connector = ScriptedConnector::new().instance(
                "DSN=a",
                ScriptedInstance::new().rows(
                    sql("sysshmhdr"),
                    vec![name_value("unknown_ctr", 1.0), name_value("pf_iscommits", 9.0)],
                ),
            );
            let engine = engine(connector, &["a"]);
            let before: Vec<_> = engine.registry().describe().collect();

            engine.run_cycle();

            assert_eq!(engine.registry().get("pf_iscommits", "a"), Some(9.0));
            assert!(!engine.registry().contains("unknown_ctr"));
            assert_eq!(engine.registry().describe().collect::<Vec<_>>(), before);
        }

        #[test]
        fn every_query_runs_for_every_instance() {
            let connector = ScriptedConnector::new()
                .instance("DSN=a", ScriptedInstance::new())
                .instance("DSN=b", ScriptedInstance::new());
            let stats = connector.stats();
            let engine = engine(connector, &["a", "b"]);

            engine.run_cycle();

            assert_eq!(stats.queries("DSN=a"), BATTERY.len() as u32);
            assert_eq!(stats.queries("DSN=b"), BATTERY.len() as u32);
        }

        #[test]
        fn connections_and_cursors_are_released() {
            let connector = ScriptedConnector::new().instance(
                "DSN=a",
                ScriptedInstance::new()
                    .fail_query(sql("logs"), "permission denied")
                    .fail_scan_after(sql("sysshmhdr"), vec![], "fetch aborted"),
            );
            let stats = connector.stats();
            let engine = engine(connector, &["a"]);

            engine.run_cycle();

            assert_eq!(stats.open_handles("DSN=a"), 0);
            assert_eq!(stats.open_cursors("DSN=a"), 0);
        }

        #[test]
        fn cycles_are_counted() {
            let connector = ScriptedConnector::new().instance("DSN=a", ScriptedInstance::new());
            let engine = engine(connector, &["a"]);
            assert_eq!(engine.cycles_completed(), 0);
            engine.run_cycle();
            engine.run_cycle();
            assert_eq!(engine.cycles_completed(), 2);
        }
    }

    mod failure_tests {
        use super::*;

        #[test]
        fn failed_query_does_not_stop_later_queries() {
            let connector = ScriptedConnector::new().instance(
                "DSN=a",
                ScriptedInstance::new()
                    .fail_query(sql("transactions"), "table locked")
                    .rows(sql("logs"), vec![floats(&[4.0])]),
            );
            let engine = engine(connector, &["a"]);

            engine.run_cycle();

            assert_eq!(engine.registry().get("open_transactions", "a"), None);
            assert_eq!(engine.registry().get("logs_without_backup", "a"), Some(4.0));
        }

        #[test]
        fn failing_instance_does_not_affect_others() {
            let connector = ScriptedConnector::new()
                .instance(
                    "DSN=a",
                    ScriptedInstance::new().fail_query(sql("logs"), "disk error"),
                )
                .instance(
                    "DSN=b",
                    ScriptedInstance::new().rows(sql("logs"), vec![floats(&[2.0])]),
                );
            let engine = engine(connector, &["a", "b"]);

            engine.run_cycle();

            assert_eq!(engine.registry().get("logs_without_backup", "a"), None);
            assert_eq!(engine.registry().get("logs_without_backup", "b"), Some(2.0));
        }

        #[test]
        fn scan_failure_keeps_rows_read_so_far() {
            let connector = ScriptedConnector::new().instance(
                "DSN=a",
                ScriptedInstance::new()
                    .fail_scan_after(
                        sql("sysshmhdr"),
                        vec![name_value("pf_isreads", 5.0)],
                        "fetch aborted",
                    )
                    .rows(sql("logs"), vec![floats(&[1.0])]),
            );
            let engine = engine(connector, &["a"]);

            let stats = engine.run_cycle();

            assert_eq!(stats.live, 1);
            assert_eq!(engine.registry().get("pf_isreads", "a"), Some(5.0));
            assert_eq!(engine.registry().get("logs_without_backup", "a"), Some(1.0));
        }

        #[test]
        fn unreadable_row_skips_only_that_row() {
            let bad = crate::connection::Row::new(vec![crate::connection::Value::Null]);
            let connector = ScriptedConnector::new().instance(
                "DSN=a",
                ScriptedInstance::new().rows(
                    sql("sysshmhdr"),
                    vec![bad, name_value("pf_lockwts", 6.0)],
                ),
            );
            let engine = engine(connector, &["a"]);

            engine.run_cycle();

            assert_eq!(engine.registry().get("pf_lockwts", "a"), Some(6.0));
        }

        #[test]
        fn stale_values_survive_a_failed_query() {
            let connector = ScriptedConnector::new().instance(
                "DSN=a",
                ScriptedInstance::new().rows(sql("logs"), vec![floats(&[7.0])]),
            );
            let control = connector.stats();
            let engine = engine(connector, &["a"]);

            engine.run_cycle();
            control.replace(
                "DSN=a",
                ScriptedInstance::new().fail_query(sql("logs"), "timeout"),
            );
            engine.run_cycle();

            assert_eq!(engine.registry().get("logs_without_backup", "a"), Some(7.0));
        }

        #[test]
        fn all_instances_unreachable_is_not_fatal() {
            let engine = engine(ScriptedConnector::new(), &["a", "b"]);
            let stats = engine.run_cycle();
            assert_eq!(stats.live, 0);
            assert_eq!(stats.excluded, 2);
            assert_eq!(engine.registry().collect().count(), 0);
        }
    }
}
