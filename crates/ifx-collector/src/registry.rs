//! In-memory metric registry.
//!
//! The [`MetricRegistry`] owns exactly one gauge family per [`CATALOG`] entry,
//! labeled by source instance. Families are registered with a
//! `prometheus-client` [`Registry`] at construction, so the text exposition
//! always carries every catalog series even before any value is observed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use tracing::debug;

use crate::catalog::{CATALOG, CounterDef, DEFAULT_NAMESPACE, INSTANCE_LABEL};

/// Gauge holding a floating point value.
pub type FloatGauge = Gauge<f64, AtomicU64>;

/// Label set attached to every exported series.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, EncodeLabelSet)]
pub struct InstanceLabels {
    /// The instance label value.
    pub informixserver: String,
}

impl InstanceLabels {
    /// Creates the label set for the given instance.
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            informixserver: instance.into(),
        }
    }
}

/// Description of one series, independent of any observed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDescriptor {
    /// Fully qualified exposition name (`<namespace>_<counter>`).
    pub name: String,
    /// The catalog counter name.
    pub counter: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Label names carried by every sample of the series.
    pub label_names: &'static [&'static str],
}

/// One observed value of one series for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// The catalog counter name.
    pub counter: &'static str,
    /// The instance label value.
    pub instance: String,
    /// The last observed value.
    pub value: f64,
}

/// A single catalog series and the instances that have reported into it.
struct Series {
    def: &'static CounterDef,
    family: Family<InstanceLabels, FloatGauge>,
    /// Gauges for instances with at least one successful `set`.
    observed: RwLock<BTreeMap<String, FloatGauge>>,
}

impl Series {
    fn new(def: &'static CounterDef) -> Self {
        Self {
            def,
            family: Family::default(),
            observed: RwLock::new(BTreeMap::new()),
        }
    }

    fn set(&self, instance: &str, value: f64) {
        if let Some(gauge) = self.observed.read().get(instance) {
            gauge.set(value);
            return;
        }

        let mut observed = self.observed.write();
        let gauge = observed.entry(instance.to_string()).or_insert_with(|| {
            self.family
                .get_or_create(&InstanceLabels::new(instance))
                .clone()
        });
        gauge.set(value);
    }

    fn get(&self, instance: &str) -> Option<f64> {
        self.observed.read().get(instance).map(Gauge::get)
    }

    fn snapshot(&self) -> Vec<Sample> {
        self.observed
            .read()
            .iter()
            .map(|(instance, gauge)| Sample {
                counter: self.def.name,
                instance: instance.clone(),
                value: gauge.get(),
            })
            .collect()
    }
}

/// Counter name to series handle. Unknown names resolve to `None`.
type SeriesMap = BTreeMap<&'static str, Series>;

/// Thread-safe registry of every catalog series.
///
/// Cloning is cheap; clones share the same series.
#[derive(Clone)]
pub struct MetricRegistry {
    namespace: Arc<str>,
    registry: Arc<RwLock<Registry>>,
    series: Arc<SeriesMap>,
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("namespace", &self.namespace)
            .field("series", &self.series.len())
            .finish_non_exhaustive()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    /// Creates a registry under the default `informix` namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Creates a registry with one empty series per catalog entry.
    #[must_use]
    pub fn with_namespace(namespace: &str) -> Self {
        let mut registry = Registry::with_prefix(namespace);
        let mut series = SeriesMap::new();

        for def in CATALOG {
            let entry = Series::new(def);
            registry.register(def.name, def.help, entry.family.clone());
            series.insert(def.name, entry);
        }

        debug!(namespace, series = series.len(), "initialized metric registry");

        Self {
            namespace: Arc::from(namespace),
            registry: Arc::new(RwLock::new(registry)),
            series: Arc::new(series),
        }
    }

    /// Returns the exposition namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the number of registered series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns `true` if no series are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Returns `true` if a series exists for the counter name.
    #[must_use]
    pub fn contains(&self, counter: &str) -> bool {
        self.series.contains_key(counter)
    }

    /// Overwrites the value of `counter` for `instance`.
    ///
    /// Unknown counter names are ignored. Returns whether a value was stored.
    pub fn set(&self, counter: &str, instance: &str, value: f64) -> bool {
        match self.series.get(counter) {
            Some(series) => {
                series.set(instance, value);
                true
            }
            None => {
                debug!(counter, instance, "ignoring counter absent from catalog");
                false
            }
        }
    }

    /// Returns the last observed value of `counter` for `instance`.
    #[must_use]
    pub fn get(&self, counter: &str, instance: &str) -> Option<f64> {
        self.series.get(counter)?.get(instance)
    }

    /// Enumerates every series descriptor in name order.
    ///
    /// The sequence does not depend on whether any value has been set.
    pub fn describe(&self) -> impl Iterator<Item = SeriesDescriptor> + '_ {
        self.series.values().map(|series| SeriesDescriptor {
            name: format!("{}_{}", self.namespace, series.def.name),
            counter: series.def.name,
            help: series.def.help,
            label_names: &[INSTANCE_LABEL],
        })
    }

    /// Enumerates every observed `(series, instance, value)` sample.
    ///
    /// Each series is read under its own lock, so the sequence is consistent
    /// per series but not across series.
    pub fn collect(&self) -> impl Iterator<Item = Sample> + '_ {
        self.series.values().flat_map(Series::snapshot)
    }

    /// Renders all series in the Prometheus text format.
    pub(crate) fn encode_into(&self, buffer: &mut String) -> fmt::Result {
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(buffer, &registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    mod construction_tests {
        use super::*;

        #[test]
        fn one_series_per_catalog_entry() {
            let registry = MetricRegistry::new();
            assert_eq!(registry.len(), CATALOG.len());
            for def in CATALOG {
                assert!(registry.contains(def.name));
            }
        }

        #[test]
        fn new_registry_has_no_samples() {
            let registry = MetricRegistry::new();
            assert_eq!(registry.collect().count(), 0);
        }

        #[test]
        fn registry_is_cloneable_and_shares_state() {
            let registry1 = MetricRegistry::new();
            let registry2 = registry1.clone();

            registry1.set("pf_isreads", "ol_a", 12.0);
            assert_eq!(registry2.get("pf_isreads", "ol_a"), Some(12.0));
        }

        #[test]
        fn custom_namespace_prefixes_descriptors() {
            let registry = MetricRegistry::with_namespace("ifx");
            assert_eq!(registry.namespace(), "ifx");
            assert!(registry.describe().all(|d| d.name.starts_with("ifx_")));
        }
    }

    mod set_tests {
        use super::*;

        #[test]
        fn set_then_get() {
            let registry = MetricRegistry::new();
            assert!(registry.set("open_transactions", "ol_a", 7.0));
            assert_eq!(registry.get("open_transactions", "ol_a"), Some(7.0));
        }

        #[test]
        fn last_write_wins() {
            let registry = MetricRegistry::new();
            registry.set("total_locks", "ol_a", 1.0);
            registry.set("total_locks", "ol_a", 5.0);
            registry.set("total_locks", "ol_a", 3.0);
            assert_eq!(registry.get("total_locks", "ol_a"), Some(3.0));
            assert_eq!(registry.collect().count(), 1);
        }

        #[test]
        fn instances_are_independent() {
            let registry = MetricRegistry::new();
            registry.set("total_locks", "ol_a", 1.0);
            registry.set("total_locks", "ol_b", 2.0);
            assert_eq!(registry.get("total_locks", "ol_a"), Some(1.0));
            assert_eq!(registry.get("total_locks", "ol_b"), Some(2.0));
        }

        #[test]
        fn unknown_counter_is_ignored() {
            let registry = MetricRegistry::new();
            let before: Vec<_> = registry.describe().collect();

            assert!(!registry.set("unknown_ctr", "ol_a", 1.0));

            assert_eq!(registry.get("unknown_ctr", "ol_a"), None);
            assert_eq!(registry.collect().count(), 0);
            assert_eq!(registry.describe().collect::<Vec<_>>(), before);
        }

        #[test]
        fn get_for_unset_instance_is_none() {
            let registry = MetricRegistry::new();
            registry.set("ckptotal", "ol_a", 0.5);
            assert_eq!(registry.get("ckptotal", "ol_b"), None);
        }
    }

    mod describe_tests {
        use super::*;

        #[test]
        fn describe_lists_every_series() {
            let registry = MetricRegistry::new();
            let descriptors: Vec<_> = registry.describe().collect();
            assert_eq!(descriptors.len(), CATALOG.len());
            assert!(descriptors.iter().all(|d| d.label_names == [INSTANCE_LABEL]));
        }

        #[test]
        fn describe_is_repeatable() {
            let registry = MetricRegistry::new();
            let first: Vec<_> = registry.describe().collect();
            let second: Vec<_> = registry.describe().collect();
            assert_eq!(first, second);
        }

        #[test]
        fn describe_ignores_observed_values() {
            let registry = MetricRegistry::new();
            let before: Vec<_> = registry.describe().collect();
            registry.set("pf_isreads", "ol_a", 1.0);
            let after: Vec<_> = registry.describe().collect();
            assert_eq!(before, after);
        }

        #[test]
        fn descriptor_carries_qualified_name_and_help() {
            let registry = MetricRegistry::new();
            let d = registry
                .describe()
                .find(|d| d.counter == "pf_iscommits")
                .unwrap();
            assert_eq!(d.name, "informix_pf_iscommits");
            assert_eq!(d.help, "Total commits");
        }
    }

    mod collect_tests {
        use super::*;

        #[test]
        fn collect_yields_only_set_pairs() {
            let registry = MetricRegistry::new();
            registry.set("pf_isreads", "ol_a", 42.0);

            let samples: Vec<_> = registry.collect().collect();
            assert_eq!(
                samples,
                vec![Sample {
                    counter: "pf_isreads",
                    instance: "ol_a".to_string(),
                    value: 42.0,
                }]
            );
        }

        #[test]
        fn collect_is_restartable() {
            let registry = MetricRegistry::new();
            registry.set("pf_isreads", "ol_a", 1.0);
            registry.set("pf_iswrites", "ol_b", 2.0);

            let first: Vec<_> = registry.collect().collect();
            let second: Vec<_> = registry.collect().collect();
            assert_eq!(first, second);
            assert_eq!(first.len(), 2);
        }
    }

    mod encode_tests {
        use super::*;

        #[test]
        fn encode_contains_help_for_unset_series() {
            let registry = MetricRegistry::new();
            let mut out = String::new();
            registry.encode_into(&mut out).unwrap();

            assert!(out.contains("# HELP informix_pf_isreads"));
            assert!(out.contains("# TYPE informix_pf_isreads gauge"));
            assert!(!out.contains("informixserver="));
        }

        #[test]
        fn encode_contains_labeled_sample() {
            let registry = MetricRegistry::new();
            registry.set("pf_isreads", "ol_a", 42.0);

            let mut out = String::new();
            registry.encode_into(&mut out).unwrap();
            assert!(out.contains("informix_pf_isreads{informixserver=\"ol_a\"} 42"));
        }
    }

    mod thread_safety_tests {
        use super::*;

        #[test]
        fn concurrent_writers_for_different_instances() {
            let registry = MetricRegistry::new();
            let mut handles = vec![];

            for i in 0..8 {
                let registry = registry.clone();
                handles.push(thread::spawn(move || {
                    let instance = format!("ol_{i}");
                    for j in 0..200 {
                        registry.set("pf_isreads", &instance, f64::from(j));
                    }
                }));
            }

            for handle in handles {
                handle.join().unwrap();
            }

            for i in 0..8 {
                assert_eq!(registry.get("pf_isreads", &format!("ol_{i}")), Some(199.0));
            }
            assert_eq!(registry.collect().count(), 8);
        }

        #[test]
        fn concurrent_collect_and_set() {
            let registry = MetricRegistry::new();
            let writer = {
                let registry = registry.clone();
                thread::spawn(move || {
                    for j in 0..500 {
                        registry.set("total_locks", "ol_a", f64::from(j));
                    }
                })
            };

            for _ in 0..100 {
                for sample in registry.collect() {
                    assert_eq!(sample.counter, "total_locks");
                    assert!((0.0..500.0).contains(&sample.value));
                }
            }

            writer.join().unwrap();
            assert_eq!(registry.get("total_locks", "ol_a"), Some(499.0));
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn last_value_is_observed(values in proptest::collection::vec(-1.0e12f64..1.0e12, 1..50)) {
                let registry = MetricRegistry::new();
                for v in &values {
                    registry.set("n_dirty_buffs", "ol_a", *v);
                }
                prop_assert_eq!(registry.get("n_dirty_buffs", "ol_a"), values.last().copied());
                prop_assert_eq!(registry.collect().count(), 1);
            }
        }
    }
}
