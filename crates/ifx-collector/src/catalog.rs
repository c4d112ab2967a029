//! The fixed set of Informix counters this crate exports.
//!
//! Every counter the scrape engine may store is listed here. Names that show
//! up in query results but are absent from [`CATALOG`] are ignored.

/// A single catalog entry: the counter name and its help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterDef {
    /// Counter name, unique within the catalog.
    pub name: &'static str,
    /// Human-readable description exported as the series help text.
    pub help: &'static str,
}

impl CounterDef {
    const fn new(name: &'static str, help: &'static str) -> Self {
        Self { name, help }
    }
}

/// Label name identifying the source instance on every series.
pub const INSTANCE_LABEL: &str = "informixserver";

/// Default exposition namespace prepended to every counter name.
pub const DEFAULT_NAMESPACE: &str = "informix";

/// Every monitored counter, in exposition order.
pub static CATALOG: &[CounterDef] = &[
    // sysshmhdr profile counters
    CounterDef::new("pf_isamtot", "Total ISAM operations"),
    CounterDef::new("pf_isopens", "Total ISAM opens"),
    CounterDef::new("pf_isreads", "Total ISAM reads"),
    CounterDef::new("pf_iswrites", "Total ISAM writes"),
    CounterDef::new("pf_isrewrites", "Total ISAM updates"),
    CounterDef::new("pf_isdeletes", "Total ISAM deletes"),
    CounterDef::new("pf_iscommits", "Total commits"),
    CounterDef::new("pf_isrollbacks", "Total rollbacks"),
    CounterDef::new("pf_latchwts", "Total latch waits"),
    CounterDef::new("pf_buffwts", "Total buffer waits"),
    CounterDef::new("pf_lockreqs", "Total lock requests"),
    CounterDef::new("pf_lockwts", "Total lock waits"),
    CounterDef::new("pf_ckptwts", "Total checkpoint waits"),
    CounterDef::new("pf_plgwrites", "Total physical log writes"),
    CounterDef::new("pf_pagreads", "Total page reads"),
    CounterDef::new("pf_btradata", "Read-ahead data pages"),
    CounterDef::new("pf_rapgs_used", "Read-ahead pages used"),
    CounterDef::new("pf_btraidx", "Read-ahead index pages"),
    CounterDef::new("pf_dpra", "Read-ahead data pages via index"),
    CounterDef::new("pf_seqscans", "Total sequential scans"),
    CounterDef::new("pf_totalsorts", "Total sorts"),
    CounterDef::new("pf_memsorts", "Sorts performed in memory"),
    CounterDef::new("pf_disksorts", "Sorts spilled to disk"),
    // Buffer pools
    CounterDef::new("pagreads_2K", "Page reads, 2K buffer pool"),
    CounterDef::new("bufreads_2K", "Buffer reads, 2K buffer pool"),
    CounterDef::new("pagwrites_2K", "Page writes, 2K buffer pool"),
    CounterDef::new("bufwrites_2K", "Buffer writes, 2K buffer pool"),
    CounterDef::new("bufwaits_2K", "Buffer waits, 2K buffer pool"),
    CounterDef::new("pagreads_16K", "Page reads, 16K buffer pool"),
    CounterDef::new("bufreads_16K", "Buffer reads, 16K buffer pool"),
    CounterDef::new("pagwrites_16K", "Page writes, 16K buffer pool"),
    CounterDef::new("bufwrites_16K", "Buffer writes, 16K buffer pool"),
    CounterDef::new("bufwaits_16K", "Buffer waits, 16K buffer pool"),
    CounterDef::new("brt_2048", "Buffer turnover ratio per hour, 2K buffer pool"),
    CounterDef::new("brt_16384", "Buffer turnover ratio per hour, 16K buffer pool"),
    // Transactions and locks
    CounterDef::new("open_transactions", "Open transactions"),
    CounterDef::new("total_locks", "Locks held by open transactions"),
    CounterDef::new("locks_with_waiter", "Locks with at least one waiter"),
    // Logical logs and backups
    CounterDef::new("logs_without_backup", "Logical logs not yet backed up"),
    CounterDef::new("LastBackup", "Time of the most recent level 0 backup"),
    // Checkpoints
    CounterDef::new("ckptotal", "Duration of the last checkpoint in seconds"),
    CounterDef::new("dskflush_per_sec", "Disk flushes per second during the last checkpoint"),
    CounterDef::new("n_dirty_buffs", "Dirty buffers flushed by the last checkpoint"),
    // Replication
    CounterDef::new("LastHdrPing", "Time of the last HDR ping"),
    // Network
    CounterDef::new("net_connects", "Number of connects"),
];
