//! Periodic scrape scheduling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ifx_collector::{Connector, ScrapeEngine};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// Handle for controlling the scrape task.
#[derive(Debug)]
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if the scrape task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the scrape task after the current cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Start a task that runs one scrape cycle per `interval`.
///
/// The first cycle runs immediately. Each cycle runs on the blocking pool;
/// the next tick is not awaited until the previous cycle has returned.
pub fn start_scrape_task<K>(engine: Arc<ScrapeEngine<K>>, interval: Duration) -> SchedulerHandle
where
    K: Connector + 'static,
{
    let handle = SchedulerHandle::new();
    handle.running.store(true, Ordering::SeqCst);
    let running = Arc::clone(&handle.running);

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while running.load(Ordering::SeqCst) {
            timer.tick().await;

            if !running.load(Ordering::SeqCst) {
                break;
            }

            let engine = Arc::clone(&engine);
            match tokio::task::spawn_blocking(move || engine.run_cycle()).await {
                Ok(stats) => debug!(
                    live = stats.live,
                    excluded = stats.excluded,
                    "scheduled cycle finished"
                ),
                Err(e) => error!(error = %e, "scrape cycle task failed"),
            }
        }
    });

    handle
}
