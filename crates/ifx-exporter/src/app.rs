//! Assembly of a running exporter from its configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use ifx_collector::{ConnectionManager, Connector, ExporterConfig, MetricRegistry, ScrapeEngine};
use tracing::info;

use crate::error::ExporterResult;
use crate::scheduler::{SchedulerHandle, start_scrape_task};
use crate::server::ExporterServer;

/// A configured engine, its HTTP server and, unless cycles run on pull, its
/// periodic scrape task.
pub struct Exporter<K: Connector> {
    engine: Arc<ScrapeEngine<K>>,
    server: ExporterServer<K>,
    scheduler: Option<SchedulerHandle>,
    listen: SocketAddr,
}

impl<K: Connector + 'static> Exporter<K> {
    /// Builds the registry, connection manager and scrape engine described by
    /// `config`.
    ///
    /// Must be called from within a tokio runtime when `scrape.on_pull` is
    /// off, since the scrape task starts immediately.
    pub fn start(config: &ExporterConfig, connector: K) -> Self {
        let registry = MetricRegistry::with_namespace(&config.server.namespace);
        let manager =
            ConnectionManager::new(connector, config.instances.clone(), config.retry.policy());
        let engine = Arc::new(ScrapeEngine::new(manager, registry));

        let scheduler = if config.scrape.on_pull {
            info!("scraping on every pull");
            None
        } else {
            info!(interval_secs = config.scrape.interval_secs, "starting scrape task");
            Some(start_scrape_task(Arc::clone(&engine), config.scrape.interval()))
        };

        let server = ExporterServer::new(Arc::clone(&engine), config.scrape.on_pull);

        Self {
            engine,
            server,
            scheduler,
            listen: config.server.listen,
        }
    }

    /// Returns the scrape engine.
    pub fn engine(&self) -> &Arc<ScrapeEngine<K>> {
        &self.engine
    }

    /// Returns the HTTP router.
    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// Returns `true` while the periodic scrape task runs.
    pub fn is_scheduled(&self) -> bool {
        self.scheduler.as_ref().is_some_and(SchedulerHandle::is_running)
    }

    /// Serves until `shutdown` completes, then stops the scrape task.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound.
    pub async fn run_until<F>(self, shutdown: F) -> ExporterResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let result = self.server.serve_with_shutdown(self.listen, shutdown).await;
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
        result
    }
}
