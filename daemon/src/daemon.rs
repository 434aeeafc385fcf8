use anyhow::{Context, Result};
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::config_store::ConfigStore;
use crate::cookies::{CookieJar, JsonCookieJar};
use crate::fetchers::RemoteFetcher;
use crate::router::MessageRouter;
use crate::scheduler::CookieForwardScheduler;
use crate::settings::{EndpointSettings, Settings};
use crate::storage::{MemoryStore, SharedStore, SqliteStore};
use crate::transport::Server;

/// Every long-lived component, wired together
pub struct Daemon {
    router: Arc<MessageRouter>,
    scheduler: Arc<CookieForwardScheduler>,
    config_store: ConfigStore,
}

impl Daemon {
    /// Build from settings. `ephemeral` keeps the config in memory instead of SQLite.
    pub async fn from_settings(settings: &Settings, ephemeral: bool) -> Result<Self> {
        let store: SharedStore = if ephemeral {
            info!("Using in-memory config storage");
            Arc::new(MemoryStore::new())
        } else {
            let db_path = settings.database_path()?;
            let store = SqliteStore::open(&db_path)
                .await
                .with_context(|| format!("Failed to open storage at {:?}", db_path))?;
            info!("Config storage at {:?}", store.path());
            Arc::new(store)
        };

        let jar_path = settings.cookie_jar_path()?;
        info!("Reading cookies from {:?}", jar_path);
        let cookies: Arc<dyn CookieJar> = Arc::new(JsonCookieJar::new(jar_path));

        Ok(Self::new(store, cookies, settings.endpoints.clone(), Client::new()))
    }

    pub fn new(
        store: SharedStore,
        cookies: Arc<dyn CookieJar>,
        endpoints: EndpointSettings,
        client: Client,
    ) -> Self {
        let config_store = ConfigStore::new(store);
        let broadcaster = Arc::new(Broadcaster::new());
        let scheduler = Arc::new(CookieForwardScheduler::new(
            config_store.clone(),
            Arc::clone(&cookies),
            client.clone(),
        ));
        let router = Arc::new(MessageRouter::new(
            config_store.clone(),
            RemoteFetcher::new(client, endpoints),
            cookies,
            broadcaster,
            Arc::clone(&scheduler),
        ));

        Self {
            router,
            scheduler,
            config_store,
        }
    }

    pub fn router(&self) -> Arc<MessageRouter> {
        Arc::clone(&self.router)
    }

    pub fn scheduler(&self) -> Arc<CookieForwardScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub async fn bind(&self, addr: &str) -> Result<Server> {
        Server::bind(addr, self.router())
            .await
            .with_context(|| format!("Failed to listen on {}", addr))
    }

    /// Start the cookie forwarders, serve UI contexts until `shutdown` resolves, then
    /// stop every timer.
    pub async fn run<F>(self, server: Server, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let timers = self.scheduler.initialize().await;
        info!("Started {} cookie forwarders", timers);

        tokio::select! {
            _ = server.run() => {
                warn!("Listener stopped unexpectedly");
            }
            _ = shutdown => {
                info!("Shutdown requested");
            }
        }

        self.scheduler.shutdown();
        info!("Daemon stopped");
        Ok(())
    }
}
