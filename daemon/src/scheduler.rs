use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config_store::ConfigStore;
use crate::cookies::{Cookie, CookieJar, CookieQuery};
use crate::fetchers::ensure_success;
use crate::types::SendCookieConfigItem;

/// What a single forwarding tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The jar had nothing for the domain; no request was made
    NoCookies,
    Sent { count: usize },
    Failed { reason: String },
}

#[derive(Serialize)]
struct ForwardPayload<'a> {
    cookies: &'a [Cookie],
}

/// Periodically POSTs a domain's cookies to a user-configured endpoint, one task per
/// enabled forwarder, keyed by domain.
pub struct CookieForwardScheduler {
    store: ConfigStore,
    cookies: Arc<dyn CookieJar>,
    client: Client,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Held from reading the config until the new timers are in place
    reload: tokio::sync::Mutex<()>,
}

impl CookieForwardScheduler {
    pub fn new(store: ConfigStore, cookies: Arc<dyn CookieJar>, client: Client) -> Self {
        Self {
            store,
            cookies,
            client,
            timers: Mutex::new(HashMap::new()),
            reload: tokio::sync::Mutex::new(()),
        }
    }

    /// Cancel every running timer and start one per enabled forwarder in the stored config.
    /// Safe to call any number of times; returns the number of timers now running.
    pub async fn initialize(&self) -> usize {
        let _reload = self.reload.lock().await;
        let config = self.store.get().await;

        let mut timers = self.timers.lock();
        for (_, handle) in timers.drain() {
            handle.abort();
        }

        for item in config.enabled_forwarders() {
            if item.interval == 0 {
                warn!(
                    "Skipping cookie forwarder for {}: interval must be greater than zero",
                    item.domain
                );
                continue;
            }
            if let Some(previous) = timers.insert(item.domain.clone(), self.spawn_timer(item.clone())) {
                debug!("Replacing duplicate cookie forwarder for {}", item.domain);
                previous.abort();
            }
        }

        info!("Initialized {} cookie forwarding timers", timers.len());
        timers.len()
    }

    /// Stop every timer
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        let count = timers.len();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        if count > 0 {
            info!("Stopped {} cookie forwarding timers", count);
        }
    }

    /// Domains that currently have a live timer
    pub fn active_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .timers
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(domain, _)| domain.clone())
            .collect();
        domains.sort();
        domains
    }

    /// Run one forwarding tick for `item` right now
    pub async fn send(&self, item: &SendCookieConfigItem) -> ForwardOutcome {
        forward_cookies(self.cookies.as_ref(), &self.client, item).await
    }

    fn spawn_timer(&self, item: SendCookieConfigItem) -> JoinHandle<()> {
        let cookies = Arc::clone(&self.cookies);
        let client = self.client.clone();
        let interval = Duration::from_millis(item.interval);

        // Fires immediately, then waits `interval` after each send completes
        tokio::spawn(async move {
            loop {
                forward_cookies(cookies.as_ref(), &client, &item).await;
                tokio::time::sleep(interval).await;
            }
        })
    }
}

impl Drop for CookieForwardScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.get_mut().drain() {
            handle.abort();
        }
    }
}

async fn forward_cookies(
    jar: &dyn CookieJar,
    client: &Client,
    item: &SendCookieConfigItem,
) -> ForwardOutcome {
    let cookies = match jar.get_all(&CookieQuery::Domain(item.domain.clone())).await {
        Ok(cookies) => cookies,
        Err(e) => {
            error!("Failed to read cookies for {}: {}", item.domain, e);
            return ForwardOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    if cookies.is_empty() {
        info!("No cookies found for domain {}", item.domain);
        return ForwardOutcome::NoCookies;
    }

    let result = client
        .post(&item.api_url)
        .json(&ForwardPayload { cookies: &cookies })
        .send()
        .await
        .map_err(crate::errors::TabdashError::from)
        .and_then(|response| ensure_success("cookie forward", response));

    match result {
        Ok(_) => {
            info!("Sent {} cookies to {}", cookies.len(), item.api_url);
            ForwardOutcome::Sent {
                count: cookies.len(),
            }
        }
        Err(e) => {
            error!("Failed to send cookies to {}: {}", item.api_url, e);
            ForwardOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}
