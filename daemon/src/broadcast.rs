use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::errors::{TabdashError, TabdashResult};

/// One-way messages pushed from the daemon to UI contexts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "APP_CONFIG_UPDATED")]
    AppConfigUpdated,
}

/// A UI context that can receive notifications
#[async_trait]
pub trait Recipient: Send + Sync {
    fn id(&self) -> &str;

    async fn deliver(&self, notification: &Notification) -> TabdashResult<()>;
}

/// Outcome of a best-effort multicast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Send to every recipient in turn. A failure is counted and logged; it never stops
/// delivery to the rest.
pub async fn multicast<R, F, Fut>(recipients: &[R], send: F) -> BroadcastReport
where
    F: Fn(&R) -> Fut,
    Fut: Future<Output = TabdashResult<()>>,
{
    let mut report = BroadcastReport::default();
    for (index, recipient) in recipients.iter().enumerate() {
        match send(recipient).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                debug!("Broadcast to recipient #{} failed: {}", index, e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Registry of connected UI contexts
#[derive(Default)]
pub struct Broadcaster {
    recipients: RwLock<Vec<Arc<dyn Recipient>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, recipient: Arc<dyn Recipient>) {
        debug!("Registered UI context {}", recipient.id());
        self.recipients.write().push(recipient);
    }

    pub fn unregister(&self, id: &str) {
        self.recipients.write().retain(|r| r.id() != id);
        debug!("Unregistered UI context {}", id);
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.read().len()
    }

    /// Tell every UI context except `origin` (the one that made the change) that the
    /// stored config changed
    pub async fn notify(&self, origin: Option<&str>) -> BroadcastReport {
        let recipients: Vec<Arc<dyn Recipient>> = self
            .recipients
            .read()
            .iter()
            .filter(|r| Some(r.id()) != origin)
            .cloned()
            .collect();
        let notification = Notification::AppConfigUpdated;

        let report = multicast(&recipients, |recipient| {
            let recipient = Arc::clone(recipient);
            let notification = &notification;
            async move {
                recipient.deliver(notification).await.map_err(|e| {
                    debug!("UI context {} unreachable: {}", recipient.id(), e);
                    e
                })
            }
        })
        .await;

        info!(
            "Config update broadcast: {} delivered, {} failed",
            report.delivered, report.failed
        );
        report
    }
}

/// Recipient backed by an in-process channel. Delivery fails once the receiving side
/// has gone away.
pub struct ChannelRecipient<T> {
    id: String,
    sender: UnboundedSender<T>,
}

impl<T> ChannelRecipient<T> {
    pub fn new(id: impl Into<String>, sender: UnboundedSender<T>) -> Self {
        Self {
            id: id.into(),
            sender,
        }
    }
}

#[async_trait]
impl<T> Recipient for ChannelRecipient<T>
where
    T: From<Notification> + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, notification: &Notification) -> TabdashResult<()> {
        self.sender
            .send(T::from(notification.clone()))
            .map_err(|_| TabdashError::Transport {
                message: format!("recipient {} is closed", self.id),
            })
    }
}
