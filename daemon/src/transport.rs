//! Newline-delimited JSON over TCP. Each connection is one UI context: requests are
//! answered on the same socket (echoing `id`), and config broadcasts are pushed to
//! every other open connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broadcast::{ChannelRecipient, Notification};
use crate::errors::TabdashResult;
use crate::router::{Envelope, MessageResponse, MessageRouter};

/// One line written by the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Reply(MessageResponse),
    Broadcast(Notification),
}

impl From<Notification> for Outbound {
    fn from(notification: Notification) -> Self {
        Outbound::Broadcast(notification)
    }
}

pub struct Server {
    listener: TcpListener,
    router: Arc<MessageRouter>,
}

impl Server {
    pub async fn bind(addr: &str, router: Arc<MessageRouter>) -> TabdashResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, router })
    }

    pub fn local_addr(&self) -> TabdashResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Listening for UI contexts on {}", addr),
            Err(e) => warn!("Listening on an unknown address: {}", e),
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let router = Arc::clone(&self.router);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, router).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, router: Arc<MessageRouter>) {
    let connection_id = Uuid::new_v4().to_string();
    debug!("UI context {} connected from {}", connection_id, peer);

    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    router
        .broadcaster()
        .register(Arc::new(ChannelRecipient::new(connection_id.clone(), tx.clone())));

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let line = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if writer.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                // Requests on one connection are independent; answers are matched by id
                let router = Arc::clone(&router);
                let tx = tx.clone();
                let origin = connection_id.clone();
                tokio::spawn(async move {
                    let response = handle_line(&router, Some(origin.as_str()), &line).await;
                    let _ = tx.send(Outbound::Reply(response));
                });
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Read error on {}: {}", connection_id, e);
                break;
            }
        }
    }

    router.broadcaster().unregister(&connection_id);
    drop(tx);
    if let Err(e) = writer_task.await {
        debug!("Writer for {} ended abnormally: {}", connection_id, e);
    }
    debug!("UI context {} disconnected", connection_id);
}

/// Parse one request line from connection `origin` and route it. Malformed input still
/// gets a response.
pub async fn handle_line(
    router: &MessageRouter,
    origin: Option<&str>,
    line: &str,
) -> MessageResponse {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return MessageResponse::failure(format!("invalid message: {}", e)),
    };
    let id = value.get("id").cloned();

    match serde_json::from_value::<Envelope>(value) {
        Ok(envelope) => router.handle_envelope_from(origin, envelope).await,
        Err(e) => MessageResponse::failure(format!("invalid message: {}", e)).with_id(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_lines() {
        let broadcast = serde_json::to_string(&Outbound::from(Notification::AppConfigUpdated)).unwrap();
        assert_eq!(broadcast, r#"{"type":"APP_CONFIG_UPDATED"}"#);

        let reply = serde_json::to_string(&Outbound::Reply(
            MessageResponse::failure("nope").with_id(Some(serde_json::json!(3))),
        ))
        .unwrap();
        assert_eq!(reply, r#"{"id":3,"success":false,"error":"nope"}"#);
    }

    #[test]
    fn test_inbound_lines_are_told_apart() {
        let broadcast: Outbound = serde_json::from_str(r#"{"type":"APP_CONFIG_UPDATED"}"#).unwrap();
        assert_eq!(broadcast, Outbound::Broadcast(Notification::AppConfigUpdated));

        let reply: Outbound = serde_json::from_str(r#"{"id":1,"success":true}"#).unwrap();
        assert!(matches!(reply, Outbound::Reply(MessageResponse { success: true, .. })));
    }
}
