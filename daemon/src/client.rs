use serde_json::json;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::broadcast::Notification;
use crate::errors::{TabdashError, TabdashResult};
use crate::router::{Envelope, MessageResponse, Request};
use crate::transport::Outbound;
use crate::types::{AppConfig, AppConfigPatch};

/// UI-side connection to a running daemon
pub struct DaemonClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_id: u64,
    notifications: VecDeque<Notification>,
}

impl DaemonClient {
    pub async fn connect(addr: &str) -> TabdashResult<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| TabdashError::Transport {
            message: format!("cannot reach daemon at {}: {}", addr, e),
        })?;
        let (reader, writer) = stream.into_split();
        debug!("Connected to daemon at {}", addr);
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
            next_id: 1,
            notifications: VecDeque::new(),
        })
    }

    /// Send one request and wait for its response. Broadcasts that arrive in the
    /// meantime are queued for `next_notification`.
    pub async fn request(&mut self, request: &Request) -> TabdashResult<MessageResponse> {
        let id = self.next_id;
        self.next_id += 1;

        let envelope = Envelope::new(request)?.with_id(json!(id));
        let line = serde_json::to_string(&envelope)?;
        self.writer.write_all(format!("{}\n", line).as_bytes()).await?;

        loop {
            match self.read_frame().await? {
                Some(Outbound::Reply(response)) if response.id == Some(json!(id)) => {
                    return Ok(response)
                }
                Some(Outbound::Reply(response)) => {
                    debug!("Ignoring response for another request: {:?}", response.id);
                }
                Some(Outbound::Broadcast(notification)) => self.notifications.push_back(notification),
                None => {
                    return Err(TabdashError::Transport {
                        message: "daemon closed the connection".to_string(),
                    })
                }
            }
        }
    }

    pub async fn get_app_config(&mut self) -> TabdashResult<AppConfig> {
        self.request(&Request::GetAppConfig).await?.into_payload()
    }

    pub async fn save_app_config(&mut self, patch: AppConfigPatch) -> TabdashResult<()> {
        let response = self.request(&Request::SaveAppConfig(patch)).await?;
        if response.success {
            Ok(())
        } else {
            Err(TabdashError::validation(
                response.error.unwrap_or_else(|| "save failed".to_string()),
            ))
        }
    }

    /// Wait for the next broadcast; `None` once the daemon hangs up
    pub async fn next_notification(&mut self) -> TabdashResult<Option<Notification>> {
        if let Some(notification) = self.notifications.pop_front() {
            return Ok(Some(notification));
        }
        loop {
            match self.read_frame().await? {
                Some(Outbound::Broadcast(notification)) => return Ok(Some(notification)),
                Some(Outbound::Reply(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    async fn read_frame(&mut self) -> TabdashResult<Option<Outbound>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(&line)?));
        }
    }
}
