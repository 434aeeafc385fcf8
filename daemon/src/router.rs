use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::config_store::ConfigStore;
use crate::cookies::{cookie_header, mask_secret, CookieJar, CookieQuery};
use crate::errors::{TabdashError, TabdashResult};
use crate::fetchers::RemoteFetcher;
use crate::scheduler::CookieForwardScheduler;
use crate::types::{AppConfig, AppConfigPatch, PackyCodexUsage};

pub const GET_APP_CONFIG: &str = "GET_APP_CONFIG";
pub const SAVE_APP_CONFIG: &str = "SAVE_APP_CONFIG";
pub const FETCH_BALANCE: &str = "FETCH_BALANCE";
pub const FETCH_CURSOR_USAGE: &str = "FETCH_CURSOR_USAGE";
pub const FETCH_MINIMAX_REMAINS: &str = "FETCH_MINIMAX_REMAINS";
pub const FETCH_PACKYCODEX_USER_INFO: &str = "FETCH_PACKYCODEX_USER_INFO";

const YESCODE_DOMAIN: &str = "yes.vg";
const CURSOR_DOMAIN: &str = "cursor.com";
const PACKYCODEX_DOMAIN: &str = "codex.packycode.com";
const PACKYCODEX_URL: &str = "https://codex.packycode.com/";
const PACKYCODEX_TOKEN_COOKIE: &str = "token";

/// Raw request as it arrives on the wire: `{"id"?, "type", "data"?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(request: &Request) -> TabdashResult<Self> {
        let data = match request {
            Request::SaveAppConfig(patch) => Some(serde_json::to_value(patch)?),
            _ => None,
        };
        Ok(Self {
            id: None,
            kind: request.tag().to_string(),
            data,
        })
    }

    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }
}

/// Every message a UI context may send. No other tags are accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetAppConfig,
    SaveAppConfig(AppConfigPatch),
    FetchBalance,
    FetchCursorUsage,
    FetchMiniMaxRemains,
    FetchPackyCodexUserInfo,
}

impl Request {
    pub fn tag(&self) -> &'static str {
        match self {
            Request::GetAppConfig => GET_APP_CONFIG,
            Request::SaveAppConfig(_) => SAVE_APP_CONFIG,
            Request::FetchBalance => FETCH_BALANCE,
            Request::FetchCursorUsage => FETCH_CURSOR_USAGE,
            Request::FetchMiniMaxRemains => FETCH_MINIMAX_REMAINS,
            Request::FetchPackyCodexUserInfo => FETCH_PACKYCODEX_USER_INFO,
        }
    }

    /// Decode a tag and its payload. A missing or null save payload is an empty patch.
    pub fn from_parts(kind: &str, data: Option<Value>) -> TabdashResult<Self> {
        match kind {
            GET_APP_CONFIG => Ok(Request::GetAppConfig),
            SAVE_APP_CONFIG => {
                let patch = match data {
                    None | Some(Value::Null) => AppConfigPatch::default(),
                    Some(value) => serde_json::from_value(value).map_err(|e| {
                        TabdashError::validation(format!("invalid {} payload: {}", SAVE_APP_CONFIG, e))
                    })?,
                };
                Ok(Request::SaveAppConfig(patch))
            }
            FETCH_BALANCE => Ok(Request::FetchBalance),
            FETCH_CURSOR_USAGE => Ok(Request::FetchCursorUsage),
            FETCH_MINIMAX_REMAINS => Ok(Request::FetchMiniMaxRemains),
            FETCH_PACKYCODEX_USER_INFO => Ok(Request::FetchPackyCodexUserInfo),
            other => Err(TabdashError::validation(format!("unknown message type: {}", other))),
        }
    }
}

/// Successful handler results. Usage bodies stay as the upstream sent them.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Config(AppConfig),
    Saved,
    Balance(Value),
    CursorUsage(Value),
    MiniMaxRemains(Value),
    PackyCodexUsage(PackyCodexUsage),
}

impl Reply {
    fn into_data(self) -> TabdashResult<Option<Value>> {
        let value = match self {
            Reply::Saved => return Ok(None),
            Reply::Config(config) => serde_json::to_value(config)?,
            Reply::Balance(data) | Reply::CursorUsage(data) | Reply::MiniMaxRemains(data) => data,
            Reply::PackyCodexUsage(data) => serde_json::to_value(data)?,
        };
        Ok(Some(value))
    }
}

/// Uniform response: `{"id"?, "success", "data"?, "error"?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageResponse {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            id: None,
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            id: None,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }

    /// Decode `data` into a typed payload, or surface `error` as a TabdashError
    pub fn into_payload<T>(self) -> TabdashResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.success {
            return Err(TabdashError::validation(
                self.error.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        Ok(serde_json::from_value(self.data.unwrap_or(Value::Null))?)
    }
}

/// Central dispatcher between UI contexts and the daemon's services
pub struct MessageRouter {
    config_store: ConfigStore,
    fetcher: RemoteFetcher,
    cookies: Arc<dyn CookieJar>,
    broadcaster: Arc<Broadcaster>,
    scheduler: Arc<CookieForwardScheduler>,
}

impl MessageRouter {
    pub fn new(
        config_store: ConfigStore,
        fetcher: RemoteFetcher,
        cookies: Arc<dyn CookieJar>,
        broadcaster: Arc<Broadcaster>,
        scheduler: Arc<CookieForwardScheduler>,
    ) -> Self {
        Self {
            config_store,
            fetcher,
            cookies,
            broadcaster,
            scheduler,
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Decode, dispatch and wrap. Never fails: every error becomes `success: false`.
    pub async fn handle_envelope(&self, envelope: Envelope) -> MessageResponse {
        self.handle_envelope_from(None, envelope).await
    }

    /// Like `handle_envelope`, for a message sent by the registered UI context `origin`
    pub async fn handle_envelope_from(
        &self,
        origin: Option<&str>,
        envelope: Envelope,
    ) -> MessageResponse {
        let Envelope { id, kind, data } = envelope;
        debug!("Received {} message", kind);

        let request = match Request::from_parts(&kind, data) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected message: {}", e);
                return MessageResponse::failure(e.to_string()).with_id(id);
            }
        };

        let response = match self
            .dispatch_from(origin, request)
            .await
            .and_then(Reply::into_data)
        {
            Ok(data) => MessageResponse::ok(data),
            Err(e) => {
                debug!("{} failed: {}", kind, e);
                MessageResponse::failure(e.to_string())
            }
        };
        response.with_id(id)
    }

    pub async fn dispatch(&self, request: Request) -> TabdashResult<Reply> {
        self.dispatch_from(None, request).await
    }

    async fn dispatch_from(&self, origin: Option<&str>, request: Request) -> TabdashResult<Reply> {
        match request {
            Request::GetAppConfig => Ok(Reply::Config(self.config_store.get().await)),
            Request::SaveAppConfig(patch) => self.save_app_config(patch, origin).await,
            Request::FetchBalance => {
                let cookie = self.cookie_header_for(YESCODE_DOMAIN).await?;
                Ok(Reply::Balance(self.fetcher.fetch_yescode_balance(&cookie).await?))
            }
            Request::FetchCursorUsage => {
                let cookie = self.cookie_header_for(CURSOR_DOMAIN).await?;
                Ok(Reply::CursorUsage(self.fetcher.fetch_cursor_usage(&cookie).await?))
            }
            Request::FetchMiniMaxRemains => self.fetch_minimax_remains().await,
            Request::FetchPackyCodexUserInfo => self.fetch_packycodex_usage().await,
        }
    }

    async fn save_app_config(
        &self,
        patch: AppConfigPatch,
        origin: Option<&str>,
    ) -> TabdashResult<Reply> {
        self.config_store.save(patch).await?;

        let report = self.broadcaster.notify(origin).await;
        if report.failed > 0 {
            debug!("{} UI contexts missed the config update", report.failed);
        }

        let timers = self.scheduler.initialize().await;
        info!("Config saved; {} cookie forwarders running", timers);
        Ok(Reply::Saved)
    }

    async fn cookie_header_for(&self, domain: &str) -> TabdashResult<String> {
        let cookies = self
            .cookies
            .get_all(&CookieQuery::Domain(domain.to_string()))
            .await?;
        if cookies.is_empty() {
            return Err(TabdashError::NotLoggedIn {
                domain: domain.to_string(),
            });
        }
        Ok(cookie_header(&cookies))
    }

    async fn fetch_minimax_remains(&self) -> TabdashResult<Reply> {
        let config = self.config_store.get().await;
        let api_key = config.mini_max.api_key;
        if api_key.is_empty() {
            return Err(TabdashError::validation("请先在设置中配置 MiniMax API Key"));
        }
        debug!("Fetching MiniMax remains with key {}", mask_secret(&api_key));
        Ok(Reply::MiniMaxRemains(
            self.fetcher.fetch_minimax_remains(&api_key).await?,
        ))
    }

    async fn fetch_packycodex_usage(&self) -> TabdashResult<Reply> {
        let cookies = self
            .cookies
            .get_all(&CookieQuery::Url(PACKYCODEX_URL.to_string()))
            .await?;
        if cookies.is_empty() {
            return Err(TabdashError::NotLoggedIn {
                domain: PACKYCODEX_DOMAIN.to_string(),
            });
        }

        let Some(token) = cookies
            .iter()
            .find(|c| c.name == PACKYCODEX_TOKEN_COOKIE)
            .map(|c| c.value.clone())
        else {
            return Err(TabdashError::validation(
                "未找到 token cookie，请重新登录 codex.packycode.com",
            ));
        };

        debug!("Fetching PackyCodex user info with token {}", mask_secret(&token));
        match self
            .fetcher
            .fetch_packycodex_user_info(&token, &cookie_header(&cookies))
            .await
        {
            Ok(info) => Ok(Reply::PackyCodexUsage(PackyCodexUsage::from(info))),
            Err(e) => Err(classify_packycodex_error(&e)),
        }
    }
}

/// Map upstream failures to what the user should do next
fn classify_packycodex_error(error: &TabdashError) -> TabdashError {
    warn!("PackyCodex user info failed: {}", error);
    let message = match error.http_status() {
        Some(401) | Some(403) => "登录已过期，请重新登录 codex.packycode.com",
        Some(429) => "请求过于频繁，请稍后再试",
        _ => "获取用户信息失败，请稍后重试",
    };
    TabdashError::validation(message)
}
