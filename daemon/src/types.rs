use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default cookie forwarding interval for new items (5 minutes)
pub const DEFAULT_FORWARD_INTERVAL_MS: u64 = 300_000;

// ========== Stored configuration ==========

/// The single persisted settings object shared by every UI context
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub yes_code: UsageToggle,
    pub cursor_settings: UsageToggle,
    pub packy_codex: UsageToggle,
    pub mini_max: MiniMaxSettings,
    pub bookmarks: BookmarkSettings,
    pub send_cookie: Vec<SendCookieConfigItem>,
}

/// Visibility switch for a usage card
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageToggle {
    pub show_usage: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MiniMaxSettings {
    pub api_key: String,
    pub show_usage: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookmarkSettings {
    pub items: Vec<Bookmark>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Base64 data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl Bookmark {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            url: url.into(),
            favicon: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCookieConfigItem {
    pub id: String,
    /// Site domain whose cookies are forwarded, e.g. "example.com"
    pub domain: String,
    /// Full destination URL
    pub api_url: String,
    /// Milliseconds between sends
    pub interval: u64,
    pub enabled: bool,
}

impl SendCookieConfigItem {
    pub fn new(domain: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            domain: domain.into(),
            api_url: api_url.into(),
            interval: DEFAULT_FORWARD_INTERVAL_MS,
            enabled: true,
        }
    }
}

/// Partial AppConfig: sections left as None keep their stored value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes_code: Option<UsageToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_settings: Option<UsageToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packy_codex: Option<UsageToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mini_max: Option<MiniMaxSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<BookmarkSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_cookie: Option<Vec<SendCookieConfigItem>>,
}

impl AppConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn touches_send_cookie(&self) -> bool {
        self.send_cookie.is_some()
    }
}

impl From<AppConfig> for AppConfigPatch {
    fn from(config: AppConfig) -> Self {
        Self {
            yes_code: Some(config.yes_code),
            cursor_settings: Some(config.cursor_settings),
            packy_codex: Some(config.packy_codex),
            mini_max: Some(config.mini_max),
            bookmarks: Some(config.bookmarks),
            send_cookie: Some(config.send_cookie),
        }
    }
}

impl AppConfig {
    /// Shallow top-level merge: every section present in the patch replaces ours wholesale
    pub fn merged(mut self, patch: AppConfigPatch) -> Self {
        if let Some(section) = patch.yes_code {
            self.yes_code = section;
        }
        if let Some(section) = patch.cursor_settings {
            self.cursor_settings = section;
        }
        if let Some(section) = patch.packy_codex {
            self.packy_codex = section;
        }
        if let Some(section) = patch.mini_max {
            self.mini_max = section;
        }
        if let Some(section) = patch.bookmarks {
            self.bookmarks = section;
        }
        if let Some(section) = patch.send_cookie {
            self.send_cookie = section;
        }
        self
    }

    pub fn enabled_forwarders(&self) -> impl Iterator<Item = &SendCookieConfigItem> {
        self.send_cookie.iter().filter(|item| item.enabled)
    }
}

// ========== Remote usage snapshots ==========
//
// The daemon hands these bodies to UI contexts untouched. The structs below are
// only for terminal rendering, so every field tolerates absence and loose types.

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct YesCodeBalanceData {
    #[serde(deserialize_with = "lenient::number")]
    pub balance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub pay_as_you_go_balance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub subscription_balance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub total_balance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub weekly_limit: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub weekly_spent_balance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CursorUsageAggregation {
    #[serde(deserialize_with = "lenient::text")]
    pub model_intent: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub input_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub output_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub cache_write_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub cache_read_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub total_cents: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CursorUsageData {
    pub aggregations: Vec<CursorUsageAggregation>,
    #[serde(deserialize_with = "lenient::text")]
    pub total_input_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub total_output_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub total_cache_write_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub total_cache_read_tokens: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub total_cost_cents: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ModelRemain {
    #[serde(deserialize_with = "lenient::text")]
    pub model_name: Option<String>,
    /// Epoch milliseconds
    #[serde(deserialize_with = "lenient::integer")]
    pub start_time: i64,
    #[serde(deserialize_with = "lenient::integer")]
    pub end_time: i64,
    /// Milliseconds until the interval resets
    #[serde(deserialize_with = "lenient::integer")]
    pub remains_time: i64,
    #[serde(deserialize_with = "lenient::integer")]
    pub current_interval_total_count: i64,
    #[serde(deserialize_with = "lenient::integer")]
    pub current_interval_usage_count: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct MiniMaxRemainsData {
    pub model_remains: Vec<ModelRemain>,
}

/// PackyCodex reports money as strings, but numbers have been seen too
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsdAmount {
    Text(String),
    Number(f64),
}

impl UsdAmount {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Text(text) => text.trim().parse().ok(),
            Self::Number(value) => Some(*value),
        }
    }
}

/// Upstream user-info payload. Only ever deserialized: it embeds the account's api_key.
#[derive(Clone, Deserialize)]
pub struct PackyCodexUserInfo {
    #[serde(default)]
    pub daily_budget_usd: Option<UsdAmount>,
    #[serde(default)]
    pub daily_spent_usd: Option<UsdAmount>,
    #[serde(default)]
    pub weekly_budget_usd: Option<UsdAmount>,
    #[serde(default)]
    pub weekly_spent_usd: Option<UsdAmount>,
    #[serde(default)]
    pub weekly_window_start: Option<String>,
    #[serde(default)]
    pub weekly_window_end: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for PackyCodexUserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackyCodexUserInfo")
            .field("daily_budget_usd", &self.daily_budget_usd)
            .field("daily_spent_usd", &self.daily_spent_usd)
            .field("weekly_budget_usd", &self.weekly_budget_usd)
            .field("weekly_spent_usd", &self.weekly_spent_usd)
            .field("weekly_window_start", &self.weekly_window_start)
            .field("weekly_window_end", &self.weekly_window_end)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Allow-listed projection of PackyCodexUserInfo that is safe to hand to UI contexts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackyCodexUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget_usd: Option<UsdAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_spent_usd: Option<UsdAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_budget_usd: Option<UsdAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_spent_usd: Option<UsdAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_window_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_window_end: Option<String>,
}

impl From<PackyCodexUserInfo> for PackyCodexUsage {
    fn from(info: PackyCodexUserInfo) -> Self {
        Self {
            daily_budget_usd: info.daily_budget_usd,
            daily_spent_usd: info.daily_spent_usd,
            weekly_budget_usd: info.weekly_budget_usd,
            weekly_spent_usd: info.weekly_spent_usd,
            weekly_window_start: info.weekly_window_start,
            weekly_window_end: info.weekly_window_end,
        }
    }
}
