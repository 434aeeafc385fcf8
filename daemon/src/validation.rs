//! Structural validation and whitelisting for configuration arriving from outside,
//! mainly imported files.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{TabdashError, TabdashResult};
use crate::types::{
    AppConfig, Bookmark, BookmarkSettings, MiniMaxSettings, SendCookieConfigItem, UsageToggle,
};

const REQUIRED_FIELDS: [&str; 3] = ["yesCode", "cursorSettings", "bookmarks"];
const FAVICON_PREFIX: &str = "data:image/";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized: Option<AppConfig>,
}

impl ValidationResult {
    fn accepted(config: AppConfig) -> Self {
        Self {
            valid: true,
            error: None,
            sanitized: Some(config),
        }
    }

    fn rejected(message: String) -> Self {
        Self {
            valid: false,
            error: Some(message),
            sanitized: None,
        }
    }

    pub fn into_result(self) -> TabdashResult<AppConfig> {
        match (self.valid, self.sanitized) {
            (true, Some(config)) => Ok(config),
            _ => Err(TabdashError::validation(
                self.error.unwrap_or_else(|| "配置验证失败".to_string()),
            )),
        }
    }
}

/// Validate an untrusted config payload and produce a sanitized copy. Never panics.
pub fn validate(raw: &Value) -> ValidationResult {
    match check(raw) {
        Ok(config) => ValidationResult::accepted(config),
        Err(message) => ValidationResult::rejected(message),
    }
}

fn check(raw: &Value) -> Result<AppConfig, String> {
    let config = raw
        .as_object()
        .ok_or_else(|| "配置数据格式错误".to_string())?;

    for field in REQUIRED_FIELDS {
        if !config.contains_key(field) {
            return Err(format!("缺少必需字段: {}", field));
        }
    }

    let yes_code = check_toggle(config, "yesCode")?;
    let cursor_settings = check_toggle(config, "cursorSettings")?;

    let bookmarks = config
        .get("bookmarks")
        .and_then(Value::as_object)
        .ok_or_else(|| "bookmarks 格式错误".to_string())?;
    let items = bookmarks
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| "bookmarks.items 必须是数组".to_string())?;
    for (index, bookmark) in items.iter().enumerate() {
        if !is_valid_bookmark(bookmark) {
            return Err(format!("书签 {} 格式错误", index + 1));
        }
    }

    let packy_codex = match config.get("packyCodex") {
        Some(_) => check_toggle(config, "packyCodex")?,
        None => UsageToggle::default(),
    };

    let mini_max = match config.get("miniMax") {
        Some(section) => check_mini_max(section)?,
        None => MiniMaxSettings::default(),
    };

    let send_cookie = match config.get("sendCookie") {
        Some(section) => check_send_cookie(section)?,
        None => Vec::new(),
    };

    Ok(AppConfig {
        yes_code,
        cursor_settings,
        packy_codex,
        mini_max,
        bookmarks: BookmarkSettings {
            items: items.iter().map(sanitize_bookmark).collect(),
        },
        send_cookie,
    })
}

fn check_toggle(config: &Map<String, Value>, name: &str) -> Result<UsageToggle, String> {
    let section = config
        .get(name)
        .and_then(Value::as_object)
        .ok_or_else(|| format!("{} 格式错误", name))?;
    let show_usage = section
        .get("showUsage")
        .filter(|v| v.is_boolean())
        .ok_or_else(|| format!("{}.showUsage 必须是布尔值", name))?;
    Ok(UsageToggle {
        show_usage: truthy(show_usage),
    })
}

fn check_mini_max(section: &Value) -> Result<MiniMaxSettings, String> {
    let section = section
        .as_object()
        .ok_or_else(|| "miniMax 格式错误".to_string())?;
    let api_key = section
        .get("apiKey")
        .and_then(Value::as_str)
        .ok_or_else(|| "miniMax.apiKey 必须是字符串".to_string())?;
    let show_usage = section
        .get("showUsage")
        .filter(|v| v.is_boolean())
        .ok_or_else(|| "miniMax.showUsage 必须是布尔值".to_string())?;
    Ok(MiniMaxSettings {
        api_key: api_key.to_string(),
        show_usage: truthy(show_usage),
    })
}

/// Imported forwarders keep their `enabled` flag; the import preview names the ones
/// that would start sending cookies.
fn check_send_cookie(section: &Value) -> Result<Vec<SendCookieConfigItem>, String> {
    let items = section
        .as_array()
        .ok_or_else(|| "sendCookie 必须是数组".to_string())?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let invalid = || format!("Cookie 配置 {} 格式错误", index + 1);
            let item = item.as_object().ok_or_else(invalid)?;
            let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

            let interval = item
                .get("interval")
                .and_then(Value::as_f64)
                .filter(|ms| *ms >= 1.0)
                .ok_or_else(invalid)?;
            if !item.get("enabled").is_some_and(Value::is_boolean) {
                return Err(invalid());
            }

            Ok(SendCookieConfigItem {
                id: text("id")
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                domain: text("domain").ok_or_else(invalid)?,
                api_url: text("apiUrl").ok_or_else(invalid)?,
                interval: interval.round() as u64,
                enabled: item.get("enabled").is_some_and(truthy),
            })
        })
        .collect()
}

fn is_valid_bookmark(data: &Value) -> bool {
    let Some(bookmark) = data.as_object() else {
        return false;
    };
    let is_string = |key: &str| bookmark.get(key).is_some_and(Value::is_string);
    is_string("id")
        && is_string("title")
        && is_string("url")
        && bookmark.get("favicon").map_or(true, Value::is_string)
}

/// Whitelist a bookmark's fields. The favicon survives only as an image data URL; an
/// empty id is replaced with a fresh one.
pub fn sanitize_bookmark(bookmark: &Value) -> Bookmark {
    let field = |key: &str| {
        bookmark
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let favicon = bookmark
        .get("favicon")
        .and_then(Value::as_str)
        .filter(|favicon| favicon.starts_with(FAVICON_PREFIX))
        .map(str::to_string);

    let id = field("id");
    Bookmark {
        id: if id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id
        },
        title: field("title"),
        url: field("url"),
        favicon,
    }
}

/// JavaScript-style truthiness
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
