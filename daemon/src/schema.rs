//! Canonical AppConfig schema: default filling and migration from older stored shapes.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{
    AppConfig, Bookmark, BookmarkSettings, MiniMaxSettings, SendCookieConfigItem, UsageToggle,
};

pub const APP_CONFIG_KEY: &str = "local:appConfig";

/// Keys written by the pre-AppConfig schema, one per feature
pub const LEGACY_YESCODE_KEY: &str = "local:yesCodeConfig";
pub const LEGACY_SEND_COOKIE_KEY: &str = "local:sendCookieConfig";
pub const LEGACY_MINIMAX_KEY: &str = "local:miniMaxConfig";

pub const LEGACY_KEYS: [&str; 3] = [LEGACY_YESCODE_KEY, LEGACY_SEND_COOKIE_KEY, LEGACY_MINIMAX_KEY];

/// Fill every missing or malformed top-level section of a stored value from the defaults.
///
/// Section objects are merged one level deep: a present section keeps its own fields and
/// takes defaults only for the fields it lacks. Anything that is not an object at all
/// yields the full default config.
pub fn apply_defaults(raw: &Value) -> AppConfig {
    let Some(object) = raw.as_object() else {
        if !raw.is_null() {
            warn!("Stored config is not an object, using defaults");
        }
        return AppConfig::default();
    };

    AppConfig {
        yes_code: section_or_default::<UsageToggle>(object.get("yesCode"), "yesCode"),
        cursor_settings: section_or_default::<UsageToggle>(
            object.get("cursorSettings"),
            "cursorSettings",
        ),
        packy_codex: section_or_default::<UsageToggle>(object.get("packyCodex"), "packyCodex"),
        mini_max: section_or_default::<MiniMaxSettings>(object.get("miniMax"), "miniMax"),
        bookmarks: section_or_default::<BookmarkSettings>(object.get("bookmarks"), "bookmarks"),
        send_cookie: section_or_default::<Vec<SendCookieConfigItem>>(
            object.get("sendCookie"),
            "sendCookie",
        ),
    }
}

fn section_or_default<T>(value: Option<&Value>, name: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match value {
        None | Some(Value::Null) => {
            debug!("Config section '{}' missing, filling default", name);
            T::default()
        }
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!("Config section '{}' has an unexpected shape ({}), using default", name, e);
            T::default()
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyYesCodeConfig {
    show_balance: bool,
    show_cursor_usage: bool,
    bookmarks: Vec<Bookmark>,
}

/// Values found under the legacy per-feature keys
#[derive(Debug, Default, Clone)]
pub struct LegacyValues {
    pub yes_code: Option<Value>,
    pub send_cookie: Option<Value>,
    pub mini_max: Option<Value>,
}

impl LegacyValues {
    pub fn is_empty(&self) -> bool {
        self.yes_code.is_none() && self.send_cookie.is_none() && self.mini_max.is_none()
    }
}

/// Build a canonical AppConfig from the legacy per-feature values.
///
/// The legacy top-level `apiKey` has no canonical home and is discarded.
pub fn migrate_legacy(legacy: &LegacyValues) -> AppConfig {
    let mut config = AppConfig::default();

    if let Some(raw) = &legacy.yes_code {
        match serde_json::from_value::<LegacyYesCodeConfig>(raw.clone()) {
            Ok(old) => {
                config.yes_code.show_usage = old.show_balance;
                config.cursor_settings.show_usage = old.show_cursor_usage;
                config.bookmarks.items = old.bookmarks;
            }
            Err(e) => warn!("Skipping unreadable legacy yesCode config: {}", e),
        }
    }

    if let Some(raw) = &legacy.send_cookie {
        config.send_cookie = section_or_default(Some(raw), "sendCookie");
    }

    if let Some(raw) = &legacy.mini_max {
        config.mini_max = section_or_default(Some(raw), "miniMax");
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_yields_full_defaults() {
        assert_eq!(apply_defaults(&Value::Null), AppConfig::default());
        assert_eq!(apply_defaults(&json!("garbage")), AppConfig::default());
    }

    #[test]
    fn test_older_shape_without_new_sections() {
        let stored = json!({
            "yesCode": {"showUsage": true},
            "cursorSettings": {"showUsage": true},
            "bookmarks": {"items": [{"id": "1", "title": "Rust", "url": "https://rust-lang.org"}]}
        });

        let config = apply_defaults(&stored);
        assert!(config.yes_code.show_usage);
        assert!(config.cursor_settings.show_usage);
        assert_eq!(config.bookmarks.items.len(), 1);
        assert_eq!(config.packy_codex, UsageToggle::default());
        assert_eq!(config.mini_max, MiniMaxSettings::default());
        assert!(config.send_cookie.is_empty());
    }

    #[test]
    fn test_section_fields_merged_one_level() {
        let config = apply_defaults(&json!({"miniMax": {"apiKey": "mm-key"}}));
        assert_eq!(config.mini_max.api_key, "mm-key");
        assert!(!config.mini_max.show_usage);
    }

    #[test]
    fn test_malformed_section_falls_back_alone() {
        let config = apply_defaults(&json!({
            "yesCode": {"showUsage": true},
            "sendCookie": "not-a-list"
        }));
        assert!(config.yes_code.show_usage);
        assert!(config.send_cookie.is_empty());
    }

    #[test]
    fn test_migrate_legacy_shapes() {
        let legacy = LegacyValues {
            yes_code: Some(json!({
                "apiKey": "Bearer old",
                "showBalance": true,
                "showCursorUsage": false,
                "bookmarks": [{"id": "b1", "title": "GitHub", "url": "https://github.com"}]
            })),
            send_cookie: Some(json!([{
                "id": "c1",
                "domain": "example.com",
                "apiUrl": "https://collector.example/cookies",
                "interval": 60000,
                "enabled": true
            }])),
            mini_max: Some(json!({"apiKey": "mm", "showUsage": true})),
        };

        let config = migrate_legacy(&legacy);
        assert!(config.yes_code.show_usage);
        assert!(!config.cursor_settings.show_usage);
        assert_eq!(config.bookmarks.items[0].id, "b1");
        assert_eq!(config.send_cookie[0].interval, 60000);
        assert_eq!(config.mini_max.api_key, "mm");
        assert!(!serde_json::to_string(&config).unwrap().contains("Bearer old"));
    }

    #[test]
    fn test_migrate_nothing_is_default() {
        let legacy = LegacyValues::default();
        assert!(legacy.is_empty());
        assert_eq!(migrate_legacy(&legacy), AppConfig::default());
    }
}
