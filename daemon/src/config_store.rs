use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::TabdashResult;
use crate::schema::{self, LegacyValues, APP_CONFIG_KEY};
use crate::storage::SharedStore;
use crate::types::{AppConfig, AppConfigPatch};

/// Sole owner of the persisted AppConfig
#[derive(Clone)]
pub struct ConfigStore {
    store: SharedStore,
    /// Held across read-merge-write so concurrent saves cannot drop each other's sections
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Read the config with every section present. Never fails: any storage or decode
    /// problem is logged and answered with the defaults.
    pub async fn get(&self) -> AppConfig {
        match self.store.get(APP_CONFIG_KEY).await {
            Ok(Some(raw)) => schema::apply_defaults(&raw),
            Ok(None) => self.migrate_or_default().await,
            Err(e) => {
                warn!("Failed to read app config, using defaults: {}", e);
                AppConfig::default()
            }
        }
    }

    /// Shallow-merge `patch` over the current value and write it back in one `set`.
    pub async fn save(&self, patch: AppConfigPatch) -> TabdashResult<AppConfig> {
        let _guard = self.write_lock.lock().await;
        let merged = self.get().await.merged(patch);
        let value = serde_json::to_value(&merged)?;
        self.store.set(APP_CONFIG_KEY, &value).await?;
        debug!(
            "App config saved ({} bookmarks, {} cookie forwarders)",
            merged.bookmarks.items.len(),
            merged.send_cookie.len()
        );
        Ok(merged)
    }

    async fn migrate_or_default(&self) -> AppConfig {
        let legacy = self.read_legacy().await;
        if legacy.is_empty() {
            return AppConfig::default();
        }

        info!("Migrating legacy per-feature config keys to {}", APP_CONFIG_KEY);
        let config = schema::migrate_legacy(&legacy);

        if let Err(e) = self.persist_migration(&config).await {
            warn!("Legacy config migration could not be persisted: {}", e);
        }
        config
    }

    async fn read_legacy(&self) -> LegacyValues {
        let mut legacy = LegacyValues::default();
        for key in schema::LEGACY_KEYS {
            let value = match self.store.get(key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!("Failed to read legacy key {}: {}", key, e);
                    None
                }
            };
            match key {
                schema::LEGACY_YESCODE_KEY => legacy.yes_code = value,
                schema::LEGACY_SEND_COOKIE_KEY => legacy.send_cookie = value,
                _ => legacy.mini_max = value,
            }
        }
        legacy
    }

    async fn persist_migration(&self, config: &AppConfig) -> TabdashResult<()> {
        self.store
            .set(APP_CONFIG_KEY, &serde_json::to_value(config)?)
            .await?;
        for key in schema::LEGACY_KEYS {
            self.store.remove(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TabdashError;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::types::{Bookmark, SendCookieConfigItem, UsageToggle};
    use async_trait::async_trait;
    use crate::storage::StalledStore;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> TabdashResult<Option<Value>> {
            Err(TabdashError::Storage {
                operation: "get".to_string(),
                message: "disk on fire".to_string(),
            })
        }

        async fn set(&self, _key: &str, _value: &Value) -> TabdashResult<()> {
            Err(TabdashError::Storage {
                operation: "set".to_string(),
                message: "disk on fire".to_string(),
            })
        }

        async fn remove(&self, _key: &str) -> TabdashResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_storage_returns_defaults() {
        let store = ConfigStore::new(Arc::new(MemoryStore::new()));
        let config = store.get().await;
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({
                "yesCode": {"showUsage": false},
                "cursorSettings": {"showUsage": false},
                "packyCodex": {"showUsage": false},
                "miniMax": {"apiKey": "", "showUsage": false},
                "bookmarks": {"items": []},
                "sendCookie": []
            })
        );
    }

    #[tokio::test]
    async fn test_save_then_get_is_top_level_merge() {
        let store = ConfigStore::new(Arc::new(MemoryStore::new()));

        let first = AppConfigPatch {
            bookmarks: Some(crate::types::BookmarkSettings {
                items: vec![Bookmark::new("Crates", "https://crates.io")],
            }),
            ..Default::default()
        };
        store.save(first).await.unwrap();
        let previous = store.get().await;

        let second = AppConfigPatch {
            yes_code: Some(UsageToggle { show_usage: true }),
            send_cookie: Some(vec![SendCookieConfigItem::new(
                "example.com",
                "https://collector.example/in",
            )]),
            ..Default::default()
        };
        store.save(second.clone()).await.unwrap();

        let current = store.get().await;
        assert_eq!(current, previous.merged(second));
        assert_eq!(current.bookmarks.items.len(), 1);
        assert!(current.yes_code.show_usage);
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_both_sections() {
        let memory = MemoryStore::with_entries([(
            APP_CONFIG_KEY.to_string(),
            serde_json::to_value(AppConfig::default()).unwrap(),
        )]);
        let store = ConfigStore::new(Arc::new(StalledStore::new(
            memory,
            2,
            Duration::from_millis(50),
        )));

        let toggle = AppConfigPatch {
            yes_code: Some(UsageToggle { show_usage: true }),
            ..Default::default()
        };
        let bookmarks = AppConfigPatch {
            bookmarks: Some(crate::types::BookmarkSettings {
                items: vec![Bookmark::new("Docs", "https://docs.rs")],
            }),
            ..Default::default()
        };
        let (a, b) = tokio::join!(store.save(toggle), store.save(bookmarks));
        a.unwrap();
        b.unwrap();

        let config = store.get().await;
        assert!(config.yes_code.show_usage);
        assert_eq!(config.bookmarks.items.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_stored_shape_is_completed() {
        let memory = MemoryStore::with_entries([(
            APP_CONFIG_KEY.to_string(),
            json!({"yesCode": {"showUsage": true}}),
        )]);
        let store = ConfigStore::new(Arc::new(memory));
        let config = store.get().await;
        assert!(config.yes_code.show_usage);
        assert_eq!(config.mini_max.api_key, "");
    }

    #[tokio::test]
    async fn test_read_error_falls_back_to_defaults() {
        let store = ConfigStore::new(Arc::new(BrokenStore));
        assert_eq!(store.get().await, AppConfig::default());
        assert!(store.save(AppConfigPatch::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_legacy_keys_are_migrated_once() {
        let memory = Arc::new(MemoryStore::with_entries([
            (
                schema::LEGACY_YESCODE_KEY.to_string(),
                json!({"apiKey": "", "showBalance": true, "showCursorUsage": true, "bookmarks": []}),
            ),
            (
                schema::LEGACY_MINIMAX_KEY.to_string(),
                json!({"apiKey": "mm", "showUsage": false}),
            ),
        ]));
        let store = ConfigStore::new(memory.clone());

        let config = store.get().await;
        assert!(config.yes_code.show_usage);
        assert_eq!(config.mini_max.api_key, "mm");
        assert_eq!(memory.keys(), vec![APP_CONFIG_KEY.to_string()]);

        assert_eq!(store.get().await, config);
    }
}
