use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{TabdashError, TabdashResult};
use crate::types::{AppConfig, AppConfigPatch};
use crate::validation;

/// Largest import file accepted (1 MiB)
pub const MAX_IMPORT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub contents: String,
}

/// Serialize the config as a date-stamped, pretty-printed JSON download
pub fn export_config(config: &AppConfig, date: NaiveDate) -> TabdashResult<ExportFile> {
    let contents = serde_json::to_string_pretty(config)?;
    Ok(ExportFile {
        filename: format!("tab-config-{}.json", date.format("%Y-%m-%d")),
        contents,
    })
}

/// One section whose value differs between the live config and the imported file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigChange {
    pub section: &'static str,
    pub summary: String,
}

/// Validated import waiting for the user's confirmation
#[derive(Debug, Clone)]
pub struct ImportPreview {
    pub config: AppConfig,
    pub changes: Vec<ConfigChange>,
}

impl ImportPreview {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Accept the import. The patch is merged into live state; persisting it still
    /// takes a normal save.
    pub fn confirm(self) -> AppConfigPatch {
        info!("Import confirmed with {} changed sections", self.changes.len());
        AppConfigPatch::from(self.config)
    }
}

/// Size-check, parse and validate an import file, then diff it against `current`.
pub fn prepare_import(bytes: &[u8], current: &AppConfig) -> TabdashResult<ImportPreview> {
    if bytes.len() > MAX_IMPORT_BYTES {
        return Err(TabdashError::validation("文件过大，最大支持 1MB"));
    }

    let parsed: Value = serde_json::from_slice(bytes)
        .map_err(|_| TabdashError::validation("文件格式错误，请选择有效的 JSON 文件"))?;

    let config = validation::validate(&parsed).into_result()?;
    let changes = diff_configs(current, &config);
    debug!("Import preview ready: {} changed sections", changes.len());

    Ok(ImportPreview { config, changes })
}

fn flag(on: bool) -> &'static str {
    if on {
        "✓"
    } else {
        "✗"
    }
}

fn diff_configs(current: &AppConfig, incoming: &AppConfig) -> Vec<ConfigChange> {
    let mut changes = Vec::new();

    let toggles = [
        ("yesCode", &current.yes_code, &incoming.yes_code),
        ("cursorSettings", &current.cursor_settings, &incoming.cursor_settings),
        ("packyCodex", &current.packy_codex, &incoming.packy_codex),
    ];
    for (section, before, after) in toggles {
        if before != after {
            changes.push(ConfigChange {
                section,
                summary: format!(
                    "showUsage {} -> {}",
                    flag(before.show_usage),
                    flag(after.show_usage)
                ),
            });
        }
    }

    if current.mini_max != incoming.mini_max {
        let key_note = if current.mini_max.api_key == incoming.mini_max.api_key {
            "API Key 不变"
        } else if incoming.mini_max.api_key.is_empty() {
            "API Key 将被清空"
        } else {
            "API Key 将被替换"
        };
        changes.push(ConfigChange {
            section: "miniMax",
            summary: format!(
                "showUsage {} -> {}, {}",
                flag(current.mini_max.show_usage),
                flag(incoming.mini_max.show_usage),
                key_note
            ),
        });
    }

    if current.bookmarks != incoming.bookmarks {
        changes.push(ConfigChange {
            section: "bookmarks",
            summary: format!(
                "书签数量 {} -> {} 个",
                current.bookmarks.items.len(),
                incoming.bookmarks.items.len()
            ),
        });
    }

    if current.send_cookie != incoming.send_cookie {
        let mut summary = format!(
            "Cookie 转发 {} -> {} 项",
            current.send_cookie.len(),
            incoming.send_cookie.len()
        );
        let newly_enabled = newly_enabled_forwarders(current, incoming);
        if !newly_enabled.is_empty() {
            summary.push_str(&format!("，将开始转发: {}", newly_enabled.join(", ")));
        }
        changes.push(ConfigChange {
            section: "sendCookie",
            summary,
        });
    }

    changes
}

/// Enabled incoming forwarders with no identical enabled forwarder already running,
/// as `domain -> apiUrl`
fn newly_enabled_forwarders(current: &AppConfig, incoming: &AppConfig) -> Vec<String> {
    incoming
        .enabled_forwarders()
        .filter(|item| {
            !current
                .enabled_forwarders()
                .any(|running| running.domain == item.domain && running.api_url == item.api_url)
        })
        .map(|item| format!("{} -> {}", item.domain, item.api_url))
        .collect()
}
