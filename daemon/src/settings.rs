use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:47821";

/// Daemon-level settings. These stay on this machine and are never synced to UI contexts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub storage: StorageSettings,
    pub endpoints: EndpointSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Address UI contexts connect to
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite key-value database (defaults to the data dir)
    pub database_path: Option<PathBuf>,
    /// JSON cookie export read by the cookie jar (defaults to the data dir)
    pub cookie_jar_path: Option<PathBuf>,
}

/// Upstream URLs. Fixed in production, overridable so tests can point at a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub yescode_balance: String,
    pub cursor_usage: String,
    pub minimax_remains: String,
    pub packycodex_user_info: String,
    pub favicon_service: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            yescode_balance: "https://co.yes.vg/api/v1/user/balance".to_string(),
            cursor_usage: "https://cursor.com/api/dashboard/get-aggregated-usage-events"
                .to_string(),
            minimax_remains: "https://www.minimaxi.com/v1/api/openplatform/coding_plan/remains"
                .to_string(),
            packycodex_user_info: "https://codex.packycode.com/api/backend/users/info"
                .to_string(),
            favicon_service: "https://www.google.com/s2/favicons".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default location, writing defaults on first run
    pub async fn load() -> Result<Settings> {
        let path = Self::get_settings_path()?;
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Settings> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read settings file: {:?}", path))?;

            toml::from_str(&content).with_context(|| "Failed to parse settings file")
        } else {
            info!("Settings file not found, creating default settings");
            let settings = Settings::default();
            settings.save_to(path).await?;
            Ok(settings)
        }
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure settings directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write settings file: {:?}", path))?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    pub fn get_settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("tabdash");

        Ok(config_dir.join("settings.toml"))
    }

    pub fn get_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
            .context("Failed to resolve a data directory")?
            .join("tabdash");

        Ok(data_dir)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::get_data_dir()?.join("tabdash.db")),
        }
    }

    pub fn cookie_jar_path(&self) -> Result<PathBuf> {
        match &self.storage.cookie_jar_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::get_data_dir()?.join("cookies.json")),
        }
    }
}
