use thiserror::Error;

/// Structured error types for the tabdash daemon
#[derive(Error, Debug, Clone)]
pub enum TabdashError {
    /// Daemon settings errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Key-value storage errors
    #[error("Storage error: {operation} failed: {message}")]
    Storage { operation: String, message: String },

    /// Imported or submitted data failed structural validation
    #[error("{message}")]
    Validation { message: String },

    /// A credential was empty, so no request was attempted
    #[error("{service} 凭证不能为空")]
    MissingCredential { service: String },

    /// The cookie jar had nothing for a service's domain
    #[error("请先在浏览器中登录 {domain}")]
    NotLoggedIn { domain: String },

    /// Upstream answered with a non-2xx status
    #[error("请求失败: {status} {status_text}")]
    Http {
        service: String,
        status: u16,
        status_text: String,
    },

    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Parsing errors (JSON, TOML, etc.)
    #[error("Parsing error: Failed to parse {format}: {message}")]
    Parsing { format: String, message: String },

    /// Socket protocol errors between the daemon and UI contexts
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Internal errors that shouldn't happen
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TabdashError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the upstream responded at all
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias using TabdashError
pub type TabdashResult<T> = std::result::Result<T, TabdashError>;

/// Convert anyhow::Error to TabdashError
impl From<anyhow::Error> for TabdashError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal {
            message: error.to_string(),
        }
    }
}

/// Convert std::io::Error to TabdashError
impl From<std::io::Error> for TabdashError {
    fn from(error: std::io::Error) -> Self {
        Self::Transport {
            message: error.to_string(),
        }
    }
}

/// Convert rusqlite::Error to TabdashError
impl From<rusqlite::Error> for TabdashError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage {
            operation: "sql_operation".to_string(),
            message: error.to_string(),
        }
    }
}

/// Convert serde_json::Error to TabdashError
impl From<serde_json::Error> for TabdashError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parsing {
            format: "JSON".to_string(),
            message: error.to_string(),
        }
    }
}

/// Convert toml::de::Error to TabdashError
impl From<toml::de::Error> for TabdashError {
    fn from(error: toml::de::Error) -> Self {
        Self::Parsing {
            format: "TOML".to_string(),
            message: error.to_string(),
        }
    }
}

/// Convert reqwest::Error to TabdashError
impl From<reqwest::Error> for TabdashError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Parsing {
                format: "JSON".to_string(),
                message: error.to_string(),
            }
        } else if error.is_connect() {
            Self::Network {
                message: format!("Connection failed: {}", error),
            }
        } else {
            Self::Network {
                message: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display_matches_dashboard_wording() {
        let err = TabdashError::Http {
            service: "YesCode".to_string(),
            status: 502,
            status_text: "Bad Gateway".to_string(),
        };
        assert_eq!(err.to_string(), "请求失败: 502 Bad Gateway");
        assert_eq!(err.http_status(), Some(502));
    }

    #[test]
    fn test_non_http_errors_have_no_status() {
        let err = TabdashError::NotLoggedIn {
            domain: "cursor.com".to_string(),
        };
        assert_eq!(err.http_status(), None);
        assert_eq!(err.to_string(), "请先在浏览器中登录 cursor.com");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: TabdashError = parse_err.into();
        assert!(matches!(err, TabdashError::Parsing { ref format, .. } if format == "JSON"));
    }
}
