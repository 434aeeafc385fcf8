use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::errors::{TabdashError, TabdashResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
        }
    }
}

/// Which cookies to read, mirroring the browser cookie API's `domain` and `url` filters
#[derive(Debug, Clone)]
pub enum CookieQuery {
    /// Cookies set for this domain or any of its subdomains
    Domain(String),
    /// Cookies the browser would send to this URL
    Url(String),
}

impl CookieQuery {
    pub fn matches(&self, cookie: &Cookie) -> bool {
        let cookie_domain = normalize_domain(&cookie.domain);
        match self {
            CookieQuery::Domain(domain) => {
                is_same_or_subdomain(&cookie_domain, &normalize_domain(domain))
            }
            CookieQuery::Url(url) => match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
                Some(host) => is_same_or_subdomain(&normalize_domain(&host), &cookie_domain),
                None => false,
            },
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CookieQuery::Domain(domain) => domain,
            CookieQuery::Url(url) => url,
        }
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// True when `child` equals `parent` or sits beneath it ("a.b.com" under "b.com")
fn is_same_or_subdomain(child: &str, parent: &str) -> bool {
    !parent.is_empty()
        && (child == parent
            || child
                .strip_suffix(parent)
                .is_some_and(|prefix| prefix.ends_with('.')))
}

/// Join cookies into a `Cookie` request header value
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Shorten a credential for log lines: keeps a 4-character prefix of long values only
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}

/// Read access to the browser's cookie jar
#[async_trait]
pub trait CookieJar: Send + Sync {
    async fn get_all(&self, query: &CookieQuery) -> TabdashResult<Vec<Cookie>>;
}

/// Cookie jar backed by a JSON export (`[{name, value, domain}]`), re-read on every query
/// so a browser-side exporter can refresh it at any time.
pub struct JsonCookieJar {
    path: PathBuf,
}

impl JsonCookieJar {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CookieJar for JsonCookieJar {
    async fn get_all(&self, query: &CookieQuery) -> TabdashResult<Vec<Cookie>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cookie jar {:?} does not exist yet", self.path);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(TabdashError::Storage {
                    operation: format!("read cookie jar {:?}", self.path),
                    message: e.to_string(),
                })
            }
        };

        let cookies: Vec<Cookie> = serde_json::from_str(&content)?;
        Ok(cookies.into_iter().filter(|c| query.matches(c)).collect())
    }
}

/// In-memory jar for tests and embedders that push cookies in directly
#[derive(Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<Vec<Cookie>>,
}

impl MemoryCookieJar {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self {
            cookies: RwLock::new(cookies),
        }
    }

    pub fn replace(&self, cookies: Vec<Cookie>) {
        *self.cookies.write() = cookies;
    }
}

#[async_trait]
impl CookieJar for MemoryCookieJar {
    async fn get_all(&self, query: &CookieQuery) -> TabdashResult<Vec<Cookie>> {
        Ok(self
            .cookies
            .read()
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar() -> MemoryCookieJar {
        MemoryCookieJar::new(vec![
            Cookie::new("session", "abc", ".yes.vg"),
            Cookie::new("pref", "dark", "co.yes.vg"),
            Cookie::new("evil", "x", "notyes.vg"),
            Cookie::new("token", "t0k", "codex.packycode.com"),
            Cookie::new("shared", "s", ".packycode.com"),
        ])
    }

    #[tokio::test]
    async fn test_domain_query_includes_subdomains_only() {
        let cookies = jar()
            .get_all(&CookieQuery::Domain("yes.vg".to_string()))
            .await
            .unwrap();
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["session", "pref"]);
    }

    #[tokio::test]
    async fn test_url_query_includes_parent_domain_cookies() {
        let cookies = jar()
            .get_all(&CookieQuery::Url("https://codex.packycode.com/".to_string()))
            .await
            .unwrap();
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["token", "shared"]);
    }

    #[tokio::test]
    async fn test_unparseable_url_matches_nothing() {
        let cookies = jar()
            .get_all(&CookieQuery::Url("not a url".to_string()))
            .await
            .unwrap();
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_cookie_header_format() {
        let header = cookie_header(&[Cookie::new("a", "1", "x"), Cookie::new("b", "2", "x")]);
        assert_eq!(header, "a=1; b=2");
        assert_eq!(cookie_header(&[]), "");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "****");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("sk-1234567890"), "sk-1****");
    }

    #[tokio::test]
    async fn test_json_jar_reads_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let jar = JsonCookieJar::new(path.clone());
        let query = CookieQuery::Domain("cursor.com".to_string());
        assert!(jar.get_all(&query).await.unwrap().is_empty());

        std::fs::write(
            &path,
            r#"[{"name":"WorkosCursorSessionToken","value":"v","domain":"cursor.com"},
                {"name":"other","value":"o","domain":"example.com"}]"#,
        )
        .unwrap();
        let cookies = jar.get_all(&query).await.unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "WorkosCursorSessionToken");

        std::fs::write(&path, "not json").unwrap();
        assert!(jar.get_all(&query).await.is_err());
    }
}
