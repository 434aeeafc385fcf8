use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::warn;

const FAVICON_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FAVICON_BYTES: usize = 100 * 1024;

/// Validates that a string is an http(s) URL
pub fn is_valid_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Fetch a site's favicon and return it as a base64 data URL.
///
/// Favicons are cosmetic, so every failure is logged and answered with an empty string.
pub async fn fetch_favicon_as_data_url(client: &Client, service_url: &str, site_url: &str) -> String {
    let Some(domain) = Url::parse(site_url)
        .ok()
        .filter(|_| is_valid_url(site_url))
        .and_then(|url| url.host_str().map(str::to_string))
    else {
        warn!("Invalid URL for favicon fetch: {}", site_url);
        return String::new();
    };

    let favicon_url = format!(
        "{}?domain={}&sz=32",
        service_url,
        urlencoding::encode(&domain)
    );

    let response = match client.get(&favicon_url).timeout(FAVICON_TIMEOUT).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            warn!("Favicon fetch timed out for: {}", site_url);
            return String::new();
        }
        Err(e) => {
            warn!("Error fetching favicon for {}: {}", domain, e);
            return String::new();
        }
    };

    if !response.status().is_success() {
        warn!("Failed to fetch favicon for {}: {}", domain, response.status());
        return String::new();
    }

    let mime = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or_else(|| "image/png".to_string());

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Error reading favicon body for {}: {}", domain, e);
            return String::new();
        }
    };

    if bytes.len() > MAX_FAVICON_BYTES {
        warn!("Favicon too large for {}: {}", domain, bytes.len());
        return String::new();
    }

    format!("data:{};base64,{}", mime, STANDARD.encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_url_validation() {
        assert!(is_valid_url("https://example.com/path"));
        assert!(is_valid_url("http://localhost:8080"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("example.com"));
    }

    #[tokio::test]
    async fn test_favicon_becomes_data_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/s2/favicons")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("domain".into(), "docs.rs".into()),
                Matcher::UrlEncoded("sz".into(), "32".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "image/x-icon")
            .with_body([0u8, 1, 2, 3])
            .create_async()
            .await;

        let service = format!("{}/s2/favicons", server.url());
        let data_url =
            fetch_favicon_as_data_url(&Client::new(), &service, "https://docs.rs/tokio").await;
        assert_eq!(data_url, "data:image/x-icon;base64,AAECAw==");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_oversized_or_failed_favicon_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(vec![0u8; MAX_FAVICON_BYTES + 1])
            .create_async()
            .await;
        server
            .mock("GET", "/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = Client::new();
        let big = format!("{}/big", server.url());
        let missing = format!("{}/missing", server.url());
        assert_eq!(fetch_favicon_as_data_url(&client, &big, "https://a.example").await, "");
        assert_eq!(fetch_favicon_as_data_url(&client, &missing, "https://a.example").await, "");
        assert_eq!(fetch_favicon_as_data_url(&client, &big, "not a url").await, "");
    }
}
