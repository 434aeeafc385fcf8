//! Thin HTTP clients for the usage dashboards. One best-effort request per call:
//! no retries, no timeouts, no caching. Successful bodies are passed on as parsed
//! JSON without normalization; only PackyCodex is typed, for its projection.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{TabdashError, TabdashResult};
use crate::settings::EndpointSettings;
use crate::types::PackyCodexUserInfo;

pub const YESCODE: &str = "YesCode";
pub const CURSOR: &str = "Cursor";
pub const MINIMAX: &str = "MiniMax";
pub const PACKYCODEX: &str = "PackyCodex";

#[derive(Clone)]
pub struct RemoteFetcher {
    client: Client,
    endpoints: EndpointSettings,
}

impl RemoteFetcher {
    pub fn new(client: Client, endpoints: EndpointSettings) -> Self {
        Self { client, endpoints }
    }

    /// YesCode balance, authenticated with the yes.vg cookie header
    pub async fn fetch_yescode_balance(&self, cookie: &str) -> TabdashResult<Value> {
        require_credential(YESCODE, cookie)?;
        let request = self
            .client
            .get(&self.endpoints.yescode_balance)
            .header(COOKIE, cookie);
        send_json(YESCODE, request).await
    }

    /// Cursor monthly usage, authenticated with the cursor.com cookie header
    pub async fn fetch_cursor_usage(&self, cookie: &str) -> TabdashResult<Value> {
        require_credential(CURSOR, cookie)?;
        let request = self
            .client
            .get(&self.endpoints.cursor_usage)
            .header(COOKIE, cookie);
        send_json(CURSOR, request).await
    }

    /// MiniMax coding-plan remains, authenticated with a bearer API key
    pub async fn fetch_minimax_remains(&self, api_key: &str) -> TabdashResult<Value> {
        require_credential(MINIMAX, api_key)?;
        let request = self
            .client
            .get(&self.endpoints.minimax_remains)
            .header(AUTHORIZATION, format!("Bearer {}", api_key));
        send_json(MINIMAX, request).await
    }

    /// PackyCodex user info. The bearer token comes from the site's `token` cookie; the
    /// full cookie header rides along for parity with the browser request.
    pub async fn fetch_packycodex_user_info(
        &self,
        token: &str,
        cookie: &str,
    ) -> TabdashResult<PackyCodexUserInfo> {
        require_credential(PACKYCODEX, token)?;
        let mut request = self
            .client
            .get(&self.endpoints.packycodex_user_info)
            .header(AUTHORIZATION, format!("Bearer {}", token));
        if !cookie.is_empty() {
            request = request.header(COOKIE, cookie);
        }
        send_json(PACKYCODEX, request).await
    }
}

fn require_credential(service: &str, credential: &str) -> TabdashResult<()> {
    if credential.trim().is_empty() {
        return Err(TabdashError::MissingCredential {
            service: service.to_string(),
        });
    }
    Ok(())
}

async fn send_json<T>(service: &str, request: RequestBuilder) -> TabdashResult<T>
where
    T: DeserializeOwned,
{
    debug!("Requesting {} usage", service);
    let response = request
        .header(CONTENT_TYPE, "application/json")
        .send()
        .await?;
    let response = ensure_success(service, response)?;
    parse_json_response(service, response).await
}

/// Turn a non-2xx response into an error that keeps the numeric status
pub fn ensure_success(service: &str, response: Response) -> TabdashResult<Response> {
    let status = response.status();
    if !status.is_success() {
        warn!("{} API error: {}", service, status);
        return Err(TabdashError::Http {
            service: service.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        });
    }
    Ok(response)
}

/// Parse JSON response with consistent error handling
async fn parse_json_response<T>(service: &str, response: Response) -> TabdashResult<T>
where
    T: DeserializeOwned,
{
    response.json().await.map_err(|e| TabdashError::Parsing {
        format: format!("{} response", service),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn fetcher_for(server: &mockito::ServerGuard) -> RemoteFetcher {
        let base = server.url();
        RemoteFetcher::new(
            Client::new(),
            EndpointSettings {
                yescode_balance: format!("{}/api/v1/user/balance", base),
                cursor_usage: format!("{}/api/dashboard/get-aggregated-usage-events", base),
                minimax_remains: format!("{}/v1/api/openplatform/coding_plan/remains", base),
                packycodex_user_info: format!("{}/api/backend/users/info", base),
                favicon_service: format!("{}/s2/favicons", base),
            },
        )
    }

    #[tokio::test]
    async fn test_empty_credentials_fail_without_network() {
        let mut server = mockito::Server::new_async().await;
        let untouched = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let fetcher = fetcher_for(&server);

        let err = fetcher.fetch_yescode_balance("").await.unwrap_err();
        assert!(matches!(err, TabdashError::MissingCredential { .. }));
        assert!(fetcher.fetch_cursor_usage("  ").await.is_err());
        assert!(fetcher.fetch_minimax_remains("").await.is_err());
        assert!(fetcher.fetch_packycodex_user_info("", "a=b").await.is_err());

        untouched.assert_async().await;
    }

    #[tokio::test]
    async fn test_yescode_balance_sends_cookie() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/user/balance")
            .match_header("cookie", "session=abc; pref=dark")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"balance":12.5,"subscription_balance":10,"weekly_limit":100,"weekly_spent_balance":20,"total_balance":22.5,"pay_as_you_go_balance":2.5}"#)
            .create_async()
            .await;

        let data = fetcher_for(&server)
            .fetch_yescode_balance("session=abc; pref=dark")
            .await
            .unwrap();
        assert_eq!(data["balance"], serde_json::json!(12.5));
        assert_eq!(data["weekly_limit"], serde_json::json!(100));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cursor_usage_is_returned_verbatim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/dashboard/get-aggregated-usage-events")
            .with_status(200)
            .with_body(r#"{"aggregations":[{"modelIntent":"claude-4-sonnet","inputTokens":"1200"}],"totalInputTokens":"1200","totalCostCents":42}"#)
            .create_async()
            .await;

        let data = fetcher_for(&server).fetch_cursor_usage("c=1").await.unwrap();
        assert_eq!(
            data,
            serde_json::json!({
                "aggregations": [{"modelIntent": "claude-4-sonnet", "inputTokens": "1200"}],
                "totalInputTokens": "1200",
                "totalCostCents": 42
            })
        );
    }

    #[tokio::test]
    async fn test_minimax_uses_bearer_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/api/openplatform/coding_plan/remains")
            .match_header("authorization", "Bearer mm-key")
            .with_status(200)
            .with_body(r#"{"model_remains":[{"model_name":"MiniMax-M2","start_time":1,"end_time":2,"remains_time":3,"current_interval_total_count":100,"current_interval_usage_count":60}]}"#)
            .create_async()
            .await;

        let data = fetcher_for(&server).fetch_minimax_remains("mm-key").await.unwrap();
        assert_eq!(data["model_remains"][0]["model_name"], "MiniMax-M2");
        assert_eq!(data["model_remains"][0]["current_interval_usage_count"], 60);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_partial_bodies_keep_unknown_and_missing_fields() {
        let mut server = mockito::Server::new_async().await;
        let minimax = r#"{"model_remains":[{"model_name":"MiniMax-M2","current_interval_total_count":100}],"base_resp":{"status_code":0,"status_msg":"success"}}"#;
        server
            .mock("GET", "/v1/api/openplatform/coding_plan/remains")
            .with_status(200)
            .with_body(minimax)
            .create_async()
            .await;
        let yescode = r#"{"balance":1,"currency":"USD","weekly_limit":"100"}"#;
        server
            .mock("GET", "/api/v1/user/balance")
            .with_status(200)
            .with_body(yescode)
            .create_async()
            .await;
        let fetcher = fetcher_for(&server);

        let data = fetcher.fetch_minimax_remains("k").await.unwrap();
        assert_eq!(data, serde_json::from_str::<Value>(minimax).unwrap());
        let data = fetcher.fetch_yescode_balance("a=b").await.unwrap();
        assert_eq!(data, serde_json::from_str::<Value>(yescode).unwrap());
    }

    #[tokio::test]
    async fn test_generic_failure_carries_status_line() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/user/balance")
            .with_status(503)
            .create_async()
            .await;

        let err = fetcher_for(&server)
            .fetch_yescode_balance("a=b")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "请求失败: 503 Service Unavailable");
    }

    #[tokio::test]
    async fn test_packycodex_failure_preserves_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/backend/users/info")
            .match_header("authorization", "Bearer t0k")
            .with_status(429)
            .create_async()
            .await;

        let err = fetcher_for(&server)
            .fetch_packycodex_user_info("t0k", "token=t0k")
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(429));
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/api/openplatform/coding_plan/remains")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = fetcher_for(&server)
            .fetch_minimax_remains("k")
            .await
            .unwrap_err();
        assert!(matches!(err, TabdashError::Parsing { .. }));
    }
}
