//! Watchlist backend client
//!
//! All endpoints speak JSON over HTTP:
//! - `POST /api/validate-stocks`     batch validation
//! - `POST /api/validate-stock`      single code validation
//! - `POST /api/cancel-validation`   best-effort cancel notification
//! - `POST /api/import-watchlist`    commit validated stocks
//! - `POST /api/auto-organize-watchlist` long-running reorganisation
//! - `GET  /api/auto-organize-progress`  progress of the above
//! - `GET  /api/get-watchlist-groups`    existing groups with stock counts

use crate::config::ImporterConfig;
use crate::error::{ImportError, Result};
use crate::models::*;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Operations the wizard needs from the backend
#[async_trait]
pub trait WatchlistApi: Send + Sync {
    async fn validate_stocks(
        &self,
        codes: &[String],
        translate: bool,
        market: Option<&str>,
    ) -> Result<ValidateStocksResponse>;

    async fn validate_stock(&self, code: &str, translate: bool) -> Result<ValidationResult>;

    async fn cancel_validation(&self) -> Result<()>;

    async fn import_watchlist(
        &self,
        stocks: &[ValidationResult],
        selection: &GroupSelection,
        clear_existing: bool,
    ) -> Result<ImportWatchlistResponse>;

    async fn auto_organize(&self) -> Result<AutoOrganizeResponse>;

    async fn organize_progress(&self) -> Result<OrganizeProgress>;

    async fn watchlist_groups(&self) -> Result<WatchlistGroupsResponse>;
}

/// reqwest-backed implementation
#[derive(Debug, Clone)]
pub struct HttpWatchlistApi {
    client: reqwest::Client,
    base_url: String,
}

/// HTTP client with JSON headers
fn create_client(config: &ImporterConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("watchlist-import/", env!("CARGO_PKG_VERSION"))),
    );

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

impl HttpWatchlistApi {
    pub fn new(config: &ImporterConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.url(path);
        log::debug!("POST {}", url);
        Ok(self.client.post(&url).json(body).send().await?)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        log::debug!("GET {}", url);
        Ok(self.client.get(&url).send().await?)
    }
}

/// Decode a body only when the status is 2xx; otherwise surface the
/// server's `error` field (or the status reason) as `ImportError::Http`.
async fn expect_success<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        log::error!("Watchlist API error: {} - {}", status, body);
        return Err(http_error(status, &body));
    }

    Ok(serde_json::from_str(&body)?)
}

/// Decode a body whatever the status, as long as it is JSON. The import
/// endpoints report application failures as `{success: false, error}`
/// together with a 4xx/5xx status.
async fn decode_any_status<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    match serde_json::from_str(&body) {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => {
            log::error!("Watchlist API error: {} - {}", status, body);
            Err(http_error(status, &body))
        }
        Err(e) => Err(e.into()),
    }
}

fn http_error(status: reqwest::StatusCode, body: &str) -> ImportError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    ImportError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl WatchlistApi for HttpWatchlistApi {
    async fn validate_stocks(
        &self,
        codes: &[String],
        translate: bool,
        market: Option<&str>,
    ) -> Result<ValidateStocksResponse> {
        let body = ValidateStocksRequest { codes, translate, market };
        let response = self.post("/api/validate-stocks", &body).await?;
        let data: ValidateStocksResponse = expect_success(response).await?;

        if let Some(ref summary) = data.summary {
            log::debug!(
                "Chunk validated: total {}, valid {}, invalid {}",
                summary.total,
                summary.valid,
                summary.invalid
            );
        }
        Ok(data)
    }

    async fn validate_stock(&self, code: &str, translate: bool) -> Result<ValidationResult> {
        let body = ValidateStockRequest { code, translate };
        let response = self.post("/api/validate-stock", &body).await?;
        expect_success(response).await
    }

    async fn cancel_validation(&self) -> Result<()> {
        let response = self.post("/api/cancel-validation", &serde_json::json!({})).await?;
        let _: serde_json::Value = expect_success(response).await?;
        Ok(())
    }

    async fn import_watchlist(
        &self,
        stocks: &[ValidationResult],
        selection: &GroupSelection,
        clear_existing: bool,
    ) -> Result<ImportWatchlistResponse> {
        let body = ImportWatchlistRequest {
            stocks,
            group_name: selection.group_name(),
            auto_categories: selection.is_auto(),
            clear_existing,
        };
        let response = self.post("/api/import-watchlist", &body).await?;
        decode_any_status(response).await
    }

    async fn auto_organize(&self) -> Result<AutoOrganizeResponse> {
        let response = self.post("/api/auto-organize-watchlist", &serde_json::json!({})).await?;
        decode_any_status(response).await
    }

    async fn organize_progress(&self) -> Result<OrganizeProgress> {
        let response = self.get("/api/auto-organize-progress").await?;
        expect_success(response).await
    }

    async fn watchlist_groups(&self) -> Result<WatchlistGroupsResponse> {
        let response = self.get("/api/get-watchlist-groups").await?;
        decode_any_status(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> HttpWatchlistApi {
        let config = ImporterConfig {
            base_url: format!("{}/", server.uri()),
            ..ImporterConfig::default()
        };
        HttpWatchlistApi::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_validate_stocks_sends_codes_and_translate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/validate-stocks"))
            .and(body_json(json!({"codes": ["AAPL", "XX"], "translate": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"code": "AAPL", "valid": true, "name": "Apple Inc.", "price": 190.5, "currency": "USD"},
                    {"code": "XX", "valid": false, "error": "404 not found"}
                ],
                "summary": {"total": 2, "valid": 1, "invalid": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server);
        let codes = vec!["AAPL".to_string(), "XX".to_string()];
        let data = api.validate_stocks(&codes, true, None).await.unwrap();

        assert_eq!(data.results.len(), 2);
        assert!(data.results[0].valid);
        assert_eq!(data.results[1].error.as_deref(), Some("404 not found"));
    }

    #[tokio::test]
    async fn test_validate_stocks_http_error_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/validate-stocks"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "at most 100 codes per request"})),
            )
            .mount(&server)
            .await;

        let api = api_for(&server);
        let err = api.validate_stocks(&["A".to_string()], false, None).await.unwrap_err();
        match err {
            ImportError::Http { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "at most 100 codes per request");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_decodes_failure_body_on_400() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/import-watchlist"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"success": false, "error": "no stocks"})),
            )
            .mount(&server)
            .await;

        let api = api_for(&server);
        let response = api
            .import_watchlist(&[], &GroupSelection::Named("Tech".into()), false)
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("no stocks"));
    }

    #[tokio::test]
    async fn test_non_json_error_page_becomes_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/import-watchlist"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let err = api
            .import_watchlist(&[], &GroupSelection::AutoCategories, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_progress_and_groups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auto-organize-progress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "in_progress": true, "percent": 42.5, "status": "verifying", "completed": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/get-watchlist-groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "groups": {"Tech": 3, "Banks": 2}
            })))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let progress = api.organize_progress().await.unwrap();
        assert!(progress.in_progress);
        assert_eq!(progress.percent, 42.5);

        let groups = api.watchlist_groups().await.unwrap();
        assert_eq!(groups.groups.get("Tech"), Some(&3));
    }
}
