//! HTTP client for the hosted pipeline backend
//!
//! Talks to a PostgREST-style table API (`/rest/v1/{table}`) and to the
//! edge function that starts prototype generation (`/functions/v1/{name}`).

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::generation::{GenerationBackend, GenerationRequest, GenerationTicket, StatusReport};
use crate::types::{Idea, IdeaStatus, Prd, Prototype, UserProfile};

/// Rows requested per page when listing a table
const PAGE_SIZE: usize = 1000;

/// Table holding user accounts
const USERS_TABLE: &str = "profiles";

/// Page order; `id` breaks `created_at` ties so offsets stay stable
const PAGE_ORDER: &str = "created_at.asc,id.asc";

/// HTTP client for the hosted backend
pub struct BackendClient {
    config: BackendConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: BackendConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("backend.url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let anon_key = config
            .anon_key
            .clone()
            .ok_or_else(|| Error::Config("backend.anon_key is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&anon_key)
                .map_err(|e| Error::Config(format!("invalid anon_key: {}", e)))?,
        );

        // Signed-in session if we have one, otherwise act as the anon role
        let bearer = config.access_token().unwrap_or(anon_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|e| Error::Config(format!("invalid access token: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    // ============================================
    // Table reads
    // ============================================

    pub async fn fetch_ideas(&self) -> Result<Vec<Idea>> {
        self.fetch_table("ideas").await
    }

    pub async fn fetch_prds(&self) -> Result<Vec<Prd>> {
        self.fetch_table("prds").await
    }

    pub async fn fetch_prototypes(&self) -> Result<Vec<Prototype>> {
        self.fetch_table("prototypes").await
    }

    pub async fn fetch_users(&self) -> Result<Vec<UserProfile>> {
        self.fetch_table(USERS_TABLE).await
    }

    /// Fetch every row of `table`, one page at a time.
    async fn fetch_table<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let url = self.table_url(table);
        let mut rows = Vec::new();

        loop {
            let offset = rows.len();
            let response = self
                .send_with_retry(|| self.page_request(&url, offset))
                .await?;
            let page: Vec<T> = parse_json(response).await?;
            let fetched = page.len();
            rows.extend(page);

            tracing::debug!(table, offset, fetched, "Fetched page");
            if fetched < PAGE_SIZE {
                break;
            }
        }

        Ok(rows)
    }

    fn page_request(&self, url: &str, offset: usize) -> RequestBuilder {
        self.http_client.get(url).query(&[
            ("select", "*".to_string()),
            ("order", PAGE_ORDER.to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
        ])
    }

    /// Fetch one PRD by id
    pub async fn fetch_prd(&self, prd_id: &str) -> Result<Prd> {
        let url = self.table_url("prds");
        let filter = format!("eq.{}", prd_id);
        let response = self
            .send_with_retry(|| {
                self.http_client
                    .get(&url)
                    .query(&[("select", "*"), ("id", filter.as_str())])
            })
            .await?;

        let rows: Vec<Prd> = parse_json(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("PRD {}", prd_id)))
    }

    // ============================================
    // Generation
    // ============================================

    /// Start prototype generation. Not retried: the endpoint is not idempotent.
    pub async fn invoke_generation(&self, request: &GenerationRequest) -> Result<GenerationTicket> {
        let url = format!(
            "{}/functions/v1/{}",
            self.base_url,
            urlencoding::encode(&self.config.generation_function)
        );

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        parse_json(check_status(response).await?).await
    }

    /// Read the current status of a prototype. A single attempt; the poll
    /// loop decides what to do with transient failures.
    pub async fn fetch_prototype_status(&self, prototype_id: &str) -> Result<StatusReport> {
        let response = self
            .http_client
            .get(self.table_url("prototypes"))
            .query(&[
                ("select", "status,url,error_code".to_string()),
                ("id", format!("eq.{}", prototype_id)),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let rows: Vec<StatusReport> = parse_json(check_status(response).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("prototype {}", prototype_id)))
    }

    /// Move an idea to `prototype_complete`
    pub async fn mark_prototype_complete(&self, idea_id: &str) -> Result<()> {
        let url = self.table_url("ideas");
        let filter = format!("eq.{}", idea_id);
        let body = IdeaStatusPatch {
            status: IdeaStatus::PrototypeComplete,
            status_updated_at: Utc::now().to_rfc3339(),
        };

        self.send_with_retry(|| {
            self.http_client
                .patch(&url)
                .query(&[("id", filter.as_str())])
                .header("Prefer", "return=minimal")
                .json(&body)
        })
        .await?;
        Ok(())
    }

    /// Check if the backend answers with our credentials
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/rest/v1/", self.base_url);

        match self.http_client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Send an idempotent request with retry logic
    ///
    /// Retries transient failures (5xx, transport errors) with exponential backoff.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    attempt = attempt + 1,
                    max = self.config.max_retries + 1,
                    ?delay,
                    "Retrying backend request"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(transport_error(e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "Transient backend error");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Http("max retries exceeded".to_string())))
    }
}

impl GenerationBackend for BackendClient {
    async fn load_source(&self, prd_id: &str) -> Result<String> {
        let prd = self.fetch_prd(prd_id).await?;
        if prd.content.trim().is_empty() {
            return Err(Error::Validation(format!("PRD {} has no content", prd_id)));
        }
        Ok(prd.content)
    }

    async fn start_generation(&self, request: &GenerationRequest) -> Result<GenerationTicket> {
        self.invoke_generation(request).await
    }

    async fn fetch_status(&self, prototype_id: &str) -> Result<StatusReport> {
        self.fetch_prototype_status(prototype_id).await
    }

    async fn mark_prototype_complete(&self, idea_id: &str) -> Result<()> {
        BackendClient::mark_prototype_complete(self, idea_id).await
    }
}

/// Request body for PATCH /rest/v1/ideas
#[derive(Serialize)]
struct IdeaStatusPatch {
    status: IdeaStatus,
    status_updated_at: String,
}

/// Error body returned by the table API and edge functions
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default, alias = "error", alias = "msg")]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Http(format!("HTTP request failed: {}", e))
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Err(api_error(status, &body))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    response.json().await.map_err(|e| Error::Api {
        status: None,
        code: None,
        message: format!("failed to parse response: {}", e),
    })
}

/// Map a non-success response to the error taxonomy.
fn api_error(status: StatusCode, body: &str) -> Error {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        _ => Error::Api {
            status: Some(status.as_u16()),
            code: parsed.code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_config() -> BackendConfig {
        BackendConfig {
            url: Some("https://pipeline.example.com/".to_string()),
            anon_key: Some("anon-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_valid_config() {
        assert!(BackendClient::new(BackendConfig::default()).is_err());
    }

    #[test]
    fn test_client_with_valid_config() {
        let client = BackendClient::new(ready_config()).unwrap();
        assert_eq!(client.base_url(), "https://pipeline.example.com");
        assert_eq!(
            client.table_url("ideas"),
            "https://pipeline.example.com/rest/v1/ideas"
        );
    }

    #[test]
    fn test_pages_have_a_total_order() {
        let client = BackendClient::new(ready_config()).unwrap();
        let url = client.table_url("ideas");
        let request = client.page_request(&url, 2000).build().unwrap();
        let query: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(query.contains(&("order".to_string(), "created_at.asc,id.asc".to_string())));
        assert!(query.contains(&("limit".to_string(), "1000".to_string())));
        assert!(query.contains(&("offset".to_string(), "2000".to_string())));
    }

    #[test]
    fn test_auth_statuses_are_not_transient() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = api_error(status, r#"{"message":"JWT expired","code":"PGRST301"}"#);
            assert!(matches!(err, Error::Auth(ref m) if m == "JWT expired"));
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_api_error_body_is_parsed() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"message":"PRD content is required","code":"invalid_input"}"#,
        );
        match err {
            Error::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, Some(400));
                assert_eq!(code.as_deref(), Some("invalid_input"));
                assert_eq!(message, "PRD content is required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = api_error(StatusCode::BAD_GATEWAY, "");
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "API error (502): Bad Gateway");

        let err = api_error(StatusCode::CONFLICT, "duplicate key");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "API error (409): duplicate key");
    }

    #[test]
    fn test_status_report_accepts_table_columns() {
        let rows: Vec<StatusReport> = serde_json::from_str(
            r#"[{"status":"failed","url":null,"error_code":"quota_exceeded"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].code.as_deref(), Some("quota_exceeded"));

        let ticket: GenerationTicket =
            serde_json::from_str(r#"{"prototypeId":"x","status":"generating"}"#).unwrap();
        assert_eq!(ticket.prototype_id, "x");
    }
}
