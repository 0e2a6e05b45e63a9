//! GraphQL client for the Xray Cloud API.

pub mod retry;
pub mod token;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{ApiError, AuthError, CountError};

pub use retry::RetryPolicy;
pub use token::{TokenCache, DEFAULT_TOKEN_TTL};

/// Xray Cloud API v2 base URL.
pub const XRAY_BASE_URL: &str = "https://xray.cloud.getxray.app/api/v2";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Anything that can answer a `getTests` query with its `total`.
#[async_trait]
pub trait TestCountApi: Send + Sync {
    /// Run a built query and return the matching test count.
    async fn count_tests(&self, query: &str) -> Result<u64, CountError>;
}

/// Authentication and GraphQL endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub graphql_url: String,
}

impl Endpoints {
    /// Derive both endpoints from an API base URL.
    #[must_use]
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{base}/authenticate"),
            graphql_url: format!("{base}/graphql"),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::from_base(XRAY_BASE_URL)
    }
}

/// Xray API key pair. `Debug` only shows the last characters.
#[derive(Clone, Serialize)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

/// Keep only the last five characters of a secret.
#[must_use]
pub fn redact(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(5)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}

/// Transport settings for [`XrayClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoints: Endpoints,
    pub timeout: Duration,
    /// Proxy URL applied to every request, e.g. `http://10.254.0.12:8080`.
    pub proxy: Option<String>,
    pub retry: RetryPolicy,
    pub token_ttl: Duration,
    /// Log raw response bodies at debug level.
    pub log_responses: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            retry: RetryPolicy::default(),
            token_ttl: DEFAULT_TOKEN_TTL,
            log_responses: false,
        }
    }
}

/// GraphQL request body.
#[derive(Debug, Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error.
#[derive(Debug, Deserialize)]
struct GraphQLError {
    #[serde(default)]
    message: String,
}

/// Xray Cloud client with a shared token cache and retry loop.
#[derive(Debug)]
pub struct XrayClient {
    http: reqwest::Client,
    credentials: Credentials,
    endpoints: Endpoints,
    retry: RetryPolicy,
    tokens: TokenCache,
    log_responses: bool,
}

impl XrayClient {
    /// Build a client. No request is sent until the first token is needed.
    ///
    /// # Errors
    /// Returns error if the proxy URL is invalid or the HTTP client cannot be built
    pub fn new(credentials: Credentials, options: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout);

        if let Some(proxy) = &options.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy URL: {proxy}"))?,
            );
        }

        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            credentials,
            endpoints: options.endpoints,
            retry: options.retry,
            tokens: TokenCache::new(options.token_ttl),
            log_responses: options.log_responses,
        })
    }

    /// Return the cached bearer token, exchanging credentials if needed.
    pub async fn authenticate(&self) -> Result<Arc<str>, AuthError> {
        self.tokens.get(|| self.exchange_credentials()).await
    }

    /// Client-credentials exchange with retry on transient failures.
    async fn exchange_credentials(&self) -> Result<String, AuthError> {
        info!("Authenticating with Xray Cloud API");
        let mut attempt = 0;
        loop {
            match self.request_token().await {
                Ok(token) => {
                    info!("Xray Cloud API authentication successful");
                    return Ok(token);
                }
                Err(e) => {
                    let Some(delay) = self.retry.backoff(attempt, &e) else {
                        return Err(AuthError(e.to_string()));
                    };
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Authentication request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn request_token(&self) -> Result<String, ApiError> {
        let response = self
            .http
            .post(&self.endpoints.auth_url)
            .json(&self.credentials)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        parse_token(&body)
    }

    async fn post_query(&self, token: &str, query: &str) -> Result<u64, ApiError> {
        debug!(query, "Sending GraphQL query");

        let response = self
            .http
            .post(&self.endpoints.graphql_url)
            .bearer_auth(token)
            .json(&GraphQLRequest { query })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if self.log_responses {
            debug!(status = status.as_u16(), body = %body, "Xray API response");
        }

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        parse_total(&body)
    }
}

#[async_trait]
impl TestCountApi for XrayClient {
    #[instrument(skip(self, query))]
    async fn count_tests(&self, query: &str) -> Result<u64, CountError> {
        let mut token = self.authenticate().await?;
        let mut attempt = 0;
        let mut reauthenticated = false;

        loop {
            match self.post_query(&token, query).await {
                Ok(total) => return Ok(total),
                Err(e) if e.is_unauthorized() && !reauthenticated => {
                    warn!("Bearer token rejected, re-authenticating");
                    token = self
                        .tokens
                        .refresh(&token, || self.exchange_credentials())
                        .await?;
                    reauthenticated = true;
                }
                Err(e) => {
                    let Some(delay) = self.retry.backoff(attempt, &e) else {
                        return Err(e.into());
                    };
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Xray API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// The authenticate endpoint returns the token as a JSON string.
fn parse_token(body: &str) -> Result<String, ApiError> {
    let body = body.trim();
    let token = serde_json::from_str::<String>(body)
        .unwrap_or_else(|_| body.trim_matches('"').to_string());

    if token.is_empty() {
        return Err(ApiError::Decode("empty token in authentication response".to_string()));
    }
    Ok(token)
}

/// Extract `data.getTests.total` from a GraphQL response body.
fn parse_total(body: &str) -> Result<u64, ApiError> {
    let response: GraphQLResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
        return Err(ApiError::GraphQl(messages.join(", ")));
    }

    let total = response
        .data
        .as_ref()
        .and_then(|data| data.pointer("/getTests/total"))
        .filter(|total| !total.is_null())
        .ok_or(ApiError::MissingTotal)?;

    total
        .as_u64()
        .ok_or_else(|| ApiError::InvalidTotal(total.to_string()))
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = XrayClient::new(Credentials::new("id", "secret"), ClientOptions::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_with_proxy() {
        let options = ClientOptions {
            proxy: Some("http://10.254.0.12:8080".to_string()),
            ..ClientOptions::default()
        };
        assert!(XrayClient::new(Credentials::new("id", "secret"), options).is_ok());
    }

    #[test]
    fn test_endpoints_from_base() {
        let endpoints = Endpoints::from_base("http://localhost:9000/api/v2/");
        assert_eq!(endpoints.auth_url, "http://localhost:9000/api/v2/authenticate");
        assert_eq!(endpoints.graphql_url, "http://localhost:9000/api/v2/graphql");
        assert_eq!(
            Endpoints::default().graphql_url,
            "https://xray.cloud.getxray.app/api/v2/graphql"
        );
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("ABCDEFGHIJ12345", "supersecretvalue");
        let debug = format!("{creds:?}");
        assert!(debug.contains("...12345"));
        assert!(debug.contains("...value"));
        assert!(!debug.contains("supersecret"));
    }

    #[test]
    fn test_credentials_serialize_as_auth_payload() {
        let json = serde_json::to_value(Credentials::new("id", "secret")).unwrap();
        assert_eq!(json, serde_json::json!({"client_id": "id", "client_secret": "secret"}));
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("\"abc.def\"").unwrap(), "abc.def");
        assert_eq!(parse_token("abc.def\n").unwrap(), "abc.def");
        assert!(parse_token("\"\"").is_err());
    }

    #[test]
    fn test_parse_total() {
        assert_eq!(parse_total(r#"{"data":{"getTests":{"total":42}}}"#).unwrap(), 42);
        assert_eq!(parse_total(r#"{"data":{"getTests":{"total":0}},"errors":[]}"#).unwrap(), 0);
    }

    #[test]
    fn test_parse_total_graphql_errors() {
        let body = r#"{"errors":[{"message":"Project not found"},{"message":"bad jql"}],"data":null}"#;
        match parse_total(body) {
            Err(ApiError::GraphQl(msg)) => assert_eq!(msg, "Project not found, bad jql"),
            other => panic!("expected GraphQL error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_total_missing_or_invalid() {
        assert!(matches!(parse_total(r#"{"data":{}}"#), Err(ApiError::MissingTotal)));
        assert!(matches!(
            parse_total(r#"{"data":{"getTests":{"total":null}}}"#),
            Err(ApiError::MissingTotal)
        ));
        assert!(matches!(
            parse_total(r#"{"data":{"getTests":{"total":"12"}}}"#),
            Err(ApiError::InvalidTotal(_))
        ));
        assert!(matches!(
            parse_total(r#"{"data":{"getTests":{"total":-1}}}"#),
            Err(ApiError::InvalidTotal(_))
        ));
        assert!(matches!(parse_total("<html>"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short"), "short");
        let long = "é".repeat(400);
        let truncated = truncate(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
    }

    #[test]
    fn test_redact_short_secret() {
        assert_eq!(redact("abc"), "...abc");
    }
}
