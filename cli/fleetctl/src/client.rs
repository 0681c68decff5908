//! HTTP client for the hub's control API.

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// API client for communicating with the hub.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    hub: String,
    secret: String,
}

/// Error body shape the hub produces.
#[derive(Debug, Deserialize)]
struct ProblemBody {
    detail: String,
}

impl ApiClient {
    pub fn new(hub: &str, secret: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {secret}"))
                .context("secret is not a valid header value")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            hub: hub.to_string(),
            secret: secret.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.hub)
    }

    /// WebSocket URL for a control endpoint.
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.hub)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        Self::handle(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        Self::handle(response).await
    }

    /// POST where the success response carries no body.
    pub async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn handle<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if response.status().is_success() {
            response.json().await.context("decoding hub response")
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let detail = response
            .json::<ProblemBody>()
            .await
            .map(|p| p.detail)
            .unwrap_or_else(|_| "no detail".to_string());
        match status {
            StatusCode::UNAUTHORIZED => anyhow!("hub rejected the secret: {detail}"),
            _ => anyhow!("hub returned {status}: {detail}"),
        }
    }
}
