//! Session token fetcher: asks the local backend to mint a realtime credential.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{backend_headers, build_client, trim_trailing_slash};
use crate::config::ClientConfig;
use crate::error::RealtimeError;
use crate::realtime::session::SessionToken;

#[derive(Debug, Deserialize)]
struct SessionTokenResponse {
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionTokenRequest<'a> {
    model: &'a str,
    instructions: &'a str,
}

/// Client for `/{app}/api/session/`.
#[derive(Debug, Clone)]
pub struct TokenFetcher {
    client: reqwest::Client,
    endpoint: String,
    csrf_token: Option<String>,
}

impl TokenFetcher {
    pub fn new(client: reqwest::Client, backend_url: &str, app: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/{app}/api/session/", trim_trailing_slash(backend_url)),
            csrf_token: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, RealtimeError> {
        let fetcher = Self::new(
            build_client(config.request_timeout)?,
            &config.backend_url,
            config.app(),
        );
        Ok(match &config.csrf_token {
            Some(token) => fetcher.with_csrf_token(token.clone()),
            None => fetcher,
        })
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `GET ?model=<id>`.
    pub async fn fetch(&self, model: &str) -> Result<SessionToken, RealtimeError> {
        debug!(model, endpoint = %self.endpoint, "Requesting session token");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("model", model)])
            .send()
            .await?;
        read_token(response).await
    }

    /// `POST {model, instructions}`; the instructions are baked into the session.
    pub async fn fetch_with_instructions(
        &self,
        model: &str,
        instructions: &str,
    ) -> Result<SessionToken, RealtimeError> {
        debug!(
            model,
            instructions_len = instructions.chars().count(),
            endpoint = %self.endpoint,
            "Requesting session token"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .headers(backend_headers(self.csrf_token.as_deref()))
            .json(&SessionTokenRequest {
                model,
                instructions,
            })
            .send()
            .await?;
        read_token(response).await
    }
}

async fn read_token(response: reqwest::Response) -> Result<SessionToken, RealtimeError> {
    let status = response.status();
    let body = response.text().await?;
    debug!(status = status.as_u16(), "Session token response");

    if !status.is_success() {
        return Err(RealtimeError::TokenAcquisition {
            status: status.as_u16(),
            body,
        });
    }

    let value = serde_json::from_str::<SessionTokenResponse>(&body)
        .ok()
        .and_then(|parsed| parsed.client_secret)
        .and_then(|secret| secret.value)
        .filter(|value| !value.is_empty());

    match value {
        Some(value) => Ok(SessionToken::new(value)),
        None => Err(RealtimeError::TokenAcquisition {
            status: status.as_u16(),
            body,
        }),
    }
}
