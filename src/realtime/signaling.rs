//! SDP offer/answer exchange with the realtime endpoint.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use super::session::SessionToken;
use crate::backend::http::{build_client, with_bearer};
use crate::config::ClientConfig;
use crate::error::RealtimeError;

const SDP_CONTENT_TYPE: &str = "application/sdp";

#[derive(Debug, Clone)]
pub struct SdpSignaling {
    client: reqwest::Client,
    endpoint: String,
}

impl SdpSignaling {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, RealtimeError> {
        Ok(Self::new(
            build_client(config.request_timeout)?,
            config.realtime_url.clone(),
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post the local offer and return the remote answer SDP.
    pub async fn exchange(
        &self,
        offer: &str,
        token: &SessionToken,
        model: &str,
    ) -> Result<String, RealtimeError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(SDP_CONTENT_TYPE));
        let headers = with_bearer(headers, token.expose())?;

        debug!(model, endpoint = %self.endpoint, offer_len = offer.len(), "Sending SDP offer");
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("model", model)])
            .headers(headers)
            .body(offer.to_string())
            .send()
            .await
            .map_err(|error| RealtimeError::signaling(None, error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| RealtimeError::signaling(Some(status.as_u16()), error.to_string()))?;

        if !status.is_success() {
            return Err(RealtimeError::signaling(Some(status.as_u16()), body));
        }
        debug!(answer_len = body.len(), "Received SDP answer");
        Ok(body)
    }
}
