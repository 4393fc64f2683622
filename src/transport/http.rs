//! HTTP transport built on reqwest.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

use crate::config::{CandidateConfig, CandidateKind};
use crate::error::{DispatchError, DispatchResult};
use crate::resilience::timeouts::with_timeout;
use crate::transport::{response, Envelope, Transport};

/// Posts envelopes to webhook and direct API candidates.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn post(&self, candidate: &CandidateConfig, envelope: &Envelope) -> DispatchResult<Value> {
        let mut request = self
            .client
            .post(&candidate.url)
            .header(CONTENT_TYPE, "application/json")
            .json(envelope);
        if let Some(token) = candidate.bearer_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let res = request.send().await.map_err(map_reqwest_error)?;
        let status = res.status().as_u16();
        let body = res.text().await.map_err(map_reqwest_error)?;

        tracing::debug!(
            candidate = %candidate.name,
            kind = candidate.kind.as_str(),
            status,
            bytes = body.len(),
            "Candidate responded"
        );
        response::interpret(status, &body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        candidate: &CandidateConfig,
        envelope: &Envelope,
        timeout: Duration,
    ) -> DispatchResult<Value> {
        match candidate.kind {
            CandidateKind::Static => candidate
                .response
                .clone()
                .ok_or_else(|| DispatchError::NoCandidateConfigured(candidate.name.clone())),
            CandidateKind::Webhook | CandidateKind::DirectApi => {
                with_timeout(timeout, self.post(candidate, envelope)).await
            }
        }
    }
}

// Deadlines come from `with_timeout`, so every reqwest error is a request failure.
fn map_reqwest_error(e: reqwest::Error) -> DispatchError {
    DispatchError::Request(e.to_string())
}
