//! HTTP-backed engine gateway
//!
//! Talks to the engine service over its REST surface:
//! - `POST /v1/records` ingests one record (`withInfo` query for enrichment)
//! - `GET  /v1/stats` returns diagnostic counters
//! - `GET  /v1/heartbeat` verifies the engine at startup

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gateway::EngineGateway;
use crate::record::Record;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Engine gateway over HTTP.
pub struct HttpEngineGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    verbose: bool,
}

impl HttpEngineGateway {
    /// Build the client and verify the engine with a heartbeat call.
    ///
    /// Heartbeat failure is a startup error; the consumer must not begin
    /// fetching against an engine that cannot answer.
    pub async fn connect(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;

        let gateway = Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            verbose: config.verbose_logging,
        };

        gateway.heartbeat().await?;
        info!(endpoint = %gateway.endpoint, "Record-matching engine ready");
        Ok(gateway)
    }

    async fn heartbeat(&self) -> Result<(), EngineError> {
        let url = format!("{}/v1/heartbeat", self.endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::Fatal(format!(
                "engine heartbeat returned {}",
                response.status()
            )))
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl EngineGateway for HttpEngineGateway {
    async fn ingest(
        &self,
        record: &Record,
        want_info: bool,
    ) -> Result<Option<String>, EngineError> {
        if self.verbose {
            debug!(record = %record.key, want_info, "Submitting record to engine");
        }

        let url = format!("{}/v1/records", self.endpoint);
        let response = self
            .authorize(self.client.post(&url))
            .query(&[("withInfo", want_info)])
            .header(CONTENT_TYPE, "application/json")
            .body(record.raw.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            if want_info && !body.is_empty() {
                Ok(Some(body))
            } else {
                Ok(None)
            }
        } else {
            Err(classify_status(status, body))
        }
    }

    async fn stats(&self) -> Result<String, EngineError> {
        let url = format!("{}/v1/stats", self.endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status, body))
        }
    }
}

/// Map an engine HTTP status to the error taxonomy.
///
/// Client-side rejections are the record's fault; timeout-flavored statuses
/// mean the engine gave up on this record; everything else is the engine
/// being broken.
fn classify_status(status: StatusCode, body: String) -> EngineError {
    match status.as_u16() {
        400 | 409 | 422 => EngineError::BadInput(body),
        408 | 429 => EngineError::RetryTimeout(body),
        _ => EngineError::Fatal(format!("engine returned {status}: {body}")),
    }
}

fn transport_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::RetryTimeout(err.to_string())
    } else {
        EngineError::Fatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bad_input_statuses() {
        for code in [400u16, 409, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status(status, "rejected".into());
            assert!(err.is_data_error(), "status {code} should be a data error");
            assert!(matches!(err, EngineError::BadInput(_)));
        }
    }

    #[test]
    fn test_classify_retry_timeout_statuses() {
        for code in [408u16, 429] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status(status, "slow down".into());
            assert!(matches!(err, EngineError::RetryTimeout(_)));
            assert!(err.is_data_error());
        }
    }

    #[test]
    fn test_classify_server_errors_are_fatal() {
        for code in [500u16, 502, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status(status, "boom".into());
            assert!(err.is_fatal(), "status {code} should be fatal");
        }
    }
}
