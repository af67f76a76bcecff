// src/ranking/http.rs
//! HTTP ranking engine provider.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::wire::{RankRequest, RankResponse};
use super::RankingEngine;
use crate::error::RankingError;

/// Calls `POST {base_url}/rank` with a JSON body. One attempt, no retries.
pub struct HttpRankingEngine {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRankingEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RankingError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("nearby-events/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .timeout(timeout)
            .build()
            .map_err(|e| RankingError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/rank", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, req: &RankRequest) -> Result<RankResponse, RankingError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RankingError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    RankingError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RankingError::Status(status.as_u16()));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| RankingError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| RankingError::Malformed(e.to_string()))
    }
}

impl RankingEngine for HttpRankingEngine {
    fn fetch<'a>(
        &'a self,
        req: &'a RankRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RankResponse, RankingError>> + Send + 'a>> {
        Box::pin(self.post(req))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
