//! HttpLineupOptimizer - the remote lineup and transaction backend.

use async_trait::async_trait;
use mutation_core::domain::UpstreamError;
use mutation_core::ports::{
    LineupOptimizer, LineupReport, LineupRequest, TransactionReport, TransactionRequest,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{transport_error, upstream_error};

pub struct HttpLineupOptimizer {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScarcityRequest<'a> {
    uid: &'a str,
    league_key: &'a str,
}

impl HttpLineupOptimizer {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn send<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, UpstreamError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }
        Ok(response)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let response = self.send(path, body).await?;
        response.json().await.map_err(transport_error)
    }
}

#[async_trait]
impl LineupOptimizer for HttpLineupOptimizer {
    async fn set_lineups(&self, request: &LineupRequest) -> Result<LineupReport, UpstreamError> {
        self.post("/lineups", request).await
    }

    async fn process_transactions(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionReport, UpstreamError> {
        self.post("/transactions", request).await
    }

    async fn recalculate_positional_scarcity(
        &self,
        uid: &str,
        league_key: &str,
    ) -> Result<(), UpstreamError> {
        self.send("/positional-scarcity", &ScarcityRequest { uid, league_key })
            .await?;
        Ok(())
    }
}
