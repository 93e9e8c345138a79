use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bw_acquire::{AcquisitionError, Batch, QueryKind, SignalSource};
use bw_core::{SourceKind, Subsystem};
use reqwest::Url;
use tracing::debug;

use crate::catalog::{decode_samples, metrics_for, queries_for};
use crate::wire::{into_vector, BuildInfoResponse, QueryResponse, Sample};

/// Connection settings for the metrics store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrometheusOptions {
    pub url: String,
    /// Sent as `X-Api-Key`.
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Self-signed deployments are common; certificate checks are off unless
    /// asked for.
    pub accept_invalid_certs: bool,
}

/// Metrics-store acquisition adapter over the Prometheus instant query API.
pub struct PrometheusSource {
    client: reqwest::Client,
    base: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl PrometheusSource {
    pub fn new(opts: &PrometheusOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(opts.timeout)
            .danger_accept_invalid_certs(opts.accept_invalid_certs)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base: opts.url.trim_end_matches('/').to_string(),
            api_key: opts.api_key.clone().filter(|k| !k.is_empty()),
            timeout: opts.timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, AcquisitionError> {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }
        req.send()
            .await
            .map_err(|e| self.transport(e))?
            .error_for_status()
            .map_err(|e| self.transport(e))
    }

    /// Run one instant query and return its vector.
    pub async fn query(&self, expr: &str) -> Result<Vec<Sample>, AcquisitionError> {
        let url = Url::parse_with_params(&format!("{}/api/v1/query", self.base), &[("query", expr)])
            .map_err(|e| AcquisitionError::Transport(format!("invalid url {}: {e}", self.base)))?;
        debug!(%expr, "prometheus query");
        let resp: QueryResponse = self.get(url).await?.json().await.map_err(|e| self.transport(e))?;
        into_vector(resp)
    }

    /// Reachability check; returns the server version.
    pub async fn check(&self) -> Result<String, AcquisitionError> {
        let url = Url::parse(&format!("{}/api/v1/status/buildinfo", self.base))
            .map_err(|e| AcquisitionError::Transport(format!("invalid url {}: {e}", self.base)))?;
        let resp: BuildInfoResponse = self.get(url).await?.json().await.map_err(|e| self.transport(e))?;
        if resp.status != "success" {
            return Err(AcquisitionError::Decode(format!("buildinfo status {}", resp.status)));
        }
        Ok(resp.data.map(|d| d.version).unwrap_or_default())
    }

    fn transport(&self, e: reqwest::Error) -> AcquisitionError {
        if e.is_timeout() {
            AcquisitionError::Timeout(self.timeout)
        } else if e.is_decode() {
            AcquisitionError::Decode(e.to_string())
        } else {
            AcquisitionError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl SignalSource for PrometheusSource {
    fn source_kind(&self) -> SourceKind {
        SourceKind::MetricsStore
    }

    fn queries(&self, subsystem: Subsystem) -> Vec<QueryKind> {
        queries_for(subsystem)
    }

    async fn fetch_signals(&self, subsystem: Subsystem, query: QueryKind) -> Result<Batch, AcquisitionError> {
        let mut batch = Batch::default();
        for def in metrics_for(subsystem).iter().filter(|s| s.query == query) {
            let samples = self.query(def.metric).await?;
            decode_samples(subsystem, def, &samples, &mut batch);
        }
        Ok(batch)
    }
}
