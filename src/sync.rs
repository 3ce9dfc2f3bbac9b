//! Pluggable remote persistence. The core depends only on the save/load
//! contract; the generic HTTP provider covers any endpoint that speaks the
//! snapshot format.

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::graph::HttpMethod;
use crate::snapshot::Snapshot;

/// Transient indicator surfaced to the user; failures never block further
/// editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

pub trait SyncProvider {
    fn save(&self, snapshot: &Snapshot) -> impl Future<Output = Result<()>> + Send;
    fn load(&self) -> impl Future<Output = Result<Snapshot>> + Send;
}

/// Generic HTTP transport: one endpoint, optional headers, configurable
/// write method. Loading is always a GET of the same endpoint.
#[derive(Debug, Clone)]
pub struct HttpSyncProvider {
    endpoint: String,
    method: HttpMethod,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl HttpSyncProvider {
    pub fn new(endpoint: impl Into<String>, method: HttpMethod) -> Self {
        HttpSyncProvider {
            endpoint: endpoint.into(),
            method,
            headers: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        request
    }
}

impl SyncProvider for HttpSyncProvider {
    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let request = match self.method {
            HttpMethod::Get => bail!("cannot save a snapshot over GET"),
            HttpMethod::Post => self.client.post(&self.endpoint),
        };
        let response = self
            .apply_headers(request)
            .json(snapshot)
            .send()
            .await
            .with_context(|| format!("failed to reach sync endpoint '{}'", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            bail!("sync endpoint rejected snapshot with status {status}");
        }
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot> {
        let response = self
            .apply_headers(self.client.get(&self.endpoint))
            .send()
            .await
            .with_context(|| format!("failed to reach sync endpoint '{}'", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            bail!("sync endpoint returned status {status}");
        }
        let raw = response
            .text()
            .await
            .context("failed to read sync response body")?;
        Snapshot::parse(&raw).context("sync endpoint returned an invalid snapshot")
    }
}
