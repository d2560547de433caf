//! Subgraph GraphQL client
//!
//! Thin reqwest wrapper shared by the pool repository and the gauge source.
//! GraphQL-level errors are turned into `anyhow` errors.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

/// Client for one subgraph endpoint
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: reqwest::Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `{query, variables}` and decode `data`
    pub async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        debug!("Subgraph query to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .with_context(|| format!("Subgraph request failed: {}", self.url))?
            .error_for_status()
            .with_context(|| format!("Subgraph returned an error status: {}", self.url))?;

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .context("Failed to decode subgraph response")?;

        decode_response(body)
    }
}

fn decode_response<T>(body: GraphQlResponse<T>) -> Result<T> {
    if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        anyhow::bail!("Subgraph query failed: {}", messages.join("; "));
    }

    body.data.context("Subgraph response has no data")
}
