//! Vector Store Client
//!
//! Talks to a hosted record index that embeds text server-side, so records
//! are plain `(id, text)` pairs and queries are plain text.

use crate::{
    error::UpstreamError,
    http,
    types::{ScoredMatch, VectorRecord},
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};
use tracing::debug;

const SERVICE: &str = "vector store";
const API_VERSION: &str = "2025-01";

/// A remote similarity index over raw text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stores `text` under `id`. Callers always supply a fresh id.
    async fn upsert(&self, id: &str, text: &str) -> Result<(), UpstreamError>;

    /// Returns up to `k` records nearest to `text`, best first.
    /// An empty index yields an empty vector.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredMatch>, UpstreamError>;
}

/// Upserts `text` under a newly generated UUID and returns that id.
pub async fn insert_text(store: &dyn VectorStore, text: &str) -> Result<String, UpstreamError> {
    let id = uuid::Uuid::new_v4().to_string();
    store.upsert(&id, text).await?;
    Ok(id)
}

/// Shapes nearest-neighbour hits into a reply.
///
/// Hits are taken best score first; blank and repeated texts are dropped and
/// the rest are joined with a blank line. No hits gives an empty string.
pub fn compose_contextual_response(matches: &[ScoredMatch]) -> String {
    let mut ordered: Vec<&ScoredMatch> = matches.iter().collect();
    ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .map(|m| m.text.trim())
        .filter(|text| !text.is_empty() && seen.insert(*text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Connection settings for [`HostedVectorStore`].
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub host: String,
    pub namespace: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

/// `VectorStore` backed by a hosted index with integrated embedding.
pub struct HostedVectorStore {
    client: reqwest::Client,
    upsert_url: String,
    search_url: String,
    api_key: SecretString,
    timeout: Duration,
}

#[derive(Serialize)]
struct UpsertRecord<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: SearchQuery<'a>,
    fields: [&'static str; 1],
}

#[derive(Serialize)]
struct SearchQuery<'a> {
    inputs: SearchInputs<'a>,
    top_k: usize,
}

#[derive(Serialize)]
struct SearchInputs<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Deserialize, Debug)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize, Debug)]
struct Hit {
    #[serde(rename = "_score")]
    score: f32,
    fields: HitFields,
}

#[derive(Deserialize, Debug)]
struct HitFields {
    text: String,
}

impl HostedVectorStore {
    pub fn new(config: VectorStoreConfig) -> anyhow::Result<Self> {
        let base = format!(
            "{}/records/namespaces/{}",
            config.host.trim_end_matches('/'),
            config.namespace
        );
        Ok(Self {
            client: http::build_client(config.timeout)?,
            upsert_url: format!("{base}/upsert"),
            search_url: format!("{base}/search"),
            api_key: config.api_key,
            timeout: config.timeout,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Api-Key", self.api_key.expose_secret())
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

#[async_trait]
impl VectorStore for HostedVectorStore {
    async fn upsert(&self, id: &str, text: &str) -> Result<(), UpstreamError> {
        let record = VectorRecord {
            id: id.to_string(),
            text: text.to_string(),
        };
        // The records endpoint takes newline-delimited JSON.
        let mut line = serde_json::to_string(&UpsertRecord {
            id: &record.id,
            text: &record.text,
        })
        .map_err(|e| UpstreamError::protocol(SERVICE, e.to_string()))?;
        line.push('\n');

        let request = self
            .authed(self.client.post(&self.upsert_url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(line);
        http::with_deadline(SERVICE, self.timeout, http::send(SERVICE, request, self.timeout))
            .await?;
        debug!(id = %record.id, "Record upserted");
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredMatch>, UpstreamError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let body = SearchRequest {
            query: SearchQuery {
                inputs: SearchInputs { text },
                top_k: k,
            },
            fields: ["text"],
        };
        let request = self.authed(self.client.post(&self.search_url)).json(&body);

        let response = http::with_deadline(
            SERVICE,
            self.timeout,
            http::send_json_or_missing::<SearchResponse>(SERVICE, request, self.timeout),
        )
        .await?;
        // A namespace that has never been written to does not exist yet.
        let Some(response) = response else {
            debug!("Namespace not found, treating index as empty");
            return Ok(Vec::new());
        };

        let mut matches: Vec<ScoredMatch> = response
            .result
            .hits
            .into_iter()
            .map(|hit| ScoredMatch {
                text: hit.fields.text,
                score: hit.score,
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(k);
        Ok(matches)
    }
}
