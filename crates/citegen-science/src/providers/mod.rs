//! Metadata providers.
//!
//! Each provider fetches its own raw payload shape and knows how to turn a
//! cached payload into a [`CanonicalRecord`]. The set is closed: lookups go
//! through [`ProviderSet::get`], which matches on [`Provider`].

use std::sync::Arc;

use async_trait::async_trait;
use citegen_core::AppConfig;
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{PoliteClient, ThrottlePolicy};
use crate::record::{CanonicalRecord, Provider, RawRecord};

pub mod arxiv;
pub mod crossref;
pub mod semantic_scholar;

pub use arxiv::ArxivAdapter;
pub use crossref::CrossRefAdapter;
pub use semantic_scholar::SemanticScholarAdapter;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetches the provider's payload for `identifier` over the network.
    async fn fetch_raw(&self, identifier: &str) -> Result<RawRecord>;

    /// Reads a canonical record out of a payload produced by `fetch_raw`.
    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord>;
}

pub struct ProviderSet {
    arxiv: ArxivAdapter,
    crossref: CrossRefAdapter,
    semantic_scholar: SemanticScholarAdapter,
}

impl ProviderSet {
    pub fn new(
        arxiv: ArxivAdapter,
        crossref: CrossRefAdapter,
        semantic_scholar: SemanticScholarAdapter,
    ) -> Self {
        Self {
            arxiv,
            crossref,
            semantic_scholar,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Arc::new(PoliteClient::new(&config.network)?);
        // Only arXiv has been seen to throttle; the others fail fast unless asked.
        let json_policy = if config.network.retry_throttled_everywhere {
            ThrottlePolicy::Retry
        } else {
            ThrottlePolicy::Fail
        };

        Ok(Self::new(
            ArxivAdapter::new(client.clone(), &config.providers.arxiv_oai_url),
            CrossRefAdapter::new(client.clone(), &config.providers.crossref_url)
                .with_throttle_policy(json_policy),
            SemanticScholarAdapter::new(client, &config.providers.semantic_scholar_url)
                .with_throttle_policy(json_policy),
        ))
    }

    pub fn get(&self, provider: Provider) -> &dyn ProviderAdapter {
        match provider {
            Provider::Arxiv => &self.arxiv,
            Provider::Doi => &self.crossref,
            Provider::SemanticScholar => &self.semantic_scholar,
        }
    }
}

pub(crate) fn parse_json_object(body: &str, source: &str) -> Result<RawRecord> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ScienceError::Parse(format!("invalid JSON from {source}: {e}")))?;
    RawRecord::try_from(value)
        .map_err(|_| ScienceError::Parse(format!("{source} response is not a JSON object")))
}

/// A string, or a number rendered as one. Null and other shapes are absent.
pub(crate) fn string_like(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
