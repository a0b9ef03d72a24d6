use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ScienceError};
use crate::http::{PoliteClient, ThrottlePolicy};
use crate::providers::{ProviderAdapter, parse_json_object, string_like};
use crate::record::{Author, CanonicalRecord, Provider, RawRecord};

/// Field the adapter adds to every payload, since the response itself does
/// not echo the identifier it was requested with.
pub const SEMS_ID_FIELD: &str = "sems_id";

/// Paper lookups against the Semantic Scholar paper endpoint.
pub struct SemanticScholarAdapter {
    client: Arc<PoliteClient>,
    base_url: String,
    throttle: ThrottlePolicy,
}

impl SemanticScholarAdapter {
    pub fn new(client: Arc<PoliteClient>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle: ThrottlePolicy::Fail,
        }
    }

    pub fn with_throttle_policy(mut self, policy: ThrottlePolicy) -> Self {
        self.throttle = policy;
        self
    }
}

#[async_trait]
impl ProviderAdapter for SemanticScholarAdapter {
    fn provider(&self) -> Provider {
        Provider::SemanticScholar
    }

    async fn fetch_raw(&self, identifier: &str) -> Result<RawRecord> {
        let url = format!("{}/{}", self.base_url, identifier);
        info!(paper_id = identifier, "fetching Semantic Scholar paper");

        let body = self.client.get(&url, self.throttle).await?;
        let mut raw = parse_json_object(&body, "Semantic Scholar")?;
        raw.insert(SEMS_ID_FIELD, Value::String(identifier.to_string()));
        Ok(raw)
    }

    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord> {
        let title = raw
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ScienceError::Parse("Semantic Scholar paper has no title".into()))?
            .to_string();

        let authors: Vec<Author> = raw
            .get("authors")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .filter(|name| !name.trim().is_empty())
                    .map(Author::from_full_name)
                    .collect()
            })
            .unwrap_or_default();

        Ok(CanonicalRecord {
            title,
            authors,
            year: string_like(raw.get("year")),
            arxiv_id: string_like(raw.get("arxivId")),
            doi: string_like(raw.get("doi")),
            sems_id: string_like(raw.get(SEMS_ID_FIELD)),
        })
    }
}
