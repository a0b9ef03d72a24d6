use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ScienceError};
use crate::http::{PoliteClient, ThrottlePolicy};
use crate::providers::{ProviderAdapter, parse_json_object, string_like};
use crate::record::{Author, CanonicalRecord, Provider, RawRecord};

/// DOI metadata from the CrossRef works API.
pub struct CrossRefAdapter {
    client: Arc<PoliteClient>,
    base_url: String,
    throttle: ThrottlePolicy,
}

impl CrossRefAdapter {
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
impl ProviderAdapter for CrossRefAdapter {
    fn provider(&self) -> Provider {
        Provider::Doi
    }

    async fn fetch_raw(&self, identifier: &str) -> Result<RawRecord> {
        let url = format!("{}/works/{}", self.base_url, identifier);
        info!(doi = identifier, "fetching CrossRef work");

        let body = self.client.get(&url, self.throttle).await?;
        parse_json_object(&body, "CrossRef")
    }

    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord> {
        let message = raw
            .get("message")
            .filter(|m| m.is_object())
            .ok_or_else(|| ScienceError::Parse("CrossRef work has no message".into()))?;

        let title = match &message["title"] {
            Value::Array(parts) => parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            Value::String(s) => s.clone(),
            _ => String::new(),
        };
        if title.trim().is_empty() {
            return Err(ScienceError::Parse("CrossRef work has no title".into()));
        }

        let authors: Vec<Author> = message["author"]
            .as_array()
            .map(|list| list.iter().filter_map(parse_author).collect())
            .unwrap_or_default();

        let doi = message["DOI"].as_str().map(ToOwned::to_owned);

        Ok(CanonicalRecord {
            title,
            authors,
            year: parse_year(message),
            arxiv_id: None,
            doi,
            sems_id: None,
        })
    }
}

/// `None` for entries carrying neither a family, given nor organization name.
fn parse_author(v: &Value) -> Option<Author> {
    let given = v["given"].as_str().unwrap_or_default().trim();
    // Organizations come through with only `name`.
    let family = v["family"]
        .as_str()
        .or_else(|| v["name"].as_str())
        .unwrap_or_default()
        .trim();
    if family.is_empty() && given.is_empty() {
        return None;
    }
    Some(Author::new(family, given))
}

fn parse_year(message: &Value) -> Option<String> {
    // "created": {"date-parts": [[2017, 6, 12]]}
    string_like(message.pointer("/created/date-parts/0/0"))
        .or_else(|| string_like(message.pointer("/issued/date-parts/0/0")))
}
