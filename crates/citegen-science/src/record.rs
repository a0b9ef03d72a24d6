use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Synthetic field embedded in every cached record, holding its cache key.
/// The leading digit keeps it first once record keys are sorted.
pub const KEY_FIELD: &str = "0KEY_";

/// Which metadata service an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    Arxiv,
    Doi,
    SemanticScholar,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Arxiv, Provider::Doi, Provider::SemanticScholar];

    pub fn code(self) -> char {
        match self {
            Provider::Arxiv => 'a',
            Provider::Doi => 'd',
            Provider::SemanticScholar => 's',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Provider::Arxiv => "arXiv",
            Provider::Doi => "CrossRef",
            Provider::SemanticScholar => "Semantic Scholar",
        }
    }

    /// Cache key for `identifier` at this provider: `code:identifier`.
    pub fn cache_key(self, identifier: &str) -> String {
        format!("{}:{}", self.code(), identifier)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A provider response exactly as fetched, plus the key field once cached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn key(&self) -> Option<&str> {
        self.0.get(KEY_FIELD).and_then(Value::as_str)
    }

    pub(crate) fn set_key(&mut self, key: &str) {
        self.0.insert(KEY_FIELD.to_string(), Value::String(key.to_string()));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for RawRecord {
    type Error = Value;

    fn try_from(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Author {
    pub family: String,
    pub given: String,
}

impl Author {
    pub fn new(family: impl Into<String>, given: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            given: given.into(),
        }
    }

    /// "First Middle Last": the last token is the family name.
    pub fn from_full_name(name: &str) -> Self {
        let mut tokens: Vec<&str> = name.split_whitespace().collect();
        let family = tokens.pop().unwrap_or_default();
        Self::new(family, tokens.join(" "))
    }

    /// Reading order, `given family`.
    pub fn display_name(&self) -> String {
        match (self.given.is_empty(), self.family.is_empty()) {
            (true, _) => self.family.clone(),
            (false, true) => self.given.clone(),
            (false, false) => format!("{} {}", self.given, self.family),
        }
    }
}

/// Provider-agnostic metadata for one reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub title: String,
    pub authors: Vec<Author>,
    pub year: Option<String>,
    pub arxiv_id: Option<String>,
    pub doi: Option<String>,
    pub sems_id: Option<String>,
}

impl CanonicalRecord {
    /// Fills every unset field of `self` from `other`. Set fields are kept,
    /// so merging in priority order gives first-seen-wins.
    pub fn merge_missing(&mut self, other: CanonicalRecord) {
        if self.title.is_empty() {
            self.title = other.title;
        }
        if self.authors.is_empty() {
            self.authors = other.authors;
        }
        fill(&mut self.year, other.year);
        fill(&mut self.arxiv_id, other.arxiv_id);
        fill(&mut self.doi, other.doi);
        fill(&mut self.sems_id, other.sems_id);
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}
