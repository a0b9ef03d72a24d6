//! Recognizes reference lines in a template.
//!
//! A reference line is a list item whose body is wrapped in delimiters:
//!
//! ```text
//! + {"arxiv_id": "1706.03762", "doi": "10.48550/arXiv.1706.03762"}
//!   ++ <d:10.1038/nature14539>
//! ```
//!
//! The structured form is a JSON object; the compact form names a single
//! provider by its code letter.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::providers::string_like;
use crate::record::Provider;

pub const ENUMERATION_CHARS: &[char] = &['+'];

const STRUCTURED_OPEN: char = '{';
const STRUCTURED_CLOSE: char = '}';
const COMPACT_OPEN: char = '<';
const COMPACT_CLOSE: char = '>';
const COMPACT_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub provider: Provider,
    pub identifier: String,
}

impl ReferenceEntry {
    pub fn new(provider: Provider, identifier: impl Into<String>) -> Self {
        Self {
            provider,
            identifier: identifier.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        self.provider.cache_key(&self.identifier)
    }
}

/// Values written in the template itself; they win over anything fetched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Overrides {
    pub title: Option<String>,
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDescriptor {
    /// Text ahead of the enumerator, reused to indent the generated lines.
    pub line_prefix: String,
    pub enumerator: String,
    pub entries: Vec<ReferenceEntry>,
    /// Leave the DOI link out of the rendered block.
    pub skip_doi: bool,
    pub overrides: Overrides,
}

#[derive(Debug, Deserialize)]
struct StructuredReference {
    #[serde(default)]
    arxiv_id: Option<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    sems_id: Option<String>,
    #[serde(default)]
    skip_doi: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<Value>,
}

/// Parses `line` as a reference.
///
/// Returns `Ok(None)` for ordinary lines. A line that is clearly meant as a
/// reference but cannot be read is an error rather than plain text.
pub fn extract_reference(line: &str) -> Result<Option<ReferenceDescriptor>> {
    let trimmed = line.trim();
    let enumerator: String = trimmed
        .chars()
        .take_while(|c| ENUMERATION_CHARS.contains(c))
        .collect();
    if enumerator.is_empty() {
        return Ok(None);
    }

    let body = trimmed[enumerator.len()..].trim();
    let parsed = if is_wrapped(body, STRUCTURED_OPEN, STRUCTURED_CLOSE) {
        parse_structured(body)?
    } else if is_wrapped(body, COMPACT_OPEN, COMPACT_CLOSE) {
        match parse_compact(body)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        }
    } else {
        return Ok(None);
    };

    let indent = line.len() - line.trim_start().len();
    Ok(Some(ReferenceDescriptor {
        line_prefix: line[..indent].to_string(),
        enumerator,
        ..parsed
    }))
}

fn is_wrapped(body: &str, open: char, close: char) -> bool {
    body.len() >= 2 && body.starts_with(open) && body.ends_with(close)
}

fn parse_structured(body: &str) -> Result<ReferenceDescriptor> {
    let fields: StructuredReference = serde_json::from_str(body)
        .map_err(|e| ScienceError::MalformedReference(format!("{body}: {e}")))?;

    let entries: Vec<ReferenceEntry> = [
        (Provider::Arxiv, fields.arxiv_id),
        (Provider::Doi, fields.doi),
        (Provider::SemanticScholar, fields.sems_id),
    ]
    .into_iter()
    .filter_map(|(provider, id)| {
        id.map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(|id| ReferenceEntry::new(provider, id))
    })
    .collect();

    if entries.is_empty() {
        return Err(ScienceError::MalformedReference(format!(
            "{body}: names none of arxiv_id, doi, sems_id"
        )));
    }

    Ok(ReferenceDescriptor {
        line_prefix: String::new(),
        enumerator: String::new(),
        entries,
        skip_doi: fields.skip_doi,
        overrides: Overrides {
            title: fields.title,
            year: string_like(fields.year.as_ref()),
        },
    })
}

/// `<a:1706.03762>`: provider code at index 1, identifier from index 3.
/// Bodies not shaped like `<X:...>` (inline HTML, say) are not references.
fn parse_compact(body: &str) -> Result<Option<ReferenceDescriptor>> {
    let mut chars = body.chars().skip(1);
    let (Some(code), Some(COMPACT_SEPARATOR)) = (chars.next(), chars.next()) else {
        return Ok(None);
    };
    if !code.is_ascii_alphabetic() {
        return Ok(None);
    }

    let provider = Provider::from_code(code).ok_or_else(|| {
        ScienceError::MalformedReference(format!("{body}: unknown provider code '{code}'"))
    })?;
    let identifier = body[3..body.len() - 1].trim();
    if identifier.is_empty() {
        return Err(ScienceError::MalformedReference(format!(
            "{body}: empty identifier"
        )));
    }

    Ok(Some(ReferenceDescriptor {
        line_prefix: String::new(),
        enumerator: String::new(),
        entries: vec![ReferenceEntry::new(provider, identifier)],
        skip_doi: false,
        overrides: Overrides::default(),
    }))
}
