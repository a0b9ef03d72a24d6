use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ScienceError};
use crate::http::{PoliteClient, ThrottlePolicy};
use crate::providers::ProviderAdapter;
use crate::record::{Author, CanonicalRecord, Provider, RawRecord};
use crate::xml::{as_sequence, flatten_document, text_of};

/// Prefix OAI-PMH puts in front of arXiv identifiers.
pub const OAI_ID_PREFIX: &str = "oai:arXiv.org:";

/// arXiv metadata through the OAI-PMH `GetRecord` verb (`arXiv` metadata format).
pub struct ArxivAdapter {
    client: Arc<PoliteClient>,
    base_url: String,
}

impl ArxivAdapter {
    pub fn new(client: Arc<PoliteClient>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    fn record_url(&self, identifier: &str) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}verb=GetRecord&identifier={OAI_ID_PREFIX}{identifier}&metadataPrefix=arXiv",
            self.base_url
        )
    }
}

#[async_trait]
impl ProviderAdapter for ArxivAdapter {
    fn provider(&self) -> Provider {
        Provider::Arxiv
    }

    async fn fetch_raw(&self, identifier: &str) -> Result<RawRecord> {
        let url = self.record_url(identifier);
        info!(identifier, "fetching arXiv record");

        let xml = self.client.get(&url, ThrottlePolicy::Retry).await?;
        let flat = flatten_document(&xml)?;

        // OAI-PMH reports bad identifiers in-band with a 200.
        if let Some(error) = flat.get("error") {
            let code = error
                .pointer("/_attrib/code")
                .and_then(Value::as_str)
                .unwrap_or("error");
            let message = text_of(error).unwrap_or_default().trim();
            return Err(ScienceError::ApiError(url, format!("OAI-PMH {code}: {message}")));
        }

        RawRecord::try_from(flat)
            .map_err(|_| ScienceError::Parse("flattened arXiv response is not an object".into()))
    }

    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord> {
        let record = raw
            .get("GetRecord")
            .and_then(|v| v.get("record"))
            .ok_or_else(|| ScienceError::Parse("arXiv record has no GetRecord.record".into()))?;
        let meta = record
            .pointer("/metadata/arXiv")
            .ok_or_else(|| ScienceError::Parse("arXiv record has no arXiv metadata".into()))?;

        let title = meta
            .get("title")
            .and_then(text_of)
            .map(normalize_title)
            .ok_or_else(|| ScienceError::Parse("arXiv record has no title".into()))?;

        let authors = author_list(meta)?
            .into_iter()
            .map(parse_author)
            .collect::<Result<Vec<_>>>()?;

        let arxiv_id = record
            .pointer("/header/identifier")
            .and_then(text_of)
            .map(|id| id.trim().trim_start_matches(OAI_ID_PREFIX).to_string());

        let year = meta
            .get("created")
            .and_then(text_of)
            .map(|created| created.trim().chars().take(4).collect::<String>())
            .filter(|year| !year.is_empty());

        let doi = meta
            .get("doi")
            .and_then(text_of)
            .map(str::trim)
            .filter(|doi| !doi.is_empty())
            .map(ToOwned::to_owned);

        Ok(CanonicalRecord {
            title,
            authors,
            year,
            arxiv_id,
            doi,
            sems_id: None,
        })
    }
}

/// `authors.author` is a single object for one author and a list otherwise.
fn author_list(meta: &Value) -> Result<Vec<&Value>> {
    match meta.get("authors") {
        Some(Value::Object(wrapper)) if wrapper.contains_key("author") => {
            Ok(as_sequence(&wrapper["author"]))
        }
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(ScienceError::Parse(format!(
            "unexpected arXiv authors shape: {other}"
        ))),
    }
}

fn parse_author(value: &Value) -> Result<Author> {
    let family = value
        .get("keyname")
        .and_then(text_of)
        .ok_or_else(|| ScienceError::Parse(format!("arXiv author without keyname: {value}")))?;
    let given = value.get("forenames").and_then(text_of).unwrap_or_default();
    Ok(Author::new(family.trim(), given.trim()))
}

/// Newlines become spaces and runs of spaces collapse to one.
fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_space = false;
    for ch in title.chars() {
        let ch = if ch == '\n' || ch == '\r' { ' ' } else { ch };
        if ch == ' ' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    const RECORD_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <responseDate>2024-01-01T00:00:00Z</responseDate>
  <request verb="GetRecord" identifier="oai:arXiv.org:1706.03762" metadataPrefix="arXiv">http://export.arxiv.org/oai2</request>
  <GetRecord>
    <record>
      <header>
        <identifier>oai:arXiv.org:1706.03762</identifier>
        <datestamp>2023-08-03</datestamp>
        <setSpec>cs</setSpec>
      </header>
      <metadata>
        <arXiv xmlns="http://arxiv.org/OAI/arXiv/">
          <id>1706.03762</id>
          <created>2017-06-12</created>
          <updated>2023-08-02</updated>
          <authors>
            <author><keyname>Vaswani</keyname><forenames>Ashish</forenames></author>
            <author><keyname>Shazeer</keyname><forenames>Noam</forenames></author>
          </authors>
          <title>Attention Is All
  You Need</title>
          <categories>cs.CL cs.LG</categories>
        </arXiv>
      </metadata>
    </record>
  </GetRecord>
</OAI-PMH>"#;

    fn adapter(base_url: &str) -> ArxivAdapter {
        let client = PoliteClient::with_params("citegen-test", Duration::ZERO, Duration::ZERO, None)
            .unwrap();
        ArxivAdapter::new(Arc::new(client), base_url)
    }

    fn raw(value: Value) -> RawRecord {
        RawRecord::try_from(value).unwrap()
    }

    fn single_author_record() -> RawRecord {
        raw(json!({
            "GetRecord": {"record": {
                "header": {"identifier": "oai:arXiv.org:1234.5678"},
                "metadata": {"arXiv": {
                    "title": "Foo\nBar",
                    "authors": {"author": {"keyname": "Smith", "forenames": "Jon"}},
                    "created": "2020-01-01",
                    "doi": null
                }}
            }}
        }))
    }

    #[tokio::test]
    async fn fetches_and_normalizes_record() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/oai2")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("verb".into(), "GetRecord".into()),
                Matcher::UrlEncoded("identifier".into(), "oai:arXiv.org:1706.03762".into()),
                Matcher::UrlEncoded("metadataPrefix".into(), "arXiv".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(RECORD_XML)
            .create_async()
            .await;

        let adapter = adapter(&format!("{}/oai2", server.url()));
        let raw = adapter.fetch_raw("1706.03762").await.unwrap();
        let record = adapter.normalize(&raw).unwrap();

        assert_eq!(record.title, "Attention Is All You Need");
        assert_eq!(
            record.authors,
            vec![Author::new("Vaswani", "Ashish"), Author::new("Shazeer", "Noam")]
        );
        assert_eq!(record.arxiv_id.as_deref(), Some("1706.03762"));
        assert_eq!(record.year.as_deref(), Some("2017"));
        assert_eq!(record.doi, None);
    }

    #[tokio::test]
    async fn oai_error_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/oai2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"<OAI-PMH><error code="idDoesNotExist">No such record</error></OAI-PMH>"#,
            )
            .create_async()
            .await;

        let err = adapter(&format!("{}/oai2", server.url()))
            .fetch_raw("0000.0000")
            .await
            .unwrap_err();
        assert!(
            matches!(err, ScienceError::ApiError(_, ref msg) if msg == "OAI-PMH idDoesNotExist: No such record")
        );
    }

    #[test]
    fn single_author_is_forced_into_list() {
        let record = adapter("http://unused").normalize(&single_author_record()).unwrap();
        assert_eq!(record.title, "Foo Bar");
        assert_eq!(record.authors, vec![Author::new("Smith", "Jon")]);
        assert_eq!(record.year.as_deref(), Some("2020"));
        assert_eq!(record.arxiv_id.as_deref(), Some("1234.5678"));
        assert_eq!(record.doi, None);
    }

    #[test]
    fn optional_fields_may_be_missing() {
        let record = adapter("http://unused")
            .normalize(&raw(json!({
                "GetRecord": {"record": {
                    "header": {"identifier": "oai:arXiv.org:1"},
                    "metadata": {"arXiv": {
                        "title": "T",
                        "authors": {"author": [{"keyname": "Plato"}]},
                        "doi": "10.1/abc"
                    }}
                }}
            })))
            .unwrap();
        assert_eq!(record.year, None);
        assert_eq!(record.authors, vec![Author::new("Plato", "")]);
        assert_eq!(record.doi.as_deref(), Some("10.1/abc"));
    }

    #[test]
    fn missing_title_is_a_parse_error() {
        let err = adapter("http://unused")
            .normalize(&raw(json!({"GetRecord": {"record": {"metadata": {"arXiv": {}}}}})))
            .unwrap_err();
        assert!(matches!(err, ScienceError::Parse(_)));
    }

    #[test]
    fn title_whitespace_collapses() {
        assert_eq!(normalize_title("A\n  B   C\n"), "A B C");
    }

    #[test]
    fn record_url_format() {
        assert_eq!(
            adapter("http://export.arxiv.org/oai2").record_url("1234.5678"),
            "http://export.arxiv.org/oai2?verb=GetRecord&identifier=oai:arXiv.org:1234.5678&metadataPrefix=arXiv"
        );
    }
}
