use citegen_core::RenderConfig;

use crate::extract::ReferenceDescriptor;
use crate::record::CanonicalRecord;

/// Indent added in front of the link lines under a citation.
const NESTED_INDENT: &str = "  ";

/// Link prefixes for the lines under a citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBases {
    pub arxiv_pdf: String,
    pub doi_resolver: String,
}

impl Default for LinkBases {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for LinkBases {
    fn from(config: &RenderConfig) -> Self {
        Self {
            arxiv_pdf: config.arxiv_pdf_base.clone(),
            doi_resolver: config.doi_resolver_base.clone(),
        }
    }
}

/// Renders the citation block replacing a reference line. Every line,
/// including the last, ends in `\n`.
pub fn render_citation(
    descriptor: &ReferenceDescriptor,
    record: &CanonicalRecord,
    links: &LinkBases,
) -> String {
    let mut out = String::new();
    out.push_str(&descriptor.line_prefix);
    out.push_str(&descriptor.enumerator);
    out.push(' ');
    if let Some(year) = &record.year {
        out.push_str(&format!("({year}) "));
    }
    out.push_str(&record.title);
    if !record.authors.is_empty() {
        let authors = record
            .authors
            .iter()
            .map(|a| a.display_name())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(" by ");
        out.push_str(&authors);
    }
    out.push('\n');

    let nested = format!(
        "{}{NESTED_INDENT}{} ",
        descriptor.line_prefix, descriptor.enumerator
    );
    if let Some(arxiv_id) = &record.arxiv_id {
        out.push_str(&format!("{nested}{}{arxiv_id}\n", links.arxiv_pdf));
    }
    if let Some(doi) = &record.doi
        && !descriptor.skip_doi
    {
        out.push_str(&format!("{nested}{}{doi}\n", links.doi_resolver));
    }
    out
}
