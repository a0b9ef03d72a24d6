//! citegen science: reference extraction, metadata providers, caching and
//! citation rendering.

pub mod cache;
pub mod error;
pub mod extract;
pub mod http;
pub mod pipeline;
pub mod providers;
pub mod record;
pub mod render;
pub mod xml;

pub use cache::MetadataCache;
pub use error::{Result, ScienceError};
pub use extract::{ReferenceDescriptor, ReferenceEntry, extract_reference};
pub use pipeline::{ExpandStats, Pipeline, PipelineOptions};
pub use providers::{ProviderAdapter, ProviderSet};
pub use record::{Author, CanonicalRecord, Provider, RawRecord};
pub use render::{LinkBases, render_citation};
