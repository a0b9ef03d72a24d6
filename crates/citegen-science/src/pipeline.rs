use std::io::{BufRead, Write};

use citegen_core::AppConfig;
use tracing::debug;

use crate::cache::MetadataCache;
use crate::error::{Result, ScienceError};
use crate::extract::{ReferenceDescriptor, ReferenceEntry, extract_reference};
use crate::providers::ProviderSet;
use crate::record::CanonicalRecord;
use crate::render::{LinkBases, render_citation};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub links: LinkBases,
    /// Flush the cache file after every live fetch.
    pub save_incrementally: bool,
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            links: LinkBases::from(&config.render),
            save_incrementally: config.cache.save_incrementally,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandStats {
    pub lines: usize,
    pub references: usize,
    pub fetched: usize,
    pub cache_hits: usize,
}

/// Turns template lines into citation blocks, one line and one lookup at a time.
pub struct Pipeline {
    providers: ProviderSet,
    cache: MetadataCache,
    options: PipelineOptions,
    stats: ExpandStats,
}

impl Pipeline {
    pub fn new(providers: ProviderSet, cache: MetadataCache, options: PipelineOptions) -> Self {
        Self {
            providers,
            cache,
            options,
            stats: ExpandStats::default(),
        }
    }

    pub fn from_config(config: &AppConfig, cache: MetadataCache) -> Result<Self> {
        Ok(Self::new(
            ProviderSet::from_config(config)?,
            cache,
            PipelineOptions::from(config),
        ))
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut MetadataCache {
        &mut self.cache
    }

    pub fn into_cache(self) -> MetadataCache {
        self.cache
    }

    pub fn stats(&self) -> ExpandStats {
        self.stats
    }

    /// Copies `reader` to `writer` line by line, expanding reference lines.
    /// Other lines go through untouched, terminators included.
    pub async fn expand<R: BufRead, W: Write>(
        &mut self,
        mut reader: R,
        mut writer: W,
    ) -> Result<ExpandStats> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let out = self.expand_line(&line).await?;
            writer.write_all(out.as_bytes())?;
            writer.flush()?;
            self.stats.lines += 1;
        }
        Ok(self.stats)
    }

    pub async fn expand_line(&mut self, line: &str) -> Result<String> {
        let Some(descriptor) = extract_reference(line)? else {
            return Ok(line.to_string());
        };
        self.stats.references += 1;
        let record = self.resolve(&descriptor).await?;
        Ok(render_citation(&descriptor, &record, &self.options.links))
    }

    /// Looks up every entry of `descriptor` and merges the results in entry
    /// order. Template overrides come first, so they always win.
    pub async fn resolve(&mut self, descriptor: &ReferenceDescriptor) -> Result<CanonicalRecord> {
        let mut merged = CanonicalRecord {
            title: descriptor.overrides.title.clone().unwrap_or_default(),
            year: descriptor.overrides.year.clone(),
            ..Default::default()
        };
        for entry in &descriptor.entries {
            let record = self.lookup(entry).await?;
            merged.merge_missing(record);
        }
        Ok(merged)
    }

    async fn lookup(&mut self, entry: &ReferenceEntry) -> Result<CanonicalRecord> {
        let key = entry.cache_key();
        let adapter = self.providers.get(entry.provider);

        if let Some(raw) = self.cache.get(&key) {
            debug!(%key, "cache hit");
            self.stats.cache_hits += 1;
            return adapter.normalize(raw);
        }

        let raw = adapter.fetch_raw(&entry.identifier).await?;
        self.stats.fetched += 1;
        self.cache.put(&key, raw);
        if self.options.save_incrementally {
            self.cache.save_if_dirty()?;
        }

        let raw = self
            .cache
            .get(&key)
            .ok_or_else(|| ScienceError::Cache(format!("{key} missing right after insert")))?;
        adapter.normalize(raw)
    }
}
