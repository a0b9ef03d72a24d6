//! Append-only store of raw provider records.
//!
//! The backing file holds one JSON object per line. Each object is a raw
//! provider response carrying its own cache key under [`KEY_FIELD`]. The file
//! is rewritten in key order and only when something new was fetched, so a
//! run that hits the cache for everything leaves it byte-for-byte untouched.
//!
//! Lines are laid out the way `json.dumps(record, sort_keys=True)` writes
//! them: `", "` and `": "` separators and every non-ASCII character as a
//! `\uXXXX` escape. Cache files already in that layout survive a rewrite
//! unchanged.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use tracing::debug;

use crate::error::{Result, ScienceError};
use crate::record::{KEY_FIELD, RawRecord};

#[derive(Debug, Default)]
pub struct MetadataCache {
    path: Option<PathBuf>,
    records: BTreeMap<String, RawRecord>,
    dirty: bool,
}

impl MetadataCache {
    /// A cache with no backing file; `save_if_dirty` never writes.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Reads every record from `path`. A missing file is an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.is_file() {
            read_records(&path)?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), records = records.len(), "loaded metadata cache");

        Ok(Self {
            path: Some(path),
            records,
            dirty: false,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&RawRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Stores `record` under `key`, tagging it with the key field.
    ///
    /// Records are never replaced: returns `false` and leaves the cache clean
    /// when `key` is already present.
    pub fn put(&mut self, key: &str, mut record: RawRecord) -> bool {
        if self.records.contains_key(key) {
            return false;
        }
        record.set_key(key);
        self.records.insert(key.to_string(), record);
        self.dirty = true;
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Rewrites the backing file if anything was added since the last load or
    /// save. Returns whether a write happened.
    pub fn save_if_dirty(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };

        write_records(path, &self.records)?;
        debug!(path = %path.display(), records = self.records.len(), "saved metadata cache");
        self.dirty = false;
        Ok(true)
    }
}

fn read_records(path: &Path) -> Result<BTreeMap<String, RawRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = BTreeMap::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawRecord = serde_json::from_str(&line).map_err(|e| {
            ScienceError::Cache(format!("{}:{}: invalid record: {e}", path.display(), idx + 1))
        })?;
        let key = record
            .key()
            .ok_or_else(|| {
                ScienceError::Cache(format!(
                    "{}:{}: record has no {KEY_FIELD} field",
                    path.display(),
                    idx + 1
                ))
            })?
            .to_string();
        records.insert(key, record);
    }

    Ok(records)
}

fn write_records(path: &Path, records: &BTreeMap<String, RawRecord>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for record in records.values() {
        writer.write_all(encode_line(record)?.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// One cache line for `record`, without the trailing newline.
pub fn encode_line(record: &RawRecord) -> Result<String> {
    let mut buf = Vec::new();
    record
        .serialize(&mut Serializer::with_formatter(&mut buf, CacheLineFormatter))
        .map_err(|e| ScienceError::Cache(format!("cannot serialize record: {e}")))?;
    String::from_utf8(buf).map_err(|e| ScienceError::Cache(format!("non-UTF-8 cache line: {e}")))
}

/// Compact JSON with spaced separators and ASCII-only strings.
struct CacheLineFormatter;

impl Formatter for CacheLineFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        // Control characters, quotes and backslashes never reach here; they
        // go through `write_char_escape`.
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch <= '~' {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
