//! Document source backed by the document store's export directory.
//!
//! Each collection is a file named after it, one extended-JSON document per line
//! (`users.ndjson`, `conversations.ndjson`, `auditlogs.ndjson`). Files with a
//! `.json` extension and whole-file JSON array exports are read as well.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use medchat_migrate_core::{Collection, DocumentSource, SourceDocument, SourceError};
use serde::de::IgnoredAny;
use serde_json::Value;

const FILE_URI_PREFIX: &str = "file://";
const EXTENSIONS: [&str; 2] = ["ndjson", "json"];

#[derive(Debug)]
pub struct NdjsonSource {
    root: PathBuf,
}

impl NdjsonSource {
    /// Open an export directory given as a plain path or a `file://` URI.
    ///
    /// # Errors
    /// Returns an error when the location does not exist or is not a directory.
    pub fn open(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("source URI is empty"));
        }
        let root = PathBuf::from(trimmed.strip_prefix(FILE_URI_PREFIX).unwrap_or(trimmed));

        let metadata = fs::metadata(&root)
            .with_context(|| format!("failed to open source export at {}", root.display()))?;
        if !metadata.is_dir() {
            return Err(anyhow!("source export {} is not a directory", root.display()));
        }

        tracing::info!(root = %root.display(), "opened document source");
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: Collection) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|extension| self.root.join(format!("{}.{extension}", collection.as_str())))
            .find(|path| path.is_file())
    }

    /// Lines are read as raw bytes so that one undecodable line fails alone.
    fn read_lines(
        path: &Path,
        collection: Collection,
        limit: Option<usize>,
    ) -> Result<Vec<SourceDocument>, SourceError> {
        let read_error = |source| SourceError::Read { collection, source };
        let mut reader = BufReader::new(File::open(path).map_err(read_error)?);
        let mut documents = Vec::new();
        let mut line = Vec::new();
        let mut position = 0;

        while !limit.is_some_and(|limit| documents.len() >= limit) {
            line.clear();
            if reader.read_until(b'\n', &mut line).map_err(read_error)? == 0 {
                break;
            }
            position += 1;
            if is_blank(&line) {
                continue;
            }
            documents.push(match serde_json::from_slice::<Value>(&line) {
                Ok(value) => SourceDocument::parsed(position, value),
                Err(err) => SourceDocument::malformed(position, format!("line {position}: {err}")),
            });
        }

        Ok(documents)
    }

    /// Non-blank lines, counted without decoding them.
    fn count_lines(path: &Path, collection: Collection) -> Result<usize, SourceError> {
        let read_error = |source| SourceError::Read { collection, source };
        let mut reader = BufReader::new(File::open(path).map_err(read_error)?);
        let mut line = Vec::new();
        let mut count = 0;
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).map_err(read_error)? == 0 {
                return Ok(count);
            }
            if !is_blank(&line) {
                count += 1;
            }
        }
    }

    fn read_array(
        path: &Path,
        collection: Collection,
        limit: Option<usize>,
    ) -> Result<Vec<SourceDocument>, SourceError> {
        let bytes = fs::read(path).map_err(|source| SourceError::Read { collection, source })?;
        let values: Vec<Value> = serde_json::from_slice(&bytes)
            .map_err(|err| SourceError::ArrayExport { collection, reason: err.to_string() })?;
        let take = limit.unwrap_or(values.len());
        Ok(values
            .into_iter()
            .take(take)
            .enumerate()
            .map(|(index, value)| SourceDocument::parsed(index + 1, value))
            .collect())
    }

    /// An array export has to be scanned to its end, but its elements are skipped
    /// rather than built.
    fn count_array(path: &Path, collection: Collection) -> Result<usize, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Read { collection, source })?;
        let elements: Vec<IgnoredAny> = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| SourceError::ArrayExport { collection, reason: err.to_string() })?;
        Ok(elements.len())
    }

    fn is_array_export(path: &Path, collection: Collection) -> Result<bool, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Read { collection, source })?;
        let mut reader = BufReader::new(file);
        loop {
            let buffer = reader
                .fill_buf()
                .map_err(|source| SourceError::Read { collection, source })?;
            let Some(first) = buffer.iter().find(|byte| !byte.is_ascii_whitespace()) else {
                if buffer.is_empty() {
                    return Ok(false);
                }
                let consumed = buffer.len();
                reader.consume(consumed);
                continue;
            };
            return Ok(*first == b'[');
        }
    }
}

impl DocumentSource for NdjsonSource {
    fn read(
        &mut self,
        collection: Collection,
        limit: Option<usize>,
    ) -> Result<Vec<SourceDocument>, SourceError> {
        let Some(path) = self.collection_path(collection) else {
            tracing::warn!(
                collection = collection.as_str(),
                root = %self.root.display(),
                "collection export not found; treating as empty"
            );
            return Ok(Vec::new());
        };

        let documents = if Self::is_array_export(&path, collection)? {
            Self::read_array(&path, collection, limit)?
        } else {
            Self::read_lines(&path, collection, limit)?
        };

        tracing::debug!(
            collection = collection.as_str(),
            documents = documents.len(),
            "read source collection"
        );
        Ok(documents)
    }

    fn count(&mut self, collection: Collection) -> Result<usize, SourceError> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(0);
        };
        if Self::is_array_export(&path, collection)? {
            Self::count_array(&path, collection)
        } else {
            Self::count_lines(&path, collection)
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
