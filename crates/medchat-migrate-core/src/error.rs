use thiserror::Error;

use crate::entity::{Collection, EntityKind};

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum IdentifierError {
    #[error("identifier `{value}` has length {actual}; expected {expected}")]
    InvalidLength { expected: usize, actual: usize, value: String },
    #[error("identifier `{value}` is not hex: {reason}")]
    InvalidHex { value: String, reason: String },
    #[error("identifier `{0}` is not grouped 8-4-4-4-12")]
    InvalidGrouping(String),
}

/// A source record that cannot be mapped onto its target shape.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum TransformError {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    #[error("required field `{0}` is blank")]
    BlankField(&'static str),
    #[error("field `{field}` has unsupported value `{value}`")]
    InvalidValue { field: &'static str, value: String },
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error("nested record position {0} exceeds the derivable id range")]
    OrdinalOverflow(usize),
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// The target store refused a row.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
#[error("insert into {table} failed: {message}")]
pub struct InsertError {
    pub table: &'static str,
    pub message: String,
}

impl InsertError {
    #[must_use]
    pub fn new(kind: EntityKind, message: impl Into<String>) -> Self {
        Self { table: kind.table(), message: message.into() }
    }
}

/// Per-record failure, absorbed into the statistics of its entity type.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RecordError {
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Insert(#[from] InsertError),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read collection {collection}: {source}")]
    Read {
        collection: Collection,
        #[source]
        source: std::io::Error,
    },
    #[error("collection {collection} is not a valid JSON array export: {reason}")]
    ArrayExport { collection: Collection, reason: String },
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("source store: {0}")]
    Source(String),
    #[error("target store: {0}")]
    Target(String),
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
#[error("failed to release {store} store: {message}")]
pub struct ReleaseError {
    pub store: &'static str,
    pub message: String,
}
