//! Seams between the migration engine and the two stores.

use serde_json::Value;

use crate::entity::Collection;
use crate::error::{InsertError, ReleaseError, SourceError};
use crate::row::TargetRow;

/// One document as read from the source, tagged with where it was found: the
/// export line for line-delimited collections, the element index for arrays.
/// A body that is not even JSON is charged as a failed record of the
/// collection's entity type rather than aborting the read.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub position: usize,
    pub body: Result<Value, String>,
}

impl SourceDocument {
    #[must_use]
    pub fn parsed(position: usize, value: Value) -> Self {
        Self { position, body: Ok(value) }
    }

    #[must_use]
    pub fn malformed(position: usize, reason: impl Into<String>) -> Self {
        Self { position, body: Err(reason.into()) }
    }
}

/// Read-only access to the document store.
pub trait DocumentSource {
    /// Read up to `limit` documents of a collection in natural order.
    ///
    /// # Errors
    /// Returns an error when the collection cannot be read at all.
    fn read(
        &mut self,
        collection: Collection,
        limit: Option<usize>,
    ) -> Result<Vec<SourceDocument>, SourceError>;

    /// # Errors
    /// Returns an error when the collection cannot be read at all.
    fn count(&mut self, collection: Collection) -> Result<usize, SourceError>;

    /// # Errors
    /// Returns an error when the store reports a failure while closing.
    fn release(self) -> Result<(), ReleaseError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Write-once access to the relational store. One call, one insert attempt.
pub trait TargetStore {
    /// # Errors
    /// Returns an error when the store rejects the row.
    fn insert(&mut self, row: &TargetRow) -> Result<(), InsertError>;

    /// # Errors
    /// Returns an error when the store reports a failure while closing.
    fn release(self) -> Result<(), ReleaseError>
    where
        Self: Sized,
    {
        Ok(())
    }
}
