//! Shared model for moving the chat application's document store into its
//! relational store: identifiers, document and row shapes, field transforms,
//! statistics, and the store traits the engine drives.

pub mod document;
pub mod entity;
pub mod error;
pub mod ids;
pub mod row;
pub mod stats;
pub mod store;
pub mod transform;

pub use entity::{Collection, EntityKind};
pub use error::{
    ConnectError, IdentifierError, InsertError, RecordError, ReleaseError, SourceError,
    TransformError,
};
pub use ids::{remap, remap_str, SourceId, TargetId};
pub use row::TargetRow;
pub use stats::{EntityStats, MigrationStatistics, MigrationSummary, Outcome};
pub use store::{DocumentSource, SourceDocument, TargetStore};
