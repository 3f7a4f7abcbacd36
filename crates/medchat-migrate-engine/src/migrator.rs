//! One code path for every entity type: decode, transform, insert, count.

use medchat_migrate_core::document::lift_bare_string;
use medchat_migrate_core::{
    EntityKind, MigrationStatistics, Outcome, RecordError, TargetRow, TargetStore, TransformError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Maps one source shape onto one target row, given what its parent provides.
pub trait EntityMigrator {
    type Source: DeserializeOwned;
    type Parent: ?Sized;

    fn kind(&self) -> EntityKind;

    /// Field that a bare string list entry is lifted into, for list shapes that
    /// older documents stored as plain strings.
    fn bare_string_field(&self) -> Option<&'static str> {
        None
    }

    /// # Errors
    /// Returns an error when the record cannot be mapped onto its row.
    fn transform(
        &self,
        source: &Self::Source,
        parent: &Self::Parent,
        position: usize,
    ) -> Result<TargetRow, TransformError>;

    /// # Errors
    /// Returns an error when the document does not match the source shape.
    fn decode(&self, raw: Value) -> Result<Self::Source, TransformError> {
        let raw = match self.bare_string_field() {
            Some(field) => lift_bare_string(raw, field),
            None => raw,
        };
        Ok(serde_json::from_value(raw)?)
    }
}

/// An attempted record that did not migrate. `position` is the source line (or
/// array element) for top-level records and the index within the parent's list
/// for nested ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub entity: EntityKind,
    pub position: usize,
    pub error: String,
}

/// Writes rows and keeps the books. Every attempt ends in exactly one counter
/// increment; orphans are counted without an attempt.
pub struct RecordWriter<'run, T: TargetStore> {
    target: &'run mut T,
    stats: &'run mut MigrationStatistics,
    failures: Vec<RecordFailure>,
}

impl<'run, T: TargetStore> RecordWriter<'run, T> {
    pub fn new(target: &'run mut T, stats: &'run mut MigrationStatistics) -> Self {
        Self { target, stats, failures: Vec::new() }
    }

    #[must_use]
    pub fn into_failures(self) -> Vec<RecordFailure> {
        self.failures
    }

    /// Transform and insert one decoded record. Returns the inserted row.
    pub fn write<M: EntityMigrator>(
        &mut self,
        migrator: &M,
        source: &M::Source,
        parent: &M::Parent,
        position: usize,
    ) -> Option<TargetRow> {
        let attempt = migrator
            .transform(source, parent, position)
            .map_err(RecordError::from)
            .and_then(|row| match self.target.insert(&row) {
                Ok(()) => Ok(row),
                Err(err) => Err(RecordError::from(err)),
            });

        match attempt {
            Ok(row) => {
                self.stats.record(migrator.kind(), Outcome::Migrated);
                Some(row)
            }
            Err(err) => {
                self.fail(migrator.kind(), position, &err);
                None
            }
        }
    }

    /// Decode, transform, and insert one raw record.
    pub fn migrate<M: EntityMigrator>(
        &mut self,
        migrator: &M,
        raw: Value,
        parent: &M::Parent,
        position: usize,
    ) -> Option<TargetRow> {
        match migrator.decode(raw) {
            Ok(source) => self.write(migrator, &source, parent, position),
            Err(err) => {
                self.fail(migrator.kind(), position, &RecordError::from(err));
                None
            }
        }
    }

    /// Attempt every item of a nested list; returns how many were inserted.
    pub fn migrate_children<M: EntityMigrator>(
        &mut self,
        migrator: &M,
        items: Vec<Value>,
        parent: &M::Parent,
    ) -> usize {
        items
            .into_iter()
            .enumerate()
            .filter_map(|(position, raw)| self.migrate(migrator, raw, parent, position))
            .count()
    }

    pub fn fail(&mut self, kind: EntityKind, position: usize, err: &RecordError) {
        tracing::warn!(entity = kind.as_str(), position, error = %err, "record not migrated");
        self.stats.record(kind, Outcome::Failed);
        self.failures.push(RecordFailure { entity: kind, position, error: err.to_string() });
    }

    /// Children of a parent that did not migrate. Never attempted.
    pub fn skip(&mut self, kind: EntityKind, count: usize) {
        if count > 0 {
            tracing::debug!(entity = kind.as_str(), count, "skipping orphaned records");
        }
        self.stats.record_orphans(kind, count);
    }
}

#[cfg(test)]
mod tests {
    use medchat_migrate_core::row::AllergyRow;
    use medchat_migrate_core::{remap, InsertError, SourceId, TargetId};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct NamedDoc {
        name: String,
    }

    struct NamedAllergy;

    impl EntityMigrator for NamedAllergy {
        type Source = NamedDoc;
        type Parent = SourceId;

        fn kind(&self) -> EntityKind {
            EntityKind::Allergy
        }

        fn bare_string_field(&self) -> Option<&'static str> {
            Some("name")
        }

        fn transform(
            &self,
            source: &NamedDoc,
            parent: &SourceId,
            position: usize,
        ) -> Result<TargetRow, TransformError> {
            if source.name.is_empty() {
                return Err(TransformError::BlankField("name"));
            }
            let ordinal =
                u16::try_from(position).map_err(|_| TransformError::OrdinalOverflow(position))?;
            Ok(TargetRow::Allergy(AllergyRow {
                id: TargetId::derive_child(parent, EntityKind::Allergy, ordinal),
                user_id: remap(parent),
                name: source.name.clone(),
                severity: None,
                reaction: None,
            }))
        }
    }

    #[derive(Default)]
    struct RecordingTarget {
        rows: Vec<TargetRow>,
        reject_names: Vec<&'static str>,
    }

    impl TargetStore for RecordingTarget {
        fn insert(&mut self, row: &TargetRow) -> Result<(), InsertError> {
            if let TargetRow::Allergy(allergy) = row {
                if self.reject_names.contains(&allergy.name.as_str()) {
                    return Err(InsertError::new(row.kind(), "constraint failed"));
                }
            }
            self.rows.push(row.clone());
            Ok(())
        }
    }

    #[test]
    fn children_failures_are_isolated_and_counted() -> anyhow::Result<()> {
        let owner = SourceId::parse("507f1f77bcf86cd799439011")?;
        let mut target = RecordingTarget { reject_names: vec!["latex"], ..Default::default() };
        let mut stats = MigrationStatistics::new();

        let mut writer = RecordWriter::new(&mut target, &mut stats);
        let migrated = writer.migrate_children(
            &NamedAllergy,
            vec![
                json!("peanuts"),
                json!({"name": ""}),
                json!(42),
                json!("latex"),
                json!({"name": "dust"}),
            ],
            &owner,
        );
        let failed = writer
            .into_failures()
            .into_iter()
            .map(|failure| failure.position)
            .collect::<Vec<_>>();

        assert_eq!(migrated, 2);
        assert_eq!(failed, vec![1, 2, 3]);
        let allergy = stats.get(EntityKind::Allergy);
        assert_eq!((allergy.total, allergy.migrated, allergy.errors), (5, 2, 3));
        assert_eq!(target.rows.len(), 2);
        assert_eq!(target.rows[1].id().to_string(), "507f1f77-bcf8-6cd7-9943-901103000004");
        Ok(())
    }

    #[test]
    fn skip_counts_without_attempting() {
        let mut target = RecordingTarget::default();
        let mut stats = MigrationStatistics::new();
        let mut writer = RecordWriter::new(&mut target, &mut stats);
        writer.skip(EntityKind::Medication, 3);
        writer.skip(EntityKind::Medication, 0);

        let medication = stats.get(EntityKind::Medication);
        assert_eq!(medication.skipped, 3);
        assert_eq!(medication.total, 0);
        assert!(target.rows.is_empty());
    }
}
