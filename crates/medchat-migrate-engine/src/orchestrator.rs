//! Phase sequencing for one migration run.
//!
//! Phases run in a fixed order: accounts, then conversations, then audit logs.
//! Record failures never stop a phase or the run; only store acquisition can.

use std::fmt::{Display, Formatter};

use medchat_migrate_core::document::nested_records;
use medchat_migrate_core::transform::ConversationContext;
use medchat_migrate_core::{
    Collection, DocumentSource, EntityKind, MigrationStatistics,
    MigrationSummary, RecordError, SourceDocument, TargetStore, TransformError,
};
use serde::Serialize;
use serde_json::Value;

use crate::entities::{
    self, AccountLedger, AccountMigrator, AllergyMigrator, AttachmentMigrator, AuditLogMigrator,
    ConversationMigrator, MedicalHistoryMigrator, MedicalInfoMigrator, MedicationMigrator,
    MessageMigrator, PrescriptionMigrator, SymptomMigrator,
};
use crate::lifecycle::{FatalConnectionError, StoreConnector, StoreGuard};
use crate::migrator::{EntityMigrator, RecordFailure, RecordWriter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    ConnectingStores,
    MigratingAccounts,
    MigratingConversations,
    MigratingAuditLogs,
    ReportingSummary,
    Disconnected,
    Aborted,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Phase {
    Accounts,
    Conversations,
    AuditLogs,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Conversations => "conversations",
            Self::AuditLogs => "audit logs",
        }
    }

    /// Entity types written during this phase, parent first.
    #[must_use]
    pub fn entities(self) -> &'static [EntityKind] {
        match self {
            Self::Accounts => &[
                EntityKind::Account,
                EntityKind::MedicalInfo,
                EntityKind::Allergy,
                EntityKind::Medication,
                EntityKind::MedicalHistory,
            ],
            Self::Conversations => &[
                EntityKind::Conversation,
                EntityKind::Message,
                EntityKind::Symptom,
                EntityKind::Attachment,
                EntityKind::Prescription,
            ],
            Self::AuditLogs => &[EntityKind::AuditLog],
        }
    }

    fn state(self) -> RunState {
        match self {
            Self::Accounts => RunState::MigratingAccounts,
            Self::Conversations => RunState::MigratingConversations,
            Self::AuditLogs => RunState::MigratingAuditLogs,
        }
    }
}

/// Counters of one finished phase.
pub struct PhaseReport<'run> {
    pub phase: Phase,
    pub statistics: &'run MigrationStatistics,
}

impl Display for PhaseReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] complete:", self.phase.as_str())?;
        for (index, kind) in self.phase.entities().iter().enumerate() {
            let stats = self.statistics.get(*kind);
            let separator = if index == 0 { " " } else { "; " };
            write!(
                f,
                "{separator}{kind} {}/{} migrated, {} errors, {} skipped",
                stats.migrated, stats.total, stats.errors, stats.skipped
            )?;
        }
        Ok(())
    }
}

/// Hooks for console progress. Both default to doing nothing.
pub trait RunObserver {
    fn phase_completed(&mut self, _report: &PhaseReport<'_>) {}

    fn summary_ready(&mut self, _summary: &MigrationSummary) {}
}

impl RunObserver for () {}

pub struct Orchestrator {
    audit_log_limit: usize,
    stats: MigrationStatistics,
    ledger: AccountLedger,
    states: Vec<RunState>,
    warnings: Vec<String>,
    failures: Vec<RecordFailure>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(audit_log_limit: usize) -> Self {
        Self {
            audit_log_limit,
            stats: MigrationStatistics::new(),
            ledger: AccountLedger::default(),
            states: vec![RunState::NotStarted],
            warnings: Vec::new(),
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::NotStarted)
    }

    /// Every state entered so far, in order.
    #[must_use]
    pub fn states(&self) -> &[RunState] {
        &self.states
    }

    #[must_use]
    pub fn statistics(&self) -> &MigrationStatistics {
        &self.stats
    }

    #[must_use]
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Run-level conditions an operator should see next to the summary.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Every attempted record that did not migrate, in the order it was tried.
    #[must_use]
    pub fn failures(&self) -> &[RecordFailure] {
        &self.failures
    }

    #[must_use]
    pub fn audit_log_limit(&self) -> usize {
        self.audit_log_limit
    }

    /// Acquire both stores, run every phase, report, and release.
    ///
    /// # Errors
    /// Returns an error only when a store cannot be acquired; no phase runs then.
    pub fn run<C: StoreConnector>(
        &mut self,
        connector: &C,
        observer: &mut dyn RunObserver,
    ) -> Result<MigrationSummary, FatalConnectionError> {
        self.enter(RunState::ConnectingStores);
        let mut guard = match StoreGuard::acquire(connector) {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(error = %err, "aborting before any phase");
                self.enter(RunState::Aborted);
                return Err(err);
            }
        };

        if let Some((source, target)) = guard.stores() {
            self.run_phases(source, target, observer);
        }

        self.enter(RunState::ReportingSummary);
        let summary = self.stats.summarize();
        observer.summary_ready(&summary);

        for err in guard.release() {
            tracing::warn!(error = %err, "store release failed");
            self.warnings.push(err.to_string());
        }
        self.enter(RunState::Disconnected);
        Ok(summary)
    }

    /// Run the three phases against already-open stores.
    pub fn run_phases<S, T>(&mut self, source: &mut S, target: &mut T, observer: &mut dyn RunObserver)
    where
        S: DocumentSource,
        T: TargetStore,
    {
        for phase in [Phase::Accounts, Phase::Conversations, Phase::AuditLogs] {
            self.enter(phase.state());
            match phase {
                Phase::Accounts => self.migrate_accounts(source, target),
                Phase::Conversations => self.migrate_conversations(source, target),
                Phase::AuditLogs => self.migrate_audit_logs(source, target),
            }
            observer.phase_completed(&PhaseReport { phase, statistics: &self.stats });
        }
    }

    fn enter(&mut self, state: RunState) {
        tracing::info!(state = ?state, "run state");
        self.states.push(state);
    }

    fn read<S: DocumentSource>(
        &mut self,
        source: &mut S,
        collection: Collection,
        limit: Option<usize>,
    ) -> Vec<SourceDocument> {
        match source.read(collection, limit) {
            Ok(documents) => documents,
            Err(err) => {
                tracing::error!(collection = collection.as_str(), error = %err, "collection unreadable");
                self.warnings.push(err.to_string());
                Vec::new()
            }
        }
    }

    fn migrate_accounts<S: DocumentSource, T: TargetStore>(&mut self, source: &mut S, target: &mut T) {
        let documents = self.read(source, Collection::Users, None);
        let mut writer = RecordWriter::new(target, &mut self.stats);

        for document in documents {
            let position = document.position;
            let Some(raw) = accept(&mut writer, Collection::Users, document) else {
                continue;
            };
            let children = entities::account_children(&raw);

            let mut account = match AccountMigrator.decode(raw) {
                Ok(account) => account,
                Err(err) => {
                    writer.fail(EntityKind::Account, position, &err.into());
                    skip_all(&mut writer, &children);
                    continue;
                }
            };
            let Some(row) = writer.write(&AccountMigrator, &account, &(), position) else {
                skip_all(&mut writer, &children);
                continue;
            };
            self.ledger.record(row.id());

            let Some(info) = account.medical_info.take().filter(|info| !info.is_null()) else {
                continue;
            };
            if !entities::carries_medical_records(account.role.as_deref()) {
                tracing::debug!(account = %account.id, "ignoring medical info on non-patient account");
                continue;
            }

            writer.migrate(&MedicalInfoMigrator, info.clone(), &account.id, 0);
            writer.migrate_children(&AllergyMigrator, entities::allergies(&info), &account.id);
            writer.migrate_children(&MedicationMigrator, entities::medications(&info), &account.id);
            writer.migrate_children(
                &MedicalHistoryMigrator,
                entities::medical_history(&info),
                &account.id,
            );
        }
        self.failures.extend(writer.into_failures());
    }

    fn migrate_conversations<S: DocumentSource, T: TargetStore>(
        &mut self,
        source: &mut S,
        target: &mut T,
    ) {
        let documents = self.read(source, Collection::Conversations, None);
        let ledger = &self.ledger;
        let mut writer = RecordWriter::new(target, &mut self.stats);
        let conversations = ConversationMigrator { ledger };

        for document in documents {
            let position = document.position;
            let Some(raw) = accept(&mut writer, Collection::Conversations, document) else {
                continue;
            };
            let children = entities::conversation_children(&raw);

            let conversation = match conversations.decode(raw) {
                Ok(conversation) => conversation,
                Err(err) => {
                    writer.fail(EntityKind::Conversation, position, &err.into());
                    skip_all(&mut writer, &children);
                    continue;
                }
            };
            if let Some(patient) = conversation.patient.as_ref().filter(|id| !ledger.contains(id)) {
                tracing::warn!(
                    conversation = %conversation.id,
                    patient = %patient,
                    "patient account was not migrated; skipping conversation"
                );
                writer.skip(EntityKind::Conversation, 1);
                skip_all(&mut writer, &children);
                continue;
            }

            let Some(row) = writer.write(&conversations, &conversation, &(), position) else {
                skip_all(&mut writer, &children);
                continue;
            };
            let Some(context) =
                row.as_conversation().map(|row| ConversationContext::new(conversation.id, row))
            else {
                continue;
            };

            writer.migrate_children(
                &MessageMigrator { ledger },
                nested_records(conversation.messages.as_ref()),
                &context,
            );
            writer.migrate_children(
                &SymptomMigrator,
                nested_records(conversation.symptoms.as_ref()),
                &context,
            );
            writer.migrate_children(
                &AttachmentMigrator,
                nested_records(conversation.attachments.as_ref()),
                &context,
            );
            writer.migrate_children(
                &PrescriptionMigrator { ledger },
                nested_records(conversation.prescriptions.as_ref()),
                &context,
            );
        }
        self.failures.extend(writer.into_failures());
    }

    fn migrate_audit_logs<S: DocumentSource, T: TargetStore>(
        &mut self,
        source: &mut S,
        target: &mut T,
    ) {
        let limit = self.audit_log_limit;
        match source.count(Collection::AuditLogs) {
            Ok(available) if available > limit => {
                let left_behind = available - limit;
                tracing::warn!(limit, available, left_behind, "audit log ceiling reached");
                self.warnings.push(format!(
                    "audit log ceiling of {limit} reached; {left_behind} of {available} records were not migrated"
                ));
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "could not count audit logs"),
        }

        let documents = self.read(source, Collection::AuditLogs, Some(limit));
        let mut writer = RecordWriter::new(target, &mut self.stats);
        let audit_logs = AuditLogMigrator { ledger: &self.ledger };

        for document in documents {
            let position = document.position;
            if let Some(raw) = accept(&mut writer, Collection::AuditLogs, document) {
                writer.migrate(&audit_logs, raw, &(), position);
            }
        }
        self.failures.extend(writer.into_failures());
    }
}

/// Unparseable documents are failed records of their collection's entity type.
fn accept<T: TargetStore>(
    writer: &mut RecordWriter<'_, T>,
    collection: Collection,
    document: SourceDocument,
) -> Option<Value> {
    match document.body {
        Ok(raw) => Some(raw),
        Err(reason) => {
            let err = RecordError::from(TransformError::Malformed(reason));
            writer.fail(collection.entity(), document.position, &err);
            None
        }
    }
}

fn skip_all<T: TargetStore>(writer: &mut RecordWriter<'_, T>, children: &[(EntityKind, usize)]) {
    for (kind, count) in children {
        writer.skip(*kind, *count);
    }
}

#[cfg(test)]
mod tests {
    use medchat_migrate_core::{InsertError, SourceError, TargetRow};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct FixedSource {
        users: Vec<SourceDocument>,
        conversations: Vec<SourceDocument>,
        audit_logs: Vec<SourceDocument>,
    }

    impl DocumentSource for FixedSource {
        fn read(
            &mut self,
            collection: Collection,
            limit: Option<usize>,
        ) -> Result<Vec<SourceDocument>, SourceError> {
            let documents = match collection {
                Collection::Users => &self.users,
                Collection::Conversations => &self.conversations,
                Collection::AuditLogs => &self.audit_logs,
            };
            Ok(documents.iter().take(limit.unwrap_or(usize::MAX)).cloned().collect())
        }

        fn count(&mut self, collection: Collection) -> Result<usize, SourceError> {
            Ok(self.read(collection, None)?.len())
        }
    }

    #[derive(Default)]
    struct MemoryTarget {
        rows: Vec<TargetRow>,
    }

    impl TargetStore for MemoryTarget {
        fn insert(&mut self, row: &TargetRow) -> Result<(), InsertError> {
            if self.rows.iter().any(|existing| existing.id() == row.id()) {
                return Err(InsertError::new(row.kind(), "duplicate primary key"));
            }
            self.rows.push(row.clone());
            Ok(())
        }
    }

    fn account(id: &str, role: &str) -> Value {
        json!({
            "_id": {"$oid": id},
            "email": format!("{id}@example.com"),
            "password": "$2b$10$hash",
            "firstName": "Test",
            "lastName": "Account",
            "role": role,
            "createdAt": {"$date": "2024-01-01T00:00:00Z"},
            "medicalInfo": {"bloodType": "O+", "allergies": ["peanuts"]}
        })
    }

    #[test]
    fn phases_run_in_order_and_report_progress() {
        struct Recorder(Vec<String>);
        impl RunObserver for Recorder {
            fn phase_completed(&mut self, report: &PhaseReport<'_>) {
                self.0.push(report.to_string());
            }
        }

        let mut source = FixedSource {
            users: vec![SourceDocument::parsed(1, account("507f1f77bcf86cd799439011", "patient"))],
            ..Default::default()
        };
        let mut target = MemoryTarget::default();
        let mut orchestrator = Orchestrator::new(10);
        let mut recorder = Recorder(Vec::new());
        orchestrator.run_phases(&mut source, &mut target, &mut recorder);

        assert_eq!(
            orchestrator.states(),
            &[
                RunState::NotStarted,
                RunState::MigratingAccounts,
                RunState::MigratingConversations,
                RunState::MigratingAuditLogs,
            ]
        );
        assert_eq!(recorder.0.len(), 3);
        assert!(recorder.0[0].starts_with("[accounts] complete: account 1/1 migrated"));
        assert!(recorder.0[0].contains("allergy 1/1 migrated"));
        assert_eq!(target.rows.len(), 3);
    }

    #[test]
    fn non_patient_medical_info_is_ignored() {
        let mut source = FixedSource {
            users: vec![SourceDocument::parsed(1, account("507f1f77bcf86cd799439012", "doctor"))],
            ..Default::default()
        };
        let mut target = MemoryTarget::default();
        let mut orchestrator = Orchestrator::new(10);
        orchestrator.run_phases(&mut source, &mut target, &mut ());

        let stats = orchestrator.statistics();
        assert_eq!(stats.get(EntityKind::Account).migrated, 1);
        assert_eq!(stats.get(EntityKind::MedicalInfo).total, 0);
        assert_eq!(stats.get(EntityKind::Allergy).skipped, 0);
    }

    #[test]
    fn malformed_documents_count_against_their_collection() {
        let mut source = FixedSource {
            users: vec![SourceDocument::malformed(1, "eof")],
            audit_logs: vec![SourceDocument::malformed(7, "eof")],
            ..Default::default()
        };
        let mut target = MemoryTarget::default();
        let mut orchestrator = Orchestrator::new(10);
        orchestrator.run_phases(&mut source, &mut target, &mut ());

        assert_eq!(orchestrator.statistics().get(EntityKind::Account).errors, 1);
        assert_eq!(orchestrator.statistics().get(EntityKind::AuditLog).errors, 1);
        assert!(target.rows.is_empty());
        let located = orchestrator
            .failures()
            .iter()
            .map(|failure| (failure.entity, failure.position))
            .collect::<Vec<_>>();
        assert_eq!(located, vec![(EntityKind::Account, 1), (EntityKind::AuditLog, 7)]);
    }

    #[test]
    fn failures_carry_the_source_position() {
        let mut incomplete = account("507f1f77bcf86cd799439013", "patient");
        if let Some(fields) = incomplete.as_object_mut() {
            fields.remove("email");
        }
        // Line 2 of the export was blank.
        let mut source = FixedSource {
            users: vec![
                SourceDocument::parsed(1, account("507f1f77bcf86cd799439011", "doctor")),
                SourceDocument::parsed(3, incomplete),
            ],
            ..Default::default()
        };
        let mut target = MemoryTarget::default();
        let mut orchestrator = Orchestrator::new(10);
        orchestrator.run_phases(&mut source, &mut target, &mut ());

        let failures = orchestrator.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!((failures[0].entity, failures[0].position), (EntityKind::Account, 3));
        assert!(failures[0].error.contains("email"), "unexpected error: {}", failures[0].error);
    }

    #[test]
    fn audit_ceiling_truncates_and_warns() {
        let audit = |n: usize| {
            SourceDocument::parsed(n + 1, json!({
                "_id": format!("65a1b2c3d4e5f607182930{n:02}"),
                "action": "LOGIN",
                "timestamp": "2024-01-01T00:00:00Z"
            }))
        };
        let mut source =
            FixedSource { audit_logs: (0..5).map(audit).collect(), ..Default::default() };
        let mut target = MemoryTarget::default();
        let mut orchestrator = Orchestrator::new(3);
        orchestrator.run_phases(&mut source, &mut target, &mut ());

        let audit_stats = orchestrator.statistics().get(EntityKind::AuditLog);
        assert_eq!((audit_stats.total, audit_stats.migrated), (3, 3));
        assert_eq!(orchestrator.warnings().len(), 1);
        assert!(orchestrator.warnings()[0].contains("2 of 5"));
    }
}
