//! Concrete migrators for every entity type, and the ledger of migrated accounts
//! that later phases consult for parent validity.

use std::collections::HashSet;

use medchat_migrate_core::document::{
    nested_records, AccountDoc, AllergyDoc, AttachmentDoc, AuditLogDoc, ConversationDoc,
    MedicalHistoryDoc, MedicalInfoDoc, MedicationDoc, MessageDoc, PrescriptionDoc, SymptomDoc,
};
use medchat_migrate_core::row::AccountRole;
use medchat_migrate_core::transform::{self, ConversationContext};
use medchat_migrate_core::{remap, EntityKind, SourceId, TargetId, TargetRow, TransformError};
use serde_json::Value;

use crate::migrator::EntityMigrator;

const MEDICAL_INFO_FIELD: &str = "medicalInfo";
const ALLERGIES_FIELD: &str = "allergies";
const MEDICATIONS_FIELD: &str = "medications";
const MEDICAL_HISTORY_FIELD: &str = "medicalHistory";

/// Target ids of the accounts that were actually inserted. Lookups still go
/// through [`remap`]; the ledger records outcomes, not identifier mappings.
#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    migrated: HashSet<TargetId>,
}

impl AccountLedger {
    pub fn record(&mut self, id: TargetId) {
        self.migrated.insert(id);
    }

    #[must_use]
    pub fn contains(&self, account: &SourceId) -> bool {
        self.migrated.contains(&remap(account))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.migrated.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrated.is_empty()
    }

    /// An optional account reference survives only when that account migrated;
    /// otherwise it is written as NULL so the referring record is kept.
    #[must_use]
    pub fn resolve(
        &self,
        account: Option<&SourceId>,
        entity: EntityKind,
        field: &'static str,
    ) -> Option<TargetId> {
        let account = account?;
        if self.contains(account) {
            return Some(remap(account));
        }
        tracing::warn!(
            entity = entity.as_str(),
            field,
            account = %account,
            "referenced account was not migrated; writing NULL"
        );
        None
    }
}

/// Medical records only belong to patients. Unknown roles are treated as patients
/// so a failed account still accounts for every child it carried.
#[must_use]
pub fn carries_medical_records(role: Option<&str>) -> bool {
    !matches!(role.and_then(AccountRole::parse), Some(AccountRole::Doctor | AccountRole::Admin))
}

/// The nested medical-info object of an account document, when there is one.
#[must_use]
pub fn medical_info(account: &Value) -> Option<&Value> {
    account.get(MEDICAL_INFO_FIELD).filter(|info| !info.is_null())
}

#[must_use]
pub fn allergies(info: &Value) -> Vec<Value> {
    nested_records(info.get(ALLERGIES_FIELD))
}

#[must_use]
pub fn medications(info: &Value) -> Vec<Value> {
    nested_records(info.get(MEDICATIONS_FIELD))
}

#[must_use]
pub fn medical_history(info: &Value) -> Vec<Value> {
    nested_records(info.get(MEDICAL_HISTORY_FIELD))
}

/// Every record nested under an account document, per entity type.
#[must_use]
pub fn account_children(account: &Value) -> [(EntityKind, usize); 4] {
    let role = account.get("role").and_then(Value::as_str);
    match medical_info(account).filter(|_| carries_medical_records(role)) {
        None => [
            (EntityKind::MedicalInfo, 0),
            (EntityKind::Allergy, 0),
            (EntityKind::Medication, 0),
            (EntityKind::MedicalHistory, 0),
        ],
        Some(info) => [
            (EntityKind::MedicalInfo, 1),
            (EntityKind::Allergy, allergies(info).len()),
            (EntityKind::Medication, medications(info).len()),
            (EntityKind::MedicalHistory, medical_history(info).len()),
        ],
    }
}

/// Every record nested under a conversation document, per entity type.
#[must_use]
pub fn conversation_children(conversation: &Value) -> [(EntityKind, usize); 4] {
    [
        (EntityKind::Message, "messages"),
        (EntityKind::Symptom, "symptoms"),
        (EntityKind::Attachment, "attachments"),
        (EntityKind::Prescription, "prescriptions"),
    ]
    .map(|(kind, field)| (kind, nested_records(conversation.get(field)).len()))
}

pub struct AccountMigrator;

impl EntityMigrator for AccountMigrator {
    type Source = AccountDoc;
    type Parent = ();

    fn kind(&self) -> EntityKind {
        EntityKind::Account
    }

    fn transform(&self, doc: &AccountDoc, (): &(), _: usize) -> Result<TargetRow, TransformError> {
        transform::account_row(doc).map(TargetRow::Account)
    }
}

pub struct MedicalInfoMigrator;

impl EntityMigrator for MedicalInfoMigrator {
    type Source = MedicalInfoDoc;
    type Parent = SourceId;

    fn kind(&self) -> EntityKind {
        EntityKind::MedicalInfo
    }

    fn transform(
        &self,
        doc: &MedicalInfoDoc,
        owner: &SourceId,
        _: usize,
    ) -> Result<TargetRow, TransformError> {
        transform::medical_info_row(doc, owner).map(TargetRow::MedicalInfo)
    }
}

pub struct AllergyMigrator;

impl EntityMigrator for AllergyMigrator {
    type Source = AllergyDoc;
    type Parent = SourceId;

    fn kind(&self) -> EntityKind {
        EntityKind::Allergy
    }

    fn bare_string_field(&self) -> Option<&'static str> {
        Some("name")
    }

    fn transform(
        &self,
        doc: &AllergyDoc,
        owner: &SourceId,
        position: usize,
    ) -> Result<TargetRow, TransformError> {
        transform::allergy_row(doc, owner, position).map(TargetRow::Allergy)
    }
}

pub struct MedicationMigrator;

impl EntityMigrator for MedicationMigrator {
    type Source = MedicationDoc;
    type Parent = SourceId;

    fn kind(&self) -> EntityKind {
        EntityKind::Medication
    }

    fn bare_string_field(&self) -> Option<&'static str> {
        Some("name")
    }

    fn transform(
        &self,
        doc: &MedicationDoc,
        owner: &SourceId,
        position: usize,
    ) -> Result<TargetRow, TransformError> {
        transform::medication_row(doc, owner, position).map(TargetRow::Medication)
    }
}

pub struct MedicalHistoryMigrator;

impl EntityMigrator for MedicalHistoryMigrator {
    type Source = MedicalHistoryDoc;
    type Parent = SourceId;

    fn kind(&self) -> EntityKind {
        EntityKind::MedicalHistory
    }

    fn bare_string_field(&self) -> Option<&'static str> {
        Some("condition")
    }

    fn transform(
        &self,
        doc: &MedicalHistoryDoc,
        owner: &SourceId,
        position: usize,
    ) -> Result<TargetRow, TransformError> {
        transform::medical_history_row(doc, owner, position).map(TargetRow::MedicalHistory)
    }
}

pub struct ConversationMigrator<'l> {
    pub ledger: &'l AccountLedger,
}

impl EntityMigrator for ConversationMigrator<'_> {
    type Source = ConversationDoc;
    type Parent = ();

    fn kind(&self) -> EntityKind {
        EntityKind::Conversation
    }

    fn transform(
        &self,
        doc: &ConversationDoc,
        (): &(),
        _: usize,
    ) -> Result<TargetRow, TransformError> {
        let doctor_id = self.ledger.resolve(doc.doctor.as_ref(), self.kind(), "doctor");
        transform::conversation_row(doc, doctor_id).map(TargetRow::Conversation)
    }
}

pub struct MessageMigrator<'l> {
    pub ledger: &'l AccountLedger,
}

impl EntityMigrator for MessageMigrator<'_> {
    type Source = MessageDoc;
    type Parent = ConversationContext;

    fn kind(&self) -> EntityKind {
        EntityKind::Message
    }

    fn transform(
        &self,
        doc: &MessageDoc,
        conversation: &ConversationContext,
        position: usize,
    ) -> Result<TargetRow, TransformError> {
        let sender_id = self.ledger.resolve(doc.sender.as_ref(), self.kind(), "sender");
        transform::message_row(doc, conversation, sender_id, position).map(TargetRow::Message)
    }
}

pub struct SymptomMigrator;

impl EntityMigrator for SymptomMigrator {
    type Source = SymptomDoc;
    type Parent = ConversationContext;

    fn kind(&self) -> EntityKind {
        EntityKind::Symptom
    }

    fn bare_string_field(&self) -> Option<&'static str> {
        Some("name")
    }

    fn transform(
        &self,
        doc: &SymptomDoc,
        conversation: &ConversationContext,
        position: usize,
    ) -> Result<TargetRow, TransformError> {
        transform::symptom_row(doc, conversation, position).map(TargetRow::Symptom)
    }
}

pub struct AttachmentMigrator;

impl EntityMigrator for AttachmentMigrator {
    type Source = AttachmentDoc;
    type Parent = ConversationContext;

    fn kind(&self) -> EntityKind {
        EntityKind::Attachment
    }

    fn transform(
        &self,
        doc: &AttachmentDoc,
        conversation: &ConversationContext,
        position: usize,
    ) -> Result<TargetRow, TransformError> {
        transform::attachment_row(doc, conversation, position).map(TargetRow::Attachment)
    }
}

pub struct PrescriptionMigrator<'l> {
    pub ledger: &'l AccountLedger,
}

impl EntityMigrator for PrescriptionMigrator<'_> {
    type Source = PrescriptionDoc;
    type Parent = ConversationContext;

    fn kind(&self) -> EntityKind {
        EntityKind::Prescription
    }

    /// Clinician: `prescribedBy` when it names a migrated account, then the
    /// conversation's doctor, then NULL.
    fn transform(
        &self,
        doc: &PrescriptionDoc,
        conversation: &ConversationContext,
        position: usize,
    ) -> Result<TargetRow, TransformError> {
        let doctor_id = self
            .ledger
            .resolve(doc.prescribed_by.as_ref(), self.kind(), "prescribedBy")
            .or(conversation.doctor_id);
        transform::prescription_row(doc, conversation, doctor_id, position)
            .map(TargetRow::Prescription)
    }
}

pub struct AuditLogMigrator<'l> {
    pub ledger: &'l AccountLedger,
}

impl EntityMigrator for AuditLogMigrator<'_> {
    type Source = AuditLogDoc;
    type Parent = ();

    fn kind(&self) -> EntityKind {
        EntityKind::AuditLog
    }

    fn transform(&self, doc: &AuditLogDoc, (): &(), _: usize) -> Result<TargetRow, TransformError> {
        let user_id = self.ledger.resolve(doc.user.as_ref(), self.kind(), "user");
        transform::audit_log_row(doc, user_id).map(TargetRow::AuditLog)
    }
}
