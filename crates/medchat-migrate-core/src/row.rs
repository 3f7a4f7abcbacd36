//! Relational row shapes written to the target store, one struct per table.

use time::OffsetDateTime;

use crate::entity::EntityKind;
use crate::ids::TargetId;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AccountRole {
    Patient,
    Doctor,
    Admin,
}

impl AccountRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "patient" => Some(Self::Patient),
            "doctor" | "clinician" => Some(Self::Doctor),
            "admin" | "administrator" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ConversationStatus {
    Active,
    Closed,
    Archived,
}

impl ConversationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Archived => "archived",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MessageRole {
    User,
    Assistant,
    Doctor,
    System,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Doctor => "doctor",
            Self::System => "system",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "doctor" => Some(Self::Doctor),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: TargetId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: AccountRole,
    pub phone: Option<String>,
    pub date_of_birth: Option<OffsetDateTime>,
    pub gender: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub is_active: bool,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MedicalInfoRow {
    pub id: TargetId,
    pub user_id: TargetId,
    pub blood_type: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relationship: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllergyRow {
    pub id: TargetId,
    pub user_id: TargetId,
    pub name: String,
    pub severity: Option<String>,
    pub reaction: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MedicationRow {
    pub id: TargetId,
    pub user_id: TargetId,
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MedicalHistoryRow {
    pub id: TargetId,
    pub user_id: TargetId,
    pub condition: String,
    pub diagnosed_at: Option<OffsetDateTime>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: TargetId,
    pub patient_id: TargetId,
    pub doctor_id: Option<TargetId>,
    pub title: String,
    pub status: ConversationStatus,
    pub priority: Priority,
    pub ai_summary: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: TargetId,
    pub conversation_id: TargetId,
    pub sender_id: Option<TargetId>,
    pub role: MessageRole,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymptomRow {
    pub id: TargetId,
    pub conversation_id: TargetId,
    pub name: String,
    pub severity: Option<String>,
    pub duration: Option<String>,
    pub reported_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRow {
    pub id: TargetId,
    pub conversation_id: TargetId,
    pub file_name: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: Option<i64>,
    pub uploaded_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrescriptionRow {
    pub id: TargetId,
    pub conversation_id: TargetId,
    pub patient_id: TargetId,
    pub doctor_id: Option<TargetId>,
    pub medication: String,
    pub dosage: String,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
    pub prescribed_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogRow {
    pub id: TargetId,
    pub user_id: Option<TargetId>,
    pub action: String,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub details_json: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetRow {
    Account(UserRow),
    MedicalInfo(MedicalInfoRow),
    Allergy(AllergyRow),
    Medication(MedicationRow),
    MedicalHistory(MedicalHistoryRow),
    Conversation(ConversationRow),
    Message(MessageRow),
    Symptom(SymptomRow),
    Attachment(AttachmentRow),
    Prescription(PrescriptionRow),
    AuditLog(AuditLogRow),
}

impl TargetRow {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Account(_) => EntityKind::Account,
            Self::MedicalInfo(_) => EntityKind::MedicalInfo,
            Self::Allergy(_) => EntityKind::Allergy,
            Self::Medication(_) => EntityKind::Medication,
            Self::MedicalHistory(_) => EntityKind::MedicalHistory,
            Self::Conversation(_) => EntityKind::Conversation,
            Self::Message(_) => EntityKind::Message,
            Self::Symptom(_) => EntityKind::Symptom,
            Self::Attachment(_) => EntityKind::Attachment,
            Self::Prescription(_) => EntityKind::Prescription,
            Self::AuditLog(_) => EntityKind::AuditLog,
        }
    }

    #[must_use]
    pub fn as_conversation(&self) -> Option<&ConversationRow> {
        match self {
            Self::Conversation(row) => Some(row),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(&self) -> TargetId {
        match self {
            Self::Account(row) => row.id,
            Self::MedicalInfo(row) => row.id,
            Self::Allergy(row) => row.id,
            Self::Medication(row) => row.id,
            Self::MedicalHistory(row) => row.id,
            Self::Conversation(row) => row.id,
            Self::Message(row) => row.id,
            Self::Symptom(row) => row.id,
            Self::Attachment(row) => row.id,
            Self::Prescription(row) => row.id,
            Self::AuditLog(row) => row.id,
        }
    }
}
