//! Field mapping from source documents to target rows.
//!
//! Each function states its default policy in code: required fields fail the record
//! with [`TransformError`], optional text collapses blanks to `None` (NULL in the
//! target), and nested timestamps fall back to their conversation's creation time.
//! Cross-entity references arrive already resolved by the caller.

use serde_json::Value;
use time::OffsetDateTime;

use crate::document::{
    AccountDoc, AllergyDoc, AttachmentDoc, AuditLogDoc, ConversationDoc, DocumentTime,
    MedicalHistoryDoc, MedicalInfoDoc, MedicationDoc, MessageDoc, PrescriptionDoc, SymptomDoc,
};
use crate::entity::EntityKind;
use crate::error::TransformError;
use crate::ids::{remap, SourceId, TargetId};
use crate::row::{
    AccountRole, AllergyRow, AttachmentRow, AuditLogRow, ConversationRow, ConversationStatus,
    MedicalHistoryRow, MedicalInfoRow, MedicationRow, MessageRole, MessageRow, PrescriptionRow,
    Priority, SymptomRow, UserRow,
};

pub const DEFAULT_CONVERSATION_TITLE: &str = "Untitled conversation";
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MAX_ATTACHMENT_BYTES: f64 = 9.0e15;

/// What nested conversation records need to know about their parent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationContext {
    pub source_id: SourceId,
    pub id: TargetId,
    pub patient_id: TargetId,
    pub doctor_id: Option<TargetId>,
    pub created_at: OffsetDateTime,
}

impl ConversationContext {
    #[must_use]
    pub fn new(source_id: SourceId, row: &ConversationRow) -> Self {
        Self {
            source_id,
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            created_at: row.created_at,
        }
    }
}

fn required_text(value: Option<&String>, field: &'static str) -> Result<String, TransformError> {
    let value = value.ok_or(TransformError::MissingField(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TransformError::BlankField(field));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<&String>) -> Option<String> {
    value.map(|text| text.trim()).filter(|text| !text.is_empty()).map(str::to_string)
}

fn required_time(
    value: Option<DocumentTime>,
    field: &'static str,
) -> Result<OffsetDateTime, TransformError> {
    value.map(|DocumentTime(at)| at).ok_or(TransformError::MissingField(field))
}

fn optional_time(value: Option<DocumentTime>) -> Option<OffsetDateTime> {
    value.map(|DocumentTime(at)| at)
}

/// Nested records keep their own `_id` when they have one; otherwise the id is
/// derived from the parent and the record's position.
fn nested_id(
    explicit: Option<SourceId>,
    parent: &SourceId,
    kind: EntityKind,
    position: usize,
) -> Result<TargetId, TransformError> {
    if let Some(own) = explicit {
        return Ok(remap(&own));
    }
    let ordinal = u16::try_from(position).map_err(|_| TransformError::OrdinalOverflow(position))?;
    Ok(TargetId::derive_child(parent, kind, ordinal))
}

fn parse_enum<T>(
    value: Option<&String>,
    field: &'static str,
    default: Option<T>,
    parse: fn(&str) -> Option<T>,
) -> Result<T, TransformError> {
    match optional_text(value) {
        None => default.ok_or(TransformError::MissingField(field)),
        Some(text) => parse(&text).ok_or(TransformError::InvalidValue { field, value: text }),
    }
}

/// # Errors
/// Returns an error when email, password, names, role, or `createdAt` is missing or invalid.
pub fn account_row(doc: &AccountDoc) -> Result<UserRow, TransformError> {
    let email = required_text(doc.email.as_ref(), "email")?.to_ascii_lowercase();
    if !email.contains('@') {
        return Err(TransformError::InvalidValue { field: "email", value: email });
    }
    let created_at = required_time(doc.created_at, "createdAt")?;

    Ok(UserRow {
        id: remap(&doc.id),
        email,
        password_hash: required_text(doc.password.as_ref(), "password")?,
        first_name: required_text(doc.first_name.as_ref(), "firstName")?,
        last_name: required_text(doc.last_name.as_ref(), "lastName")?,
        role: parse_enum(doc.role.as_ref(), "role", None, AccountRole::parse)?,
        phone: optional_text(doc.phone.as_ref()),
        date_of_birth: optional_time(doc.date_of_birth),
        gender: optional_text(doc.gender.as_ref()),
        specialization: optional_text(doc.specialization.as_ref()),
        license_number: optional_text(doc.license_number.as_ref()),
        is_active: doc.is_active.unwrap_or(true),
        last_login: optional_time(doc.last_login),
        created_at,
        updated_at: optional_time(doc.updated_at).unwrap_or(created_at),
    })
}

/// # Errors
/// Returns an error when height or weight is negative.
pub fn medical_info_row(
    doc: &MedicalInfoDoc,
    owner: &SourceId,
) -> Result<MedicalInfoRow, TransformError> {
    for (field, measure) in [("height", doc.height), ("weight", doc.weight)] {
        if let Some(value) = measure.filter(|value| *value < 0.0) {
            return Err(TransformError::InvalidValue { field, value: value.to_string() });
        }
    }
    let contact = doc.emergency_contact.as_ref();

    Ok(MedicalInfoRow {
        id: TargetId::derive_child(owner, EntityKind::MedicalInfo, 0),
        user_id: remap(owner),
        blood_type: optional_text(doc.blood_type.as_ref()),
        height_cm: doc.height,
        weight_kg: doc.weight,
        emergency_contact_name: contact.and_then(|c| optional_text(c.name.as_ref())),
        emergency_contact_phone: contact.and_then(|c| optional_text(c.phone.as_ref())),
        emergency_contact_relationship: contact
            .and_then(|c| optional_text(c.relationship.as_ref())),
    })
}

/// # Errors
/// Returns an error when the allergy has no name.
pub fn allergy_row(
    doc: &AllergyDoc,
    owner: &SourceId,
    position: usize,
) -> Result<AllergyRow, TransformError> {
    Ok(AllergyRow {
        id: nested_id(doc.id, owner, EntityKind::Allergy, position)?,
        user_id: remap(owner),
        name: required_text(doc.name.as_ref(), "name")?,
        severity: optional_text(doc.severity.as_ref()),
        reaction: optional_text(doc.reaction.as_ref()),
    })
}

/// # Errors
/// Returns an error when the medication has no name.
pub fn medication_row(
    doc: &MedicationDoc,
    owner: &SourceId,
    position: usize,
) -> Result<MedicationRow, TransformError> {
    Ok(MedicationRow {
        id: nested_id(doc.id, owner, EntityKind::Medication, position)?,
        user_id: remap(owner),
        name: required_text(doc.name.as_ref(), "name")?,
        dosage: optional_text(doc.dosage.as_ref()),
        frequency: optional_text(doc.frequency.as_ref()),
        start_date: optional_time(doc.start_date),
    })
}

/// # Errors
/// Returns an error when the history entry has no condition.
pub fn medical_history_row(
    doc: &MedicalHistoryDoc,
    owner: &SourceId,
    position: usize,
) -> Result<MedicalHistoryRow, TransformError> {
    Ok(MedicalHistoryRow {
        id: nested_id(doc.id, owner, EntityKind::MedicalHistory, position)?,
        user_id: remap(owner),
        condition: required_text(doc.condition.as_ref(), "condition")?,
        diagnosed_at: optional_time(doc.diagnosed_date),
        notes: optional_text(doc.notes.as_ref()),
    })
}

/// # Errors
/// Returns an error when the patient or `createdAt` is missing, or status/priority is unknown.
pub fn conversation_row(
    doc: &ConversationDoc,
    doctor_id: Option<TargetId>,
) -> Result<ConversationRow, TransformError> {
    let patient = doc.patient.as_ref().ok_or(TransformError::MissingField("patient"))?;
    let created_at = required_time(doc.created_at, "createdAt")?;

    Ok(ConversationRow {
        id: remap(&doc.id),
        patient_id: remap(patient),
        doctor_id,
        title: optional_text(doc.title.as_ref())
            .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string()),
        status: parse_enum(
            doc.status.as_ref(),
            "status",
            Some(ConversationStatus::Active),
            ConversationStatus::parse,
        )?,
        priority: parse_enum(doc.priority.as_ref(), "priority", Some(Priority::Normal), Priority::parse)?,
        ai_summary: optional_text(doc.ai_summary.as_ref()),
        created_at,
        updated_at: optional_time(doc.updated_at).unwrap_or(created_at),
    })
}

/// # Errors
/// Returns an error when the message has no content or no recognizable role.
pub fn message_row(
    doc: &MessageDoc,
    conversation: &ConversationContext,
    sender_id: Option<TargetId>,
    position: usize,
) -> Result<MessageRow, TransformError> {
    // Message bodies keep their whitespace; only emptiness is rejected.
    let content = doc.content.clone().ok_or(TransformError::MissingField("content"))?;
    if content.trim().is_empty() {
        return Err(TransformError::BlankField("content"));
    }

    Ok(MessageRow {
        id: nested_id(doc.id, &conversation.source_id, EntityKind::Message, position)?,
        conversation_id: conversation.id,
        sender_id,
        role: parse_enum(doc.role.as_ref(), "role", None, MessageRole::parse)?,
        content,
        created_at: optional_time(doc.timestamp).unwrap_or(conversation.created_at),
    })
}

/// # Errors
/// Returns an error when the symptom has no name.
pub fn symptom_row(
    doc: &SymptomDoc,
    conversation: &ConversationContext,
    position: usize,
) -> Result<SymptomRow, TransformError> {
    Ok(SymptomRow {
        id: nested_id(doc.id, &conversation.source_id, EntityKind::Symptom, position)?,
        conversation_id: conversation.id,
        name: required_text(doc.name.as_ref(), "name")?,
        severity: optional_text(doc.severity.as_ref()),
        duration: optional_text(doc.duration.as_ref()),
        reported_at: optional_time(doc.reported_at).unwrap_or(conversation.created_at),
    })
}

/// # Errors
/// Returns an error when filename or url is missing, or the size is not a byte count.
pub fn attachment_row(
    doc: &AttachmentDoc,
    conversation: &ConversationContext,
    position: usize,
) -> Result<AttachmentRow, TransformError> {
    let size_bytes = match doc.size {
        None => None,
        Some(size) if size.fract() == 0.0 && (0.0..=MAX_ATTACHMENT_BYTES).contains(&size) => {
            #[allow(clippy::cast_possible_truncation)]
            let bytes = size as i64;
            Some(bytes)
        }
        Some(size) => {
            return Err(TransformError::InvalidValue { field: "size", value: size.to_string() });
        }
    };

    Ok(AttachmentRow {
        id: nested_id(doc.id, &conversation.source_id, EntityKind::Attachment, position)?,
        conversation_id: conversation.id,
        file_name: required_text(doc.filename.as_ref(), "filename")?,
        url: required_text(doc.url.as_ref(), "url")?,
        mime_type: optional_text(doc.mime_type.as_ref())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        size_bytes,
        uploaded_at: optional_time(doc.uploaded_at).unwrap_or(conversation.created_at),
    })
}

/// The prescribing clinician is resolved by the caller. A prescription never
/// borrows the patient's id for a missing clinician; the column stays NULL.
///
/// # Errors
/// Returns an error when medication or dosage is missing.
pub fn prescription_row(
    doc: &PrescriptionDoc,
    conversation: &ConversationContext,
    doctor_id: Option<TargetId>,
    position: usize,
) -> Result<PrescriptionRow, TransformError> {
    Ok(PrescriptionRow {
        id: nested_id(doc.id, &conversation.source_id, EntityKind::Prescription, position)?,
        conversation_id: conversation.id,
        patient_id: conversation.patient_id,
        doctor_id,
        medication: required_text(doc.medication.as_ref(), "medication")?,
        dosage: required_text(doc.dosage.as_ref(), "dosage")?,
        frequency: optional_text(doc.frequency.as_ref()),
        duration: optional_text(doc.duration.as_ref()),
        instructions: optional_text(doc.instructions.as_ref()),
        prescribed_at: optional_time(doc.prescribed_at).unwrap_or(conversation.created_at),
    })
}

/// # Errors
/// Returns an error when the action or both timestamps are missing.
pub fn audit_log_row(
    doc: &AuditLogDoc,
    user_id: Option<TargetId>,
) -> Result<AuditLogRow, TransformError> {
    let details_json = match &doc.details {
        None | Some(Value::Null) => None,
        Some(details) => Some(serde_json::to_string(details)?),
    };

    Ok(AuditLogRow {
        id: remap(&doc.id),
        user_id,
        action: required_text(doc.action.as_ref(), "action")?,
        resource: optional_text(doc.resource.as_ref()),
        resource_id: optional_text(doc.resource_id.as_ref()),
        details_json,
        ip_address: optional_text(doc.ip_address.as_ref()),
        user_agent: optional_text(doc.user_agent.as_ref()),
        created_at: required_time(doc.timestamp.or(doc.created_at), "timestamp")?,
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use super::*;

    const PATIENT: &str = "507f1f77bcf86cd799439011";
    const DOCTOR: &str = "507f1f77bcf86cd799439022";
    const CONVERSATION: &str = "65a1b2c3d4e5f60718293a4b";

    fn account(overrides: &Value) -> Result<AccountDoc> {
        let mut doc = json!({
            "_id": {"$oid": PATIENT},
            "email": "  Pat@Example.com ",
            "password": "$2b$10$hash",
            "firstName": "Pat",
            "lastName": "Doe",
            "role": "patient",
            "createdAt": {"$date": "2024-01-01T00:00:00Z"}
        });
        if let (Some(base), Some(extra)) = (doc.as_object_mut(), overrides.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        Ok(serde_json::from_value(doc)?)
    }

    fn conversation_context() -> Result<ConversationContext> {
        let doc: ConversationDoc = serde_json::from_value(json!({
            "_id": CONVERSATION,
            "patient": PATIENT,
            "createdAt": "2024-02-01T10:00:00Z"
        }))?;
        let row = conversation_row(&doc, None)?;
        Ok(ConversationContext::new(doc.id, &row))
    }

    #[test]
    fn account_row_applies_explicit_defaults() -> Result<()> {
        let row = account_row(&account(&json!({"phone": "   "}))?)?;
        assert_eq!(row.id.to_string(), "507f1f77-bcf8-6cd7-9943-901100000000");
        assert_eq!(row.email, "pat@example.com");
        assert_eq!(row.role, AccountRole::Patient);
        assert_eq!(row.phone, None);
        assert!(row.is_active);
        assert_eq!(row.updated_at, row.created_at);
        Ok(())
    }

    #[test]
    fn account_row_reports_missing_required_field() -> Result<()> {
        let doc = account(&json!({"email": null}))?;
        assert_eq!(account_row(&doc), Err(TransformError::MissingField("email")));

        let doc = account(&json!({"firstName": ""}))?;
        assert_eq!(account_row(&doc), Err(TransformError::BlankField("firstName")));
        Ok(())
    }

    #[test]
    fn account_row_rejects_unknown_role_and_accepts_aliases() -> Result<()> {
        let doc = account(&json!({"role": "nurse"}))?;
        assert!(matches!(
            account_row(&doc),
            Err(TransformError::InvalidValue { field: "role", .. })
        ));

        let doc = account(&json!({"role": "Clinician"}))?;
        assert_eq!(account_row(&doc)?.role, AccountRole::Doctor);
        Ok(())
    }

    #[test]
    fn allergy_row_foreign_key_is_remapped_owner() -> Result<()> {
        let owner = SourceId::parse(PATIENT)?;
        let doc: AllergyDoc = serde_json::from_value(json!({"name": "Penicillin"}))?;
        let row = allergy_row(&doc, &owner, 2)?;
        assert_eq!(row.user_id, remap(&owner));
        assert_eq!(row.id, TargetId::derive_child(&owner, EntityKind::Allergy, 2));
        assert_eq!(row.severity, None);
        Ok(())
    }

    #[test]
    fn nested_record_keeps_its_own_id() -> Result<()> {
        let owner = SourceId::parse(PATIENT)?;
        let doc: MedicationDoc = serde_json::from_value(json!({
            "_id": {"$oid": "65a1b2c3d4e5f60718290001"},
            "name": "Metformin",
            "dosage": 500
        }))?;
        let row = medication_row(&doc, &owner, 0)?;
        assert_eq!(row.id, remap_str_ok("65a1b2c3d4e5f60718290001")?);
        assert_eq!(row.dosage.as_deref(), Some("500"));
        Ok(())
    }

    fn remap_str_ok(raw: &str) -> Result<TargetId> {
        Ok(crate::ids::remap_str(raw)?)
    }

    #[test]
    fn nested_position_beyond_u16_is_rejected() -> Result<()> {
        let owner = SourceId::parse(PATIENT)?;
        let doc: MedicalHistoryDoc = serde_json::from_value(json!({"condition": "Asthma"}))?;
        assert_eq!(
            medical_history_row(&doc, &owner, 70_000),
            Err(TransformError::OrdinalOverflow(70_000))
        );
        Ok(())
    }

    #[test]
    fn conversation_row_defaults_title_status_and_priority() -> Result<()> {
        let doc: ConversationDoc = serde_json::from_value(json!({
            "_id": CONVERSATION,
            "patient": {"$oid": PATIENT},
            "title": "",
            "createdAt": "2024-02-01T10:00:00Z"
        }))?;
        let row = conversation_row(&doc, None)?;
        assert_eq!(row.title, DEFAULT_CONVERSATION_TITLE);
        assert_eq!(row.status, ConversationStatus::Active);
        assert_eq!(row.priority, Priority::Normal);
        assert_eq!(row.patient_id, remap(&SourceId::parse(PATIENT)?));
        Ok(())
    }

    #[test]
    fn conversation_row_rejects_undocumented_status_and_priority() -> Result<()> {
        for (field, value) in [("status", "resolved"), ("priority", "critical")] {
            let mut body = json!({
                "_id": CONVERSATION,
                "patient": {"$oid": PATIENT},
                "createdAt": "2024-02-01T10:00:00Z"
            });
            body[field] = json!(value);
            let doc: ConversationDoc = serde_json::from_value(body)?;
            assert!(
                matches!(
                    conversation_row(&doc, None),
                    Err(TransformError::InvalidValue { field: rejected, .. }) if rejected == field
                ),
                "expected {field} `{value}` to be rejected"
            );
        }
        Ok(())
    }

    #[test]
    fn conversation_row_requires_patient() -> Result<()> {
        let doc: ConversationDoc = serde_json::from_value(json!({
            "_id": CONVERSATION,
            "createdAt": "2024-02-01T10:00:00Z"
        }))?;
        assert_eq!(conversation_row(&doc, None), Err(TransformError::MissingField("patient")));
        Ok(())
    }

    #[test]
    fn message_row_falls_back_to_conversation_time() -> Result<()> {
        let context = conversation_context()?;
        let doc: MessageDoc =
            serde_json::from_value(json!({"role": "Assistant", "content": "  Drink water.  "}))?;
        let row = message_row(&doc, &context, None, 0)?;
        assert_eq!(row.role, MessageRole::Assistant);
        assert_eq!(row.content, "  Drink water.  ");
        assert_eq!(row.created_at, context.created_at);
        Ok(())
    }

    #[test]
    fn prescription_without_clinician_leaves_doctor_null() -> Result<()> {
        let context = conversation_context()?;
        let doc: PrescriptionDoc =
            serde_json::from_value(json!({"medication": "Amoxicillin", "dosage": "250mg"}))?;
        let row = prescription_row(&doc, &context, None, 0)?;
        assert_eq!(row.patient_id, context.patient_id);
        assert_eq!(row.doctor_id, None);

        let doctor = remap(&SourceId::parse(DOCTOR)?);
        let row = prescription_row(&doc, &context, Some(doctor), 1)?;
        assert_eq!(row.doctor_id, Some(doctor));
        Ok(())
    }

    #[test]
    fn attachment_rejects_fractional_size_and_defaults_mime() -> Result<()> {
        let context = conversation_context()?;
        let doc: AttachmentDoc = serde_json::from_value(
            json!({"fileName": "scan.pdf", "url": "https://files/scan.pdf", "size": 1024}),
        )?;
        let row = attachment_row(&doc, &context, 0)?;
        assert_eq!(row.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(row.size_bytes, Some(1024));

        let doc: AttachmentDoc = serde_json::from_value(
            json!({"filename": "scan.pdf", "url": "https://files/scan.pdf", "size": 10.5}),
        )?;
        assert!(matches!(
            attachment_row(&doc, &context, 0),
            Err(TransformError::InvalidValue { field: "size", .. })
        ));
        Ok(())
    }

    #[test]
    fn audit_log_row_uses_created_at_alias_and_serializes_details() -> Result<()> {
        let doc: AuditLogDoc = serde_json::from_value(json!({
            "_id": CONVERSATION,
            "action": "VIEW_RECORD",
            "details": {"field": "allergies"},
            "createdAt": "2024-03-01T00:00:00Z"
        }))?;
        let row = audit_log_row(&doc, None)?;
        assert_eq!(row.details_json.as_deref(), Some(r#"{"field":"allergies"}"#));
        assert_eq!(row.user_id, None);

        let doc: AuditLogDoc =
            serde_json::from_value(json!({"_id": CONVERSATION, "action": "LOGIN"}))?;
        assert_eq!(audit_log_row(&doc, None), Err(TransformError::MissingField("timestamp")));
        Ok(())
    }

    #[test]
    fn medical_info_rejects_negative_measurements() -> Result<()> {
        let owner = SourceId::parse(PATIENT)?;
        let doc: MedicalInfoDoc = serde_json::from_value(json!({"height": -170}))?;
        assert!(matches!(
            medical_info_row(&doc, &owner),
            Err(TransformError::InvalidValue { field: "height", .. })
        ));

        let doc: MedicalInfoDoc = serde_json::from_value(json!({
            "bloodType": "O+",
            "emergencyContact": {"name": "Sam", "phone": "555-0100"}
        }))?;
        let row = medical_info_row(&doc, &owner)?;
        assert_eq!(row.user_id, remap(&owner));
        assert_eq!(row.emergency_contact_relationship, None);
        Ok(())
    }
}
