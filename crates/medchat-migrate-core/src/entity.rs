use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Every entity type the migration writes, in insert order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    MedicalInfo,
    Allergy,
    Medication,
    MedicalHistory,
    Conversation,
    Message,
    Symptom,
    Attachment,
    Prescription,
    AuditLog,
}

impl EntityKind {
    pub const ALL: [Self; 11] = [
        Self::Account,
        Self::MedicalInfo,
        Self::Allergy,
        Self::Medication,
        Self::MedicalHistory,
        Self::Conversation,
        Self::Message,
        Self::Symptom,
        Self::Attachment,
        Self::Prescription,
        Self::AuditLog,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::MedicalInfo => "medical_info",
            Self::Allergy => "allergy",
            Self::Medication => "medication",
            Self::MedicalHistory => "medical_history",
            Self::Conversation => "conversation",
            Self::Message => "message",
            Self::Symptom => "symptom",
            Self::Attachment => "attachment",
            Self::Prescription => "prescription",
            Self::AuditLog => "audit_log",
        }
    }

    /// Target table that receives rows of this kind.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::Account => "users",
            Self::MedicalInfo => "medical_info",
            Self::Allergy => "allergies",
            Self::Medication => "medications",
            Self::MedicalHistory => "medical_history",
            Self::Conversation => "conversations",
            Self::Message => "messages",
            Self::Symptom => "symptoms",
            Self::Attachment => "attachments",
            Self::Prescription => "prescriptions",
            Self::AuditLog => "audit_logs",
        }
    }

    /// Nonzero discriminator embedded in derived child identifiers.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Account => 1,
            Self::MedicalInfo => 2,
            Self::Allergy => 3,
            Self::Medication => 4,
            Self::MedicalHistory => 5,
            Self::Conversation => 6,
            Self::Message => 7,
            Self::Symptom => 8,
            Self::Attachment => 9,
            Self::Prescription => 10,
            Self::AuditLog => 11,
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source collections, one per top-level entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Conversations,
    AuditLogs,
}

impl Collection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Conversations => "conversations",
            Self::AuditLogs => "auditlogs",
        }
    }

    /// Entity kind charged when a document in this collection cannot be decoded.
    #[must_use]
    pub fn entity(self) -> EntityKind {
        match self {
            Self::Users => EntityKind::Account,
            Self::Conversations => EntityKind::Conversation,
            Self::AuditLogs => EntityKind::AuditLog,
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn tags_are_unique_and_nonzero() {
        let tags = EntityKind::ALL.iter().map(|kind| kind.tag()).collect::<BTreeSet<_>>();
        assert_eq!(tags.len(), EntityKind::ALL.len());
        assert!(!tags.contains(&0));
    }

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("unknown"), None);
    }
}
