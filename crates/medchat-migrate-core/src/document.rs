//! Source document shapes as the document store's exporter writes them.
//!
//! Only the identifier is required at decode time. Every other field is optional
//! here so that the transform step can apply an explicit default or report the
//! exact missing field.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::OffsetDateTime;

use crate::ids::SourceId;

/// A timestamp in any of the exporter's encodings.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct DocumentTime(pub OffsetDateTime);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Extended {
        #[serde(rename = "$date")]
        date: RawDateValue,
    },
    Text(String),
    Millis(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDateValue {
    Long {
        #[serde(rename = "$numberLong")]
        value: String,
    },
    Text(String),
    Millis(i64),
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| format!("invalid RFC3339 timestamp `{value}`: {err}"))
}

fn from_millis(millis: i64) -> Result<OffsetDateTime, String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| format!("timestamp {millis}ms out of range: {err}"))
}

impl<'de> Deserialize<'de> for DocumentTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parsed = match RawDate::deserialize(deserializer)? {
            RawDate::Text(text) | RawDate::Extended { date: RawDateValue::Text(text) } => {
                parse_rfc3339(&text)
            }
            RawDate::Millis(millis) | RawDate::Extended { date: RawDateValue::Millis(millis) } => {
                from_millis(millis)
            }
            RawDate::Extended { date: RawDateValue::Long { value } } => value
                .parse::<i64>()
                .map_err(|err| format!("invalid $numberLong `{value}`: {err}"))
                .and_then(from_millis),
        };
        parsed.map(Self).map_err(serde::de::Error::custom)
    }
}

/// Accept strings, numbers, booleans, and `{"$oid": ..}` wrappers as free text.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        Some(Value::Object(map)) => match map.get("$oid") {
            Some(Value::String(oid)) => Some(oid.clone()),
            _ => return Err(serde::de::Error::custom("expected text, found object")),
        },
        Some(Value::Array(_)) => {
            return Err(serde::de::Error::custom("expected text, found array"));
        }
    })
}

/// Accept numbers and numeric strings.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("number {number} is not finite"))),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|err| serde::de::Error::custom(format!("invalid number `{text}`: {err}"))),
        Some(other) => Err(serde::de::Error::custom(format!("expected number, found {other}"))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDoc {
    #[serde(rename = "_id")]
    pub id: SourceId,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub phone: Option<String>,
    pub date_of_birth: Option<DocumentTime>,
    pub gender: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub is_active: Option<bool>,
    pub last_login: Option<DocumentTime>,
    pub created_at: Option<DocumentTime>,
    pub updated_at: Option<DocumentTime>,
    /// Decoded separately so a bad nested record cannot fail its account.
    pub medical_info: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContactDoc {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub phone: Option<String>,
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalInfoDoc {
    pub blood_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight: Option<f64>,
    pub emergency_contact: Option<EmergencyContactDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergyDoc {
    #[serde(rename = "_id")]
    pub id: Option<SourceId>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity: Option<String>,
    pub reaction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDoc {
    #[serde(rename = "_id")]
    pub id: Option<SourceId>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: Option<DocumentTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalHistoryDoc {
    #[serde(rename = "_id")]
    pub id: Option<SourceId>,
    pub condition: Option<String>,
    pub diagnosed_date: Option<DocumentTime>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDoc {
    #[serde(rename = "_id")]
    pub id: SourceId,
    pub patient: Option<SourceId>,
    pub doctor: Option<SourceId>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub ai_summary: Option<String>,
    pub created_at: Option<DocumentTime>,
    pub updated_at: Option<DocumentTime>,
    pub messages: Option<Value>,
    pub symptoms: Option<Value>,
    pub attachments: Option<Value>,
    pub prescriptions: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDoc {
    #[serde(rename = "_id")]
    pub id: Option<SourceId>,
    pub sender: Option<SourceId>,
    pub role: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<DocumentTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomDoc {
    #[serde(rename = "_id")]
    pub id: Option<SourceId>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub duration: Option<String>,
    pub reported_at: Option<DocumentTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDoc {
    #[serde(rename = "_id")]
    pub id: Option<SourceId>,
    #[serde(alias = "fileName")]
    pub filename: Option<String>,
    pub url: Option<String>,
    #[serde(alias = "mimetype")]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub size: Option<f64>,
    pub uploaded_at: Option<DocumentTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionDoc {
    #[serde(rename = "_id")]
    pub id: Option<SourceId>,
    pub medication: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub duration: Option<String>,
    pub instructions: Option<String>,
    pub prescribed_by: Option<SourceId>,
    pub prescribed_at: Option<DocumentTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogDoc {
    #[serde(rename = "_id")]
    pub id: SourceId,
    pub user: Option<SourceId>,
    pub action: Option<String>,
    pub resource: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub resource_id: Option<String>,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: Option<DocumentTime>,
    pub created_at: Option<DocumentTime>,
}

/// Items of a nested array field. `null` or absent means none; a lone non-array
/// value is treated as a single item and judged by its own decoder.
#[must_use]
pub fn nested_records(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

/// Older documents store list entries as bare strings; lift them into `{key: text}`.
#[must_use]
pub fn lift_bare_string(value: Value, key: &str) -> Value {
    match value {
        Value::String(text) => {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), Value::String(text));
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use super::*;

    #[test]
    fn document_time_accepts_exporter_encodings() -> Result<()> {
        let expected = OffsetDateTime::from_unix_timestamp(1_700_000_000)?;
        let encodings = [
            json!("2023-11-14T22:13:20Z"),
            json!({"$date": "2023-11-14T22:13:20.000Z"}),
            json!({"$date": {"$numberLong": "1700000000000"}}),
            json!({"$date": 1_700_000_000_000_i64}),
            json!(1_700_000_000_000_i64),
        ];
        for encoded in encodings {
            let DocumentTime(parsed) = serde_json::from_value(encoded.clone())?;
            assert_eq!(parsed, expected, "encoding {encoded}");
        }
        assert!(serde_json::from_value::<DocumentTime>(json!("yesterday")).is_err());
        Ok(())
    }

    #[test]
    fn account_doc_keeps_medical_info_raw() -> Result<()> {
        let doc: AccountDoc = serde_json::from_value(json!({
            "_id": {"$oid": "507f1f77bcf86cd799439011"},
            "email": "pat@example.com",
            "phone": 5551234,
            "medicalInfo": {"height": "not a number", "allergies": ["peanuts"]},
            "__v": 0
        }))?;
        assert_eq!(doc.phone.as_deref(), Some("5551234"));
        assert!(doc.medical_info.is_some());
        Ok(())
    }

    #[test]
    fn nested_records_handles_missing_null_and_scalar() {
        assert!(nested_records(None).is_empty());
        assert!(nested_records(Some(&Value::Null)).is_empty());
        assert_eq!(nested_records(Some(&json!([1, 2]))).len(), 2);
        assert_eq!(nested_records(Some(&json!("peanuts"))), vec![json!("peanuts")]);
    }

    #[test]
    fn lift_bare_string_wraps_text_only() {
        assert_eq!(lift_bare_string(json!("penicillin"), "name"), json!({"name": "penicillin"}));
        assert_eq!(lift_bare_string(json!({"name": "x"}), "name"), json!({"name": "x"}));
    }

    #[test]
    fn audit_resource_id_accepts_object_id_wrapper() -> Result<()> {
        let doc: AuditLogDoc = serde_json::from_value(json!({
            "_id": "65a1b2c3d4e5f60718293a4b",
            "action": "LOGIN",
            "resourceId": {"$oid": "507f1f77bcf86cd799439011"},
            "timestamp": {"$date": "2024-01-01T00:00:00Z"}
        }))?;
        assert_eq!(doc.resource_id.as_deref(), Some("507f1f77bcf86cd799439011"));
        Ok(())
    }
}
