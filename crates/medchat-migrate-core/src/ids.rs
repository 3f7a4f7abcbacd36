//! Source and target record identifiers and the deterministic remapping between them.
//!
//! A source identifier is the document store's 12-byte object id, written as 24 hex
//! characters. A target identifier is a 16-byte key written in the hyphenated
//! 8-4-4-4-12 form. [`remap`] appends four zero bytes to the source bytes, so the
//! mapping needs no lookup table and every caller computes the same value.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entity::EntityKind;
use crate::error::IdentifierError;

pub const SOURCE_ID_BYTES: usize = 12;
pub const SOURCE_ID_HEX_LEN: usize = SOURCE_ID_BYTES * 2;
pub const TARGET_ID_BYTES: usize = 16;
pub const TARGET_ID_HEX_LEN: usize = TARGET_ID_BYTES * 2;

const TARGET_GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
const TARGET_TEXT_LEN: usize = TARGET_ID_HEX_LEN + TARGET_GROUPS.len() - 1;

fn reject_uppercase(raw: &str) -> Result<(), IdentifierError> {
    if raw.bytes().any(|byte| byte.is_ascii_uppercase()) {
        return Err(IdentifierError::InvalidHex {
            value: raw.to_string(),
            reason: "hex digits must be lowercase".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SourceId([u8; SOURCE_ID_BYTES]);

impl SourceId {
    /// Parse exactly 24 lowercase hex characters. Anything else is rejected, never
    /// padded or case-folded, so distinct accepted inputs stay distinct after [`remap`].
    ///
    /// # Errors
    /// Returns an error when the input has the wrong length or contains characters
    /// other than `0-9a-f`.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.len() != SOURCE_ID_HEX_LEN {
            return Err(IdentifierError::InvalidLength {
                expected: SOURCE_ID_HEX_LEN,
                actual: raw.len(),
                value: raw.to_string(),
            });
        }
        reject_uppercase(raw)?;

        let mut bytes = [0_u8; SOURCE_ID_BYTES];
        hex::decode_to_slice(raw, &mut bytes)
            .map_err(|err| IdentifierError::InvalidHex { value: raw.to_string(), reason: err.to_string() })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; SOURCE_ID_BYTES]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SOURCE_ID_BYTES] {
        &self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for SourceId {
    type Err = IdentifierError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Exporters write ids either as `{"$oid": "..."}` or as a bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawObjectId {
    Extended {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Plain(String),
}

impl RawObjectId {
    fn into_inner(self) -> String {
        match self {
            Self::Extended { oid } | Self::Plain(oid) => oid,
        }
    }
}

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawObjectId::deserialize(deserializer)?.into_inner();
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TargetId([u8; TARGET_ID_BYTES]);

impl TargetId {
    /// Parse the canonical hyphenated 8-4-4-4-12 form.
    ///
    /// # Errors
    /// Returns an error when the grouping, length, or hex digits are wrong.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.len() != TARGET_TEXT_LEN {
            return Err(IdentifierError::InvalidLength {
                expected: TARGET_TEXT_LEN,
                actual: raw.len(),
                value: raw.to_string(),
            });
        }

        let groups = raw.split('-').collect::<Vec<_>>();
        let well_grouped = groups.len() == TARGET_GROUPS.len()
            && groups.iter().zip(TARGET_GROUPS).all(|(group, len)| group.len() == len);
        if !well_grouped {
            return Err(IdentifierError::InvalidGrouping(raw.to_string()));
        }

        reject_uppercase(raw)?;
        let mut bytes = [0_u8; TARGET_ID_BYTES];
        hex::decode_to_slice(groups.concat(), &mut bytes)
            .map_err(|err| IdentifierError::InvalidHex { value: raw.to_string(), reason: err.to_string() })?;
        Ok(Self(bytes))
    }

    /// Identifier for a nested record that has no `_id` of its own.
    ///
    /// Layout: the parent's 12 source bytes, the entity tag (never zero), a zero byte,
    /// then the big-endian ordinal. Remapped ids end in four zero bytes, so the two
    /// families cannot collide.
    #[must_use]
    pub fn derive_child(parent: &SourceId, kind: EntityKind, ordinal: u16) -> Self {
        let mut bytes = [0_u8; TARGET_ID_BYTES];
        bytes[..SOURCE_ID_BYTES].copy_from_slice(parent.as_bytes());
        bytes[SOURCE_ID_BYTES] = kind.tag();
        bytes[SOURCE_ID_BYTES + 2..].copy_from_slice(&ordinal.to_be_bytes());
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TARGET_ID_BYTES] {
        &self.0
    }

    /// True when this id has the shape produced by [`remap`].
    #[must_use]
    pub fn is_remapped(&self) -> bool {
        self.0[SOURCE_ID_BYTES..].iter().all(|byte| *byte == 0)
    }
}

impl Display for TargetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let hex = hex::encode(self.0);
        let mut offset = 0;
        for (index, len) in TARGET_GROUPS.iter().enumerate() {
            if index > 0 {
                f.write_str("-")?;
            }
            f.write_str(&hex[offset..offset + len])?;
            offset += len;
        }
        Ok(())
    }
}

impl FromStr for TargetId {
    type Err = IdentifierError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl Serialize for TargetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TargetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Map a source identifier into the target identifier space.
///
/// Pure and injective: the source bytes are kept in place and followed by zeros.
#[must_use]
pub fn remap(source: &SourceId) -> TargetId {
    let mut bytes = [0_u8; TARGET_ID_BYTES];
    bytes[..SOURCE_ID_BYTES].copy_from_slice(source.as_bytes());
    TargetId(bytes)
}

/// String form of [`remap`] for callers holding raw identifiers.
///
/// # Errors
/// Returns an error when `raw` is not exactly 24 hex characters.
pub fn remap_str(raw: &str) -> Result<TargetId, IdentifierError> {
    SourceId::parse(raw).map(|source| remap(&source))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn remap_matches_documented_example() -> Result<()> {
        let target = remap_str("507f1f77bcf86cd799439011")?;
        assert_eq!(target.to_string(), "507f1f77-bcf8-6cd7-9943-901100000000");
        assert!(target.is_remapped());
        Ok(())
    }

    #[test]
    fn uppercase_hex_is_rejected_not_folded() {
        for raw in ["507F1F77BCF86CD799439011", "507f1f77bcf86cd79943901A"] {
            match remap_str(raw) {
                Err(IdentifierError::InvalidHex { value, .. }) => assert_eq!(value, raw),
                other => panic!("expected {raw} to be rejected, got {other:?}"),
            }
        }
        assert!(matches!(
            TargetId::parse("507F1F77-bcf8-6cd7-9943-901100000000"),
            Err(IdentifierError::InvalidHex { .. })
        ));
    }

    #[test]
    fn source_id_rejects_wrong_length() {
        for raw in ["", "507f1f77bcf86cd79943901", "507f1f77bcf86cd7994390110"] {
            match SourceId::parse(raw) {
                Err(IdentifierError::InvalidLength { expected, actual, .. }) => {
                    assert_eq!(expected, 24);
                    assert_eq!(actual, raw.len());
                }
                other => panic!("expected length error for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn source_id_rejects_non_hex() {
        let Err(err) = SourceId::parse("507f1f77bcf86cd79943901z") else {
            panic!("expected non-hex identifier to be rejected");
        };
        assert!(matches!(err, IdentifierError::InvalidHex { .. }));
    }

    #[test]
    fn source_id_rejects_multibyte_input_of_matching_byte_length() {
        // 22 ASCII chars plus one two-byte char is 24 bytes long.
        assert!(SourceId::parse("507f1f77bcf86cd7994390é").is_err());
    }

    #[test]
    fn source_id_deserializes_extended_and_plain_forms() -> Result<()> {
        let extended: SourceId =
            serde_json::from_str(r#"{"$oid":"507f1f77bcf86cd799439011"}"#)?;
        let plain: SourceId = serde_json::from_str(r#""507f1f77bcf86cd799439011""#)?;
        assert_eq!(extended, plain);
        assert!(serde_json::from_str::<SourceId>(r#"{"$oid":"abc"}"#).is_err());
        Ok(())
    }

    #[test]
    fn target_id_round_trips_through_text() -> Result<()> {
        let target = remap_str("65a1b2c3d4e5f60718293a4b")?;
        assert_eq!(TargetId::parse(&target.to_string())?, target);
        Ok(())
    }

    #[test]
    fn target_id_rejects_bad_grouping() {
        assert!(matches!(
            TargetId::parse("507f1f77bcf8-6cd7-9943-9011-00000000"),
            Err(IdentifierError::InvalidGrouping(_))
        ));
        assert!(TargetId::parse("507f1f77-bcf8-6cd7-9943-9011000000zz").is_err());
    }

    #[test]
    fn derived_child_ids_never_look_remapped() -> Result<()> {
        let parent = SourceId::parse("507f1f77bcf86cd799439011")?;
        for kind in EntityKind::ALL {
            let child = TargetId::derive_child(&parent, kind, 0);
            assert!(!child.is_remapped(), "{kind:?} child id collides with remap space");
        }
        let first = TargetId::derive_child(&parent, EntityKind::Allergy, 1);
        let second = TargetId::derive_child(&parent, EntityKind::Allergy, 2);
        assert_ne!(first, second);
        assert_eq!(first.to_string(), "507f1f77-bcf8-6cd7-9943-901103000001");
        Ok(())
    }

    proptest! {
        #[test]
        fn remap_is_deterministic(bytes in any::<[u8; 12]>()) {
            let source = SourceId::from_bytes(bytes);
            let text = source.to_string();
            let first = remap(&source);
            let second = remap_str(&text).map_err(|err| TestCaseError::fail(err.to_string()))?;
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.to_string().replace('-', "").len(), TARGET_ID_HEX_LEN);
        }

        #[test]
        fn accepted_text_ids_never_collide(left in "[0-9a-fA-F]{24}", right in "[0-9a-fA-F]{24}") {
            prop_assume!(left != right);
            if let (Ok(left), Ok(right)) = (remap_str(&left), remap_str(&right)) {
                prop_assert_ne!(left, right);
            }
        }

        #[test]
        fn remap_is_injective(left in any::<[u8; 12]>(), right in any::<[u8; 12]>()) {
            prop_assume!(left != right);
            let left = remap(&SourceId::from_bytes(left));
            let right = remap(&SourceId::from_bytes(right));
            prop_assert_ne!(left.to_string(), right.to_string());
        }
    }
}
