//! Error types for the key model.

use std::fmt;

use hkp_packet::{PacketError, Tag};
use serde::{Deserialize, Serialize};

/// Error categories surfaced to callers.
///
/// These are stable and used by the service layer to map failures onto
/// responses (e.g. a decode error on upload is a client error, an identity
/// mismatch is a bug in the caller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bytes do not parse as a packet, or as the expected packet.
    Decode,
    /// A primary key where a subkey belongs, or the other way round.
    TypeMismatch,
    /// A required field is absent, e.g. a signature without issuer.
    MissingField,
    /// Merge invoked on two different keys.
    IdentityMismatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode => write!(f, "DECODE"),
            Self::TypeMismatch => write!(f, "TYPE_MISMATCH"),
            Self::MissingField => write!(f, "MISSING_FIELD"),
            Self::IdentityMismatch => write!(f, "IDENTITY_MISMATCH"),
        }
    }
}

/// Errors from entity construction and packet accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("expected {expected}, got {actual}")]
    PacketType { expected: Tag, actual: Tag },

    #[error("signature missing issuer key ID")]
    MissingIssuer,

    #[error("no packet data stored")]
    MissingPacket,
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Packet(PacketError::UnexpectedTag { .. }) => ErrorKind::TypeMismatch,
            Self::Packet(_) => ErrorKind::Decode,
            Self::PacketType { .. } => ErrorKind::TypeMismatch,
            Self::MissingIssuer | Self::MissingPacket => ErrorKind::MissingField,
        }
    }
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let decode = ModelError::from(PacketError::Malformed("short".into()));
        assert_eq!(decode.kind(), ErrorKind::Decode);

        let tag = ModelError::from(PacketError::UnexpectedTag {
            expected: Tag::PublicKey,
            actual: Tag::UserID,
        });
        assert_eq!(tag.kind(), ErrorKind::TypeMismatch);

        assert_eq!(ModelError::MissingIssuer.kind(), ErrorKind::MissingField);
        assert_eq!(
            ModelError::PacketType {
                expected: Tag::PublicSubkey,
                actual: Tag::PublicKey
            }
            .kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::IdentityMismatch).unwrap();
        assert_eq!(json, "\"IDENTITY_MISMATCH\"");
        assert_eq!(ErrorKind::TypeMismatch.to_string(), "TYPE_MISMATCH");
    }
}
