//! Derived entity state

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validity of a key, subkey, user ID or signature.
///
/// Persisted as a small integer. The state is never authoritative on its
/// own: it is recomputed from the signature set on every merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EntityState {
    #[default]
    Valid,
    Expired,
    Revoked,
    /// Malformed packet, or rejected by signature verification
    Invalid,
}

impl EntityState {
    /// Fold the usual precedence: revoked beats expired beats valid.
    pub fn derive(revoked: bool, expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if revoked {
            EntityState::Revoked
        } else if expiration.is_some_and(|at| at <= now) {
            EntityState::Expired
        } else {
            EntityState::Valid
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, EntityState::Valid)
    }
}

impl From<EntityState> for u8 {
    fn from(state: EntityState) -> u8 {
        match state {
            EntityState::Valid => 0,
            EntityState::Expired => 1,
            EntityState::Revoked => 2,
            EntityState::Invalid => 3,
        }
    }
}

impl TryFrom<u8> for EntityState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EntityState::Valid),
            1 => Ok(EntityState::Expired),
            2 => Ok(EntityState::Revoked),
            3 => Ok(EntityState::Invalid),
            other => Err(format!("unknown entity state {}", other)),
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Valid => write!(f, "valid"),
            EntityState::Expired => write!(f, "expired"),
            EntityState::Revoked => write!(f, "revoked"),
            EntityState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Seconds since the epoch as a UTC timestamp.
pub(crate) fn from_epoch(secs: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
}
