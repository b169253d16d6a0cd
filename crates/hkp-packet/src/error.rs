//! Error types for packet access.

use std::fmt;

use thiserror::Error;

use crate::Tag;

/// Errors raised while reading or building packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Input is truncated or otherwise does not parse as a packet.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The bytes decode to a different packet than the caller asked for.
    #[error("packet type mismatch: expected {expected}, got {actual}")]
    UnexpectedTag { expected: Tag, actual: Tag },

    /// Version octet that cannot be read.
    #[error("unsupported {packet} version {version}")]
    UnsupportedVersion { packet: Tag, version: u8 },

    /// ASCII armor framing failure.
    #[error("armor error: {0}")]
    Armor(String),

    /// Sequoia refused to build or serialize a packet.
    #[error("cannot build packet: {0}")]
    Build(String),
}

impl PacketError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub(crate) fn truncated(what: &str) -> Self {
        Self::Malformed(format!("truncated {}", what))
    }

    /// Sequoia parse failure. `{:#}` keeps the anyhow context chain.
    pub(crate) fn parse(err: impl fmt::Display) -> Self {
        Self::Malformed(format!("{:#}", err))
    }

    pub(crate) fn build(err: impl fmt::Display) -> Self {
        Self::Build(format!("{:#}", err))
    }

    /// True for failures that come from the input bytes themselves.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::UnsupportedVersion { .. } | Self::Armor(_))
    }
}

/// Result type for packet operations
pub type Result<T> = std::result::Result<T, PacketError>;
