//! User ID packets (tag 13).

use sequoia_openpgp as openpgp;

use crate::error::{PacketError, Result};
use crate::header::{self, read_header};
use crate::Tag;

/// A User ID packet.
///
/// The value is conventionally UTF-8 but is kept as raw octets; decoding
/// into text is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId {
    raw: Vec<u8>,
    header_len: usize,
}

impl UserId {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        let raw = header::frame(Tag::UserID, &value);
        Self {
            header_len: raw.len() - value.len(),
            raw,
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let header = read_header(raw)?;
        if header.tag != Tag::UserID {
            return Err(PacketError::UnexpectedTag {
                expected: Tag::UserID,
                actual: header.tag,
            });
        }
        let end = header.packet_len()?;
        header.body(raw)?;
        Ok(Self {
            raw: raw[..end].to_vec(),
            header_len: header.header_len,
        })
    }

    pub fn value(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    /// The value as sequoia's user ID, for binding checks.
    pub fn openpgp(&self) -> openpgp::packet::UserID {
        openpgp::packet::UserID::from(self.value())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_and_framing() {
        let uid = UserId::new("Ada <ada@example.org>");
        assert_eq!(uid.value(), b"Ada <ada@example.org>");
        assert_eq!(uid.as_bytes()[0], 0xc0 | 13);
        assert_eq!(uid.openpgp().value(), uid.value());
    }

    #[test]
    fn test_wrong_tag() {
        let raw = header::frame(Tag::UserAttribute, b"xx");
        assert!(matches!(
            UserId::from_bytes(&raw),
            Err(PacketError::UnexpectedTag { .. })
        ));
    }
}
