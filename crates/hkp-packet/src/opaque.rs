//! Opaque packets.
//!
//! User attributes are stored in this form: the codec only knows their
//! subpacket boundaries, never the payload semantics.

use sequoia_openpgp as openpgp;
use openpgp::packet::user_attribute::{self, UserAttribute};

use crate::error::{PacketError, Result};
use crate::header::{self, read_header};
use crate::Tag;

/// A packet kept as tag plus raw contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaquePacket {
    raw: Vec<u8>,
    header_len: usize,
    tag: Tag,
}

impl OpaquePacket {
    pub fn new(tag: Tag, contents: &[u8]) -> Self {
        let raw = header::frame(tag, contents);
        Self {
            header_len: raw.len() - contents.len(),
            raw,
            tag,
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let header = read_header(raw)?;
        let end = header.packet_len()?;
        header.body(raw)?;
        Ok(Self {
            raw: raw[..end].to_vec(),
            header_len: header.header_len,
            tag: header.tag,
        })
    }

    /// Build a user attribute packet from `(subpacket type, body)` pairs.
    pub fn user_attribute<'a>(
        subpackets: impl IntoIterator<Item = (u8, &'a [u8])>,
    ) -> Result<Self> {
        let subpackets: Vec<user_attribute::Subpacket> = subpackets
            .into_iter()
            .map(|(kind, body)| user_attribute::Subpacket::Unknown(kind, body.into()))
            .collect();
        let ua = UserAttribute::new(&subpackets).map_err(PacketError::build)?;
        Ok(Self::new(Tag::UserAttribute, ua.value()))
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn contents(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    /// Lazily walk the contents as a user attribute subpacket area.
    pub fn subpackets(&self) -> AttributeSubpackets<'_> {
        AttributeSubpackets::new(self.contents())
    }

    /// The contents as sequoia's user attribute, for binding checks.
    pub fn openpgp_user_attribute(&self) -> Option<UserAttribute> {
        (self.tag == Tag::UserAttribute).then(|| UserAttribute::from(self.contents().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.clone()
    }
}

/// Iterator over `(subpacket type, body)` in a user attribute.
///
/// Yields an error for a truncated or zero-length subpacket and stops.
#[derive(Debug, Clone)]
pub struct AttributeSubpackets<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> AttributeSubpackets<'a> {
    /// Walk `contents`, the body of a user attribute packet.
    pub fn new(contents: &'a [u8]) -> Self {
        Self {
            data: contents,
            failed: false,
        }
    }

    fn read_one(&mut self) -> Result<(u8, &'a [u8])> {
        let data = self.data;
        let first = data[0];
        let (len, skip): (usize, usize) = match first {
            0..=191 => (first as usize, 1),
            192..=254 => {
                let second = *data
                    .get(1)
                    .ok_or_else(|| PacketError::truncated("subpacket length"))?;
                ((((first as usize) - 192) << 8) + second as usize + 192, 2)
            }
            255 => {
                let field = data
                    .get(1..5)
                    .ok_or_else(|| PacketError::truncated("subpacket length"))?;
                let len = u32::from_be_bytes([field[0], field[1], field[2], field[3]]);
                (len as usize, 5)
            }
        };
        if len == 0 {
            return Err(PacketError::malformed("zero-length subpacket"));
        }
        let end = skip
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| PacketError::truncated("subpacket body"))?;
        self.data = &data[end..];
        // the length covers the type octet
        Ok((data[skip], &data[skip + 1..end]))
    }
}

impl<'a> Iterator for AttributeSubpackets<'a> {
    type Item = Result<(u8, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        let item = self.read_one();
        self.failed = item.is_err();
        Some(item)
    }
}
