//! Typed packet values and stream splitting.

use std::io::{self, Write};

use sequoia_openpgp as openpgp;
use openpgp::parse::Parse;

use crate::error::{PacketError, Result};
use crate::header::{self, Header};
use crate::key::PublicKey;
use crate::opaque::OpaquePacket;
use crate::signature::Signature;
use crate::userid::UserId;
use crate::Tag;

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Primary key or subkey, distinguished by `PublicKey::is_subkey`
    PublicKey(PublicKey),
    Signature(Signature),
    UserId(UserId),
    /// User attributes and every tag without a typed form
    Opaque(OpaquePacket),
}

/// Parse one complete packet with sequoia.
///
/// Sequoia turns bodies it cannot read into `Packet::Unknown`; that is a
/// decode failure here.
pub(crate) fn parse_openpgp(raw: &[u8]) -> Result<openpgp::Packet> {
    match openpgp::Packet::from_bytes(raw).map_err(PacketError::parse)? {
        openpgp::Packet::Unknown(unknown) => Err(PacketError::parse(unknown.error())),
        packet => Ok(packet),
    }
}

impl Packet {
    /// Decode exactly one packet; trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Packet> {
        let (packet, used) = Self::decode_prefix(bytes)?;
        if used != bytes.len() {
            return Err(PacketError::malformed(format!(
                "{} trailing octets after packet",
                bytes.len() - used
            )));
        }
        Ok(packet)
    }

    /// Decode the packet at the front of `bytes`, returning it with the
    /// number of octets consumed.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Packet, usize)> {
        let header: Header = header::read_header(bytes)?;
        let end = header.packet_len()?;
        let raw = bytes
            .get(..end)
            .ok_or_else(|| PacketError::truncated("packet body"))?;

        let packet = match header.tag {
            Tag::PublicKey | Tag::PublicSubkey => Packet::PublicKey(PublicKey::from_bytes(raw)?),
            Tag::Signature => Packet::Signature(Signature::from_bytes(raw)?),
            Tag::UserID => Packet::UserId(UserId::from_bytes(raw)?),
            _ => Packet::Opaque(OpaquePacket::from_bytes(raw)?),
        };
        Ok((packet, end))
    }

    pub fn tag(&self) -> Tag {
        match self {
            Packet::PublicKey(key) => key.tag(),
            Packet::Signature(_) => Tag::Signature,
            Packet::UserId(_) => Tag::UserID,
            Packet::Opaque(op) => op.tag(),
        }
    }

    /// Packet body without the header.
    pub fn body(&self) -> &[u8] {
        match self {
            Packet::PublicKey(key) => key.body(),
            Packet::Signature(sig) => sig.body(),
            Packet::UserId(uid) => uid.value(),
            Packet::Opaque(op) => op.contents(),
        }
    }

    /// The packet exactly as it was read.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Packet::PublicKey(key) => key.as_bytes(),
            Packet::Signature(sig) => sig.as_bytes(),
            Packet::UserId(uid) => uid.as_bytes(),
            Packet::Opaque(op) => op.as_bytes(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(self.as_bytes())
    }
}

macro_rules! packet_conversions {
    ($variant:ident, $ty:ty, $expected:expr) => {
        impl From<$ty> for Packet {
            fn from(value: $ty) -> Packet {
                Packet::$variant(value)
            }
        }

        impl TryFrom<Packet> for $ty {
            type Error = PacketError;

            fn try_from(packet: Packet) -> Result<$ty> {
                match packet {
                    Packet::$variant(value) => Ok(value),
                    other => Err(PacketError::UnexpectedTag {
                        expected: $expected,
                        actual: other.tag(),
                    }),
                }
            }
        }
    };
}

packet_conversions!(PublicKey, PublicKey, Tag::PublicKey);
packet_conversions!(Signature, Signature, Tag::Signature);
packet_conversions!(UserId, UserId, Tag::UserID);
packet_conversions!(Opaque, OpaquePacket, Tag::UserAttribute);

/// Iterator over a concatenated packet stream.
///
/// Stops after the first error.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            failed: false,
        }
    }
}

impl<'a> Iterator for PacketReader<'a> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        match Packet::decode_prefix(self.data) {
            Ok((packet, used)) => {
                self.data = &self.data[used..];
                Some(Ok(packet))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
