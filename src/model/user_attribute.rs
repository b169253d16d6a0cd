//! User attribute entity

use chrono::{DateTime, Utc};
use hkp_packet::header::read_header;
use hkp_packet::{AttributeSubpackets, OpaquePacket, Packet, Tag};
use serde::{Deserialize, Serialize};

use super::{
    packet_bytes, visit_signatures, Derivation, EntityState, PacketRecord, Record, Signable, Signature,
};
use crate::error::{ModelError, ModelResult};
use crate::identity::scoped_digest;

/// Subpacket type of an image attribute
pub const IMAGE_SUBPACKET_TYPE: u8 = 1;

/// Length of the image header preceding the image data
pub const IMAGE_SUBPACKET_OFFSET: usize = 16;

/// A user attribute (photo ID and similar) and its certifications.
///
/// The payload is opaque: it is stored and re-emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    scoped_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creation: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    state: EntityState,
    #[serde(with = "packet_bytes")]
    packet: Vec<u8>,
    #[serde(default)]
    pubkey_rfp: String,
    #[serde(default)]
    pub(crate) signatures: Vec<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    self_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revsig: Option<String>,
}

impl UserAttribute {
    pub fn new(packet: OpaquePacket) -> ModelResult<Self> {
        if packet.tag() != Tag::UserAttribute {
            return Err(ModelError::PacketType {
                expected: Tag::UserAttribute,
                actual: packet.tag(),
            });
        }
        let bytes = packet.to_bytes();
        Ok(Self {
            scoped_digest: scoped_digest("", &bytes),
            creation: None,
            expiration: None,
            state: EntityState::Valid,
            packet: bytes,
            pubkey_rfp: String::new(),
            signatures: Vec::new(),
            self_signature: None,
            revsig: None,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        match Packet::decode(bytes)? {
            Packet::Opaque(packet) => Self::new(packet),
            other => Err(ModelError::PacketType {
                expected: Tag::UserAttribute,
                actual: other.tag(),
            }),
        }
    }

    pub fn scoped_digest(&self) -> &str {
        &self.scoped_digest
    }

    pub fn pubkey_rfp(&self) -> &str {
        &self.pubkey_rfp
    }

    pub fn creation(&self) -> Option<DateTime<Utc>> {
        self.creation
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn packet_bytes(&self) -> &[u8] {
        &self.packet
    }

    pub fn self_signature_digest(&self) -> Option<&str> {
        self.self_signature.as_deref()
    }

    pub fn self_signature(&self) -> Option<&Signature> {
        self.self_signature.as_deref().and_then(|d| self.signature(d))
    }

    pub fn revsig_digest(&self) -> Option<&str> {
        self.revsig.as_deref()
    }

    pub fn revsig(&self) -> Option<&Signature> {
        self.revsig.as_deref().and_then(|d| self.signature(d))
    }

    /// Image payloads carried by this attribute.
    ///
    /// Walks the subpackets lazily, yielding the data after the image
    /// header of every image subpacket long enough to have one. The walk
    /// ends at the first subpacket whose framing is broken, so images
    /// after it are not yielded either.
    pub fn images(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let contents = read_header(&self.packet)
            .and_then(|h| h.body(&self.packet))
            .unwrap_or(&[]);
        AttributeSubpackets::new(contents)
            .map_while(Result::ok)
            .filter(|(kind, body)| *kind == IMAGE_SUBPACKET_TYPE && body.len() > IMAGE_SUBPACKET_OFFSET)
            .map(|(_, body)| &body[IMAGE_SUBPACKET_OFFSET..])
    }

    pub(crate) fn set_pubkey_rfp(&mut self, rfp: &str) {
        self.pubkey_rfp = rfp.to_string();
    }

    pub(crate) fn apply(&mut self, derived: Derivation) {
        self.creation = derived.creation;
        self.expiration = derived.expiration;
        self.state = derived.state;
        self.self_signature = derived.self_signature;
        self.revsig = derived.revsig;
    }
}

impl Signable for UserAttribute {
    fn scope(&self) -> &str {
        &self.scoped_digest
    }

    fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    fn signatures_mut(&mut self) -> &mut Vec<Signature> {
        &mut self.signatures
    }
}

impl PacketRecord for UserAttribute {
    fn packet(&self) -> ModelResult<Packet> {
        if self.packet.is_empty() {
            return Err(ModelError::MissingPacket);
        }
        Ok(Packet::decode(&self.packet)?)
    }

    fn set_packet(&mut self, packet: Packet) -> ModelResult<()> {
        let fresh = match packet {
            Packet::Opaque(opaque) => Self::new(opaque)?,
            other => {
                return Err(ModelError::PacketType {
                    expected: Tag::UserAttribute,
                    actual: other.tag(),
                })
            }
        };
        self.signatures = std::mem::take(&mut self.signatures)
            .into_iter()
            .map(|sig| sig.rescoped(&fresh.scoped_digest))
            .collect();
        self.scoped_digest = fresh.scoped_digest;
        self.packet = fresh.packet;
        self.apply(Derivation::default());
        Ok(())
    }

    fn visit<'a, E, F>(&'a self, visitor: &mut F) -> Result<(), E>
    where
        F: FnMut(Record<'a>) -> Result<(), E>,
    {
        visitor(Record::UserAttribute(self))?;
        visit_signatures(&self.signatures, visitor)
    }
}
