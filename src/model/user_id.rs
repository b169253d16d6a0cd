//! User ID entity

use chrono::{DateTime, Utc};
use hkp_packet::{Packet, Tag};
use serde::{Deserialize, Serialize};

use super::{
    packet_bytes, visit_signatures, Derivation, EntityState, PacketRecord, Record, Signable, Signature,
};
use crate::error::{ModelError, ModelResult};
use crate::identity::{clean_utf8, scoped_digest};

/// A user ID and the certifications made over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserId {
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
    keywords: String,
    #[serde(default)]
    pub(crate) signatures: Vec<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    self_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revsig: Option<String>,
}

impl UserId {
    pub fn new(packet: hkp_packet::UserId) -> Self {
        let keywords = clean_utf8(packet.value());
        let bytes = packet.to_bytes();
        Self {
            scoped_digest: scoped_digest(&keywords, &bytes),
            creation: None,
            expiration: None,
            state: EntityState::Valid,
            packet: bytes,
            pubkey_rfp: String::new(),
            keywords,
            signatures: Vec::new(),
            self_signature: None,
            revsig: None,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        let packet = hkp_packet::UserId::try_from(Packet::decode(bytes)?)?;
        Ok(Self::new(packet))
    }

    pub fn scoped_digest(&self) -> &str {
        &self.scoped_digest
    }

    /// Cleaned user ID text, used for search.
    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    /// Reversed fingerprint of the owning key.
    pub fn pubkey_rfp(&self) -> &str {
        &self.pubkey_rfp
    }

    /// Creation time of the resolved self-signature.
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

    /// Digest of the resolved self-signature.
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

impl Signable for UserId {
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

impl PacketRecord for UserId {
    fn packet(&self) -> ModelResult<Packet> {
        if self.packet.is_empty() {
            return Err(ModelError::MissingPacket);
        }
        Ok(Packet::decode(&self.packet)?)
    }

    fn set_packet(&mut self, packet: Packet) -> ModelResult<()> {
        let uid = match packet {
            Packet::UserId(uid) => uid,
            other => {
                return Err(ModelError::PacketType {
                    expected: Tag::UserID,
                    actual: other.tag(),
                })
            }
        };
        let fresh = Self::new(uid);
        self.signatures = std::mem::take(&mut self.signatures)
            .into_iter()
            .map(|sig| sig.rescoped(&fresh.scoped_digest))
            .collect();
        self.scoped_digest = fresh.scoped_digest;
        self.packet = fresh.packet;
        self.keywords = fresh.keywords;
        self.apply(Derivation::default());
        Ok(())
    }

    fn visit<'a, E, F>(&'a self, visitor: &mut F) -> Result<(), E>
    where
        F: FnMut(Record<'a>) -> Result<(), E>,
    {
        visitor(Record::UserId(self))?;
        visit_signatures(&self.signatures, visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkp_packet::{SignatureBuilder, SignatureType};

    fn cert(created: u32) -> hkp_packet::Signature {
        SignatureBuilder::new(SignatureType::GenericCertification)
            .creation_time(created)
            .issuer([9; 8])
            .build([0, 0], &[0, 1, 1])
            .unwrap()
    }

    #[test]
    fn test_keywords_and_digest() {
        let packet = hkp_packet::UserId::new(&b"Alice \x07<alice@example.org>"[..]);
        let uid = UserId::new(packet.clone());
        assert_eq!(uid.keywords(), "Alice <alice@example.org>");
        assert_eq!(
            uid.scoped_digest(),
            scoped_digest("Alice <alice@example.org>", &packet.to_bytes())
        );
        assert_eq!(uid.packet().unwrap(), Packet::UserId(packet));
    }

    #[test]
    fn test_add_signature_rescopes_and_dedups() {
        let mut uid = UserId::new(hkp_packet::UserId::new("bob"));
        let foreign = Signature::new("elsewhere", cert(10)).unwrap();
        assert!(uid.add_signature(foreign.clone()));
        assert!(!uid.add_signature(foreign));
        assert!(!uid.add_signature_packet(cert(10)).unwrap());
        assert!(uid.add_signature_packet(cert(11)).unwrap());

        assert_eq!(uid.signatures().len(), 2);
        assert!(uid.signatures().iter().all(|s| s.scope() == uid.scoped_digest()));
    }

    #[test]
    fn test_visit_order_and_fail_fast() {
        let mut uid = UserId::new(hkp_packet::UserId::new("carol"));
        uid.add_signature_packet(cert(1)).unwrap();
        uid.add_signature_packet(cert(2)).unwrap();

        let mut kinds = Vec::new();
        uid.visit(&mut |r: Record<'_>| -> Result<(), ()> {
            kinds.push(r.kind());
            Ok(())
        })
        .unwrap();
        assert_eq!(kinds, vec!["user_id", "signature", "signature"]);

        let mut seen = 0;
        let err = uid.visit(&mut |r: Record<'_>| {
            seen += 1;
            if r.kind() == "signature" {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(err, Err("stop"));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_set_packet_rejects_other_types() {
        let mut uid = UserId::new(hkp_packet::UserId::new("dave"));
        let before = uid.clone();
        let err = uid.set_packet(Packet::Signature(cert(1))).unwrap_err();
        assert_eq!(
            err,
            ModelError::PacketType {
                expected: Tag::UserID,
                actual: Tag::Signature
            }
        );
        assert_eq!(uid, before);
    }

    #[test]
    fn test_set_packet_rescopes_signatures() {
        let mut uid = UserId::new(hkp_packet::UserId::new("erin"));
        uid.add_signature_packet(cert(1)).unwrap();
        uid.set_packet(Packet::UserId(hkp_packet::UserId::new("erin2")))
            .unwrap();
        assert_eq!(uid.keywords(), "erin2");
        assert_eq!(uid.signatures()[0].scope(), uid.scoped_digest());
    }
}
