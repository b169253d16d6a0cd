//! Subkey entity

use chrono::{DateTime, Utc};
use hkp_packet::{Packet, PublicKey, Tag};
use serde::{Deserialize, Serialize};

use super::{
    from_epoch, packet_bytes, visit_signatures, Derivation, EntityState, PacketRecord, Record,
    Signable, Signature,
};
use crate::error::{ModelError, ModelResult};
use crate::identity::{fingerprint, key_id, reverse, short_id};

/// A subkey and its binding and revocation signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subkey {
    rfingerprint: String,
    creation: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    state: EntityState,
    #[serde(with = "packet_bytes")]
    packet: Vec<u8>,
    #[serde(default)]
    pubkey_rfp: String,
    algorithm: u8,
    #[serde(default)]
    bit_len: u16,
    #[serde(default)]
    pub(crate) signatures: Vec<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    binding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revsig: Option<String>,
}

impl Subkey {
    /// Wrap a subkey packet. Primary key packets are refused.
    pub fn new(key: PublicKey) -> ModelResult<Self> {
        if !key.is_subkey() {
            return Err(ModelError::PacketType {
                expected: Tag::PublicSubkey,
                actual: key.tag(),
            });
        }
        let rfingerprint = reverse(&fingerprint(&key)?);
        Ok(Self {
            rfingerprint,
            creation: from_epoch(key.creation_time()),
            expiration: None,
            state: EntityState::Valid,
            packet: key.to_bytes(),
            pubkey_rfp: String::new(),
            algorithm: u8::from(key.algorithm()),
            bit_len: key.bit_length().unwrap_or(0),
            signatures: Vec::new(),
            binding: None,
            revsig: None,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        Self::new(PublicKey::try_from(Packet::decode(bytes)?)?)
    }

    pub fn rfingerprint(&self) -> &str {
        &self.rfingerprint
    }

    pub fn fingerprint(&self) -> String {
        reverse(&self.rfingerprint)
    }

    pub fn key_id(&self) -> String {
        key_id(&self.fingerprint()).to_string()
    }

    pub fn short_id(&self) -> String {
        short_id(&self.fingerprint()).to_string()
    }

    pub fn pubkey_rfp(&self) -> &str {
        &self.pubkey_rfp
    }

    pub fn creation(&self) -> DateTime<Utc> {
        self.creation
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    /// Key size in bits, 0 when the algorithm is not recognised.
    pub fn bit_len(&self) -> u16 {
        self.bit_len
    }

    pub fn packet_bytes(&self) -> &[u8] {
        &self.packet
    }

    pub fn binding_digest(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    /// Resolved binding signature.
    pub fn binding(&self) -> Option<&Signature> {
        self.binding.as_deref().and_then(|d| self.signature(d))
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
        self.expiration = derived.expiration;
        self.state = derived.state;
        self.binding = derived.self_signature;
        self.revsig = derived.revsig;
    }
}

impl Signable for Subkey {
    fn scope(&self) -> &str {
        &self.rfingerprint
    }

    fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    fn signatures_mut(&mut self) -> &mut Vec<Signature> {
        &mut self.signatures
    }
}

impl PacketRecord for Subkey {
    fn packet(&self) -> ModelResult<Packet> {
        if self.packet.is_empty() {
            return Err(ModelError::MissingPacket);
        }
        Ok(Packet::decode(&self.packet)?)
    }

    fn set_packet(&mut self, packet: Packet) -> ModelResult<()> {
        let key = PublicKey::try_from(packet)?;
        let fresh = Self::new(key)?;
        if fresh.rfingerprint != self.rfingerprint {
            self.signatures = std::mem::take(&mut self.signatures)
                .into_iter()
                .map(|sig| sig.rescoped(&fresh.rfingerprint))
                .collect();
            self.apply(Derivation::default());
        }
        self.rfingerprint = fresh.rfingerprint;
        self.creation = fresh.creation;
        self.packet = fresh.packet;
        self.algorithm = fresh.algorithm;
        self.bit_len = fresh.bit_len;
        Ok(())
    }

    fn visit<'a, E, F>(&'a self, visitor: &mut F) -> Result<(), E>
    where
        F: FnMut(Record<'a>) -> Result<(), E>,
    {
        visitor(Record::Subkey(self))?;
        visit_signatures(&self.signatures, visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subkey_packet(seed: u8) -> PublicKey {
        PublicKey::new_rsa(1_500_000_000, &[0x80 | seed; 128], &[1, 0, 1], true).unwrap()
    }

    #[test]
    fn test_new_derives_identity() {
        let key = subkey_packet(1);
        let sub = Subkey::new(key.clone()).unwrap();
        let fp = fingerprint(&key).unwrap();
        assert_eq!(sub.fingerprint(), fp);
        assert_eq!(sub.rfingerprint(), reverse(&fp));
        assert_eq!(sub.key_id(), &fp[24..]);
        assert_eq!(sub.short_id(), &fp[32..]);
        assert_eq!(sub.creation(), from_epoch(1_500_000_000));
        assert_eq!(sub.algorithm(), 1);
        assert_eq!(sub.bit_len(), 1024);
    }

    #[test]
    fn test_primary_packet_rejected() {
        let primary = subkey_packet(1).with_subkey_flag(false);
        assert_eq!(
            Subkey::new(primary.clone()),
            Err(ModelError::PacketType {
                expected: Tag::PublicSubkey,
                actual: Tag::PublicKey
            })
        );

        let mut sub = Subkey::new(subkey_packet(2)).unwrap();
        let before = sub.clone();
        assert!(sub.set_packet(Packet::PublicKey(primary)).is_err());
        assert_eq!(sub, before);
    }

    #[test]
    fn test_set_packet_wrong_kind() {
        let mut sub = Subkey::new(subkey_packet(3)).unwrap();
        let err = sub
            .set_packet(Packet::UserId(hkp_packet::UserId::new("x")))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_set_packet_with_new_key_drops_resolved_state() {
        let mut sub = Subkey::new(subkey_packet(5)).unwrap();
        sub.apply(Derivation {
            creation: Some(from_epoch(1_500_000_000)),
            expiration: Some(from_epoch(1_500_000_100)),
            state: EntityState::Revoked,
            self_signature: Some("binding".to_string()),
            revsig: Some("revocation".to_string()),
        });

        sub.set_packet(Packet::PublicKey(subkey_packet(6))).unwrap();
        assert_eq!(sub.state(), EntityState::Valid);
        assert_eq!(sub.expiration(), None);
        assert!(sub.revsig_digest().is_none());
        assert!(sub.binding_digest().is_none());
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let sub = Subkey::new(subkey_packet(4)).unwrap();
        let again = Subkey::from_bytes(sub.packet_bytes()).unwrap();
        assert_eq!(again, sub);
    }
}
