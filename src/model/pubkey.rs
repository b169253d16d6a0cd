//! Primary key entity, root of the tree

use chrono::{DateTime, Utc};
use hkp_packet::{Packet, PublicKey, Tag};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    from_epoch, packet_bytes, visit_signatures, Derivation, EntityState, PacketRecord, Record,
    Signable, Signature, Subkey, UserAttribute, UserId,
};
use crate::error::{ModelError, ModelResult};
use crate::identity::{fingerprint, key_id, reverse, short_id};

/// A primary public key with everything attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pubkey {
    rfingerprint: String,
    creation: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    state: EntityState,
    #[serde(with = "packet_bytes")]
    packet: Vec<u8>,
    /// SKS-style digest over every packet in the tree
    #[serde(default)]
    md5: String,
    #[serde(default)]
    sha256: String,
    algorithm: u8,
    #[serde(default)]
    bit_len: u16,
    #[serde(default)]
    pub(crate) signatures: Vec<Signature>,
    #[serde(default)]
    pub(crate) user_ids: Vec<UserId>,
    #[serde(default)]
    pub(crate) user_attributes: Vec<UserAttribute>,
    #[serde(default)]
    pub(crate) subkeys: Vec<Subkey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revsig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    self_signature: Option<String>,
}

impl Pubkey {
    /// Wrap a primary key packet. Subkey packets are refused.
    pub fn new(key: PublicKey) -> ModelResult<Self> {
        if key.is_subkey() {
            warn!(tag = %key.tag(), "refusing subkey packet as primary key");
            return Err(ModelError::PacketType {
                expected: Tag::PublicKey,
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
            md5: String::new(),
            sha256: String::new(),
            algorithm: u8::from(key.algorithm()),
            bit_len: key.bit_length().unwrap_or(0),
            signatures: Vec::new(),
            user_ids: Vec::new(),
            user_attributes: Vec::new(),
            subkeys: Vec::new(),
            revsig: None,
            self_signature: None,
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

    pub fn bit_len(&self) -> u16 {
        self.bit_len
    }

    pub fn md5(&self) -> &str {
        &self.md5
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn packet_bytes(&self) -> &[u8] {
        &self.packet
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn user_attributes(&self) -> &[UserAttribute] {
        &self.user_attributes
    }

    pub fn subkeys(&self) -> &[Subkey] {
        &self.subkeys
    }

    pub fn user_id(&self, digest: &str) -> Option<&UserId> {
        self.user_ids.iter().find(|u| u.scoped_digest() == digest)
    }

    pub fn user_attribute(&self, digest: &str) -> Option<&UserAttribute> {
        self.user_attributes.iter().find(|u| u.scoped_digest() == digest)
    }

    pub fn subkey(&self, rfingerprint: &str) -> Option<&Subkey> {
        self.subkeys.iter().find(|s| s.rfingerprint() == rfingerprint)
    }

    pub fn self_signature_digest(&self) -> Option<&str> {
        self.self_signature.as_deref()
    }

    /// Resolved self-signature.
    ///
    /// A direct-key signature lives on the key itself; a certification
    /// chosen as fallback lives on one of the user IDs.
    pub fn self_signature(&self) -> Option<&Signature> {
        let digest = self.self_signature.as_deref()?;
        self.signature(digest).or_else(|| {
            self.user_ids
                .iter()
                .find_map(|u| u.signature(digest))
                .or_else(|| self.user_attributes.iter().find_map(|u| u.signature(digest)))
        })
    }

    pub fn revsig_digest(&self) -> Option<&str> {
        self.revsig.as_deref()
    }

    pub fn revsig(&self) -> Option<&Signature> {
        self.revsig.as_deref().and_then(|d| self.signature(d))
    }

    /// The user ID flagged primary by its self-signature, else the first
    /// valid one, else the first.
    pub fn primary_user_id(&self) -> Option<&UserId> {
        self.user_ids
            .iter()
            .find(|u| u.state().is_valid() && u.self_signature().is_some_and(|s| s.is_primary_user_id()))
            .or_else(|| self.user_ids.iter().find(|u| u.state().is_valid()))
            .or_else(|| self.user_ids.first())
    }

    /// Attach a user ID, returning its index.
    ///
    /// A user ID already present keeps its place and absorbs the incoming
    /// signatures.
    pub fn add_user_id(&mut self, mut uid: UserId) -> usize {
        uid.set_pubkey_rfp(&self.rfingerprint);
        match self
            .user_ids
            .iter()
            .position(|u| u.scoped_digest() == uid.scoped_digest())
        {
            Some(at) => {
                for sig in uid.signatures {
                    self.user_ids[at].add_signature(sig);
                }
                at
            }
            None => {
                self.user_ids.push(uid);
                self.user_ids.len() - 1
            }
        }
    }

    pub fn add_user_attribute(&mut self, mut uat: UserAttribute) -> usize {
        uat.set_pubkey_rfp(&self.rfingerprint);
        match self
            .user_attributes
            .iter()
            .position(|u| u.scoped_digest() == uat.scoped_digest())
        {
            Some(at) => {
                for sig in uat.signatures {
                    self.user_attributes[at].add_signature(sig);
                }
                at
            }
            None => {
                self.user_attributes.push(uat);
                self.user_attributes.len() - 1
            }
        }
    }

    pub fn add_subkey(&mut self, mut subkey: Subkey) -> usize {
        subkey.set_pubkey_rfp(&self.rfingerprint);
        match self
            .subkeys
            .iter()
            .position(|s| s.rfingerprint() == subkey.rfingerprint())
        {
            Some(at) => {
                for sig in subkey.signatures {
                    self.subkeys[at].add_signature(sig);
                }
                at
            }
            None => {
                self.subkeys.push(subkey);
                self.subkeys.len() - 1
            }
        }
    }

    pub(crate) fn user_ids_mut(&mut self) -> &mut [UserId] {
        &mut self.user_ids
    }

    pub(crate) fn user_attributes_mut(&mut self) -> &mut [UserAttribute] {
        &mut self.user_attributes
    }

    pub(crate) fn subkeys_mut(&mut self) -> &mut [Subkey] {
        &mut self.subkeys
    }

    pub(crate) fn apply(&mut self, derived: Derivation) {
        self.expiration = derived.expiration;
        self.state = derived.state;
        self.self_signature = derived.self_signature;
        self.revsig = derived.revsig;
    }

    pub(crate) fn set_digests(&mut self, md5: String, sha256: String) {
        self.md5 = md5;
        self.sha256 = sha256;
    }
}

impl Signable for Pubkey {
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

impl PacketRecord for Pubkey {
    fn packet(&self) -> ModelResult<Packet> {
        if self.packet.is_empty() {
            return Err(ModelError::MissingPacket);
        }
        Ok(Packet::decode(&self.packet)?)
    }

    fn set_packet(&mut self, packet: Packet) -> ModelResult<()> {
        let key = PublicKey::try_from(packet)?;
        let fresh = Self::new(key)?;
        let rfp = fresh.rfingerprint;
        if rfp != self.rfingerprint {
            self.signatures = std::mem::take(&mut self.signatures)
                .into_iter()
                .map(|sig| sig.rescoped(&rfp))
                .collect();
            // whatever was resolved against the old key no longer holds
            self.apply(Derivation::default());
            for uid in &mut self.user_ids {
                uid.set_pubkey_rfp(&rfp);
                uid.apply(Derivation::default());
                uid.signatures.iter_mut().for_each(Signature::reset_derivation);
            }
            for uat in &mut self.user_attributes {
                uat.set_pubkey_rfp(&rfp);
                uat.apply(Derivation::default());
                uat.signatures.iter_mut().for_each(Signature::reset_derivation);
            }
            for sub in &mut self.subkeys {
                sub.set_pubkey_rfp(&rfp);
                sub.apply(Derivation::default());
                sub.signatures.iter_mut().for_each(Signature::reset_derivation);
            }
        }
        self.rfingerprint = rfp;
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
        visitor(Record::Pubkey(self))?;
        visit_signatures(&self.signatures, visitor)?;
        for uid in &self.user_ids {
            uid.visit(visitor)?;
        }
        for uat in &self.user_attributes {
            uat.visit(visitor)?;
        }
        for sub in &self.subkeys {
            sub.visit(visitor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkp_packet::{OpaquePacket, SignatureBuilder, SignatureType};

    fn primary() -> PublicKey {
        PublicKey::new_rsa(1_400_000_000, &[0xc1; 256], &[1, 0, 1], false).unwrap()
    }

    fn sig(sig_type: SignatureType, created: u32) -> hkp_packet::Signature {
        SignatureBuilder::new(sig_type)
            .creation_time(created)
            .issuer([7; 8])
            .build([0, 0], &[0, 1, 1])
            .unwrap()
    }

    fn sample() -> Pubkey {
        let mut key = Pubkey::new(primary()).unwrap();
        key.add_signature_packet(sig(SignatureType::DirectKey, 1)).unwrap();

        let mut uid = UserId::new(hkp_packet::UserId::new("alice"));
        uid.add_signature_packet(sig(SignatureType::PositiveCertification, 2))
            .unwrap();
        key.add_user_id(uid);

        let uat = UserAttribute::new(OpaquePacket::user_attribute([(1, &[0u8; 20][..])]).unwrap()).unwrap();
        key.add_user_attribute(uat);

        let mut sub = Subkey::new(PublicKey::new_rsa(1_400_000_001, &[0xc2; 128], &[3], true).unwrap()).unwrap();
        sub.add_signature_packet(sig(SignatureType::SubkeyBinding, 3)).unwrap();
        key.add_subkey(sub);
        key
    }

    #[test]
    fn test_subkey_packet_rejected() {
        let sub = primary().with_subkey_flag(true);
        assert_eq!(
            Pubkey::new(sub),
            Err(ModelError::PacketType {
                expected: Tag::PublicKey,
                actual: Tag::PublicSubkey
            })
        );
    }

    #[test]
    fn test_identity_views() {
        let key = Pubkey::new(primary()).unwrap();
        let fp = fingerprint(&primary()).unwrap();
        assert_eq!(key.fingerprint(), fp);
        assert_eq!(key.rfingerprint(), reverse(&fp));
        assert_eq!(key.key_id(), &fp[24..]);
        assert_eq!(key.short_id(), &fp[32..]);
        assert_eq!(key.bit_len(), 2048);
    }

    #[test]
    fn test_visit_preorder() {
        let key = sample();
        let mut kinds = Vec::new();
        key.visit(&mut |r: Record<'_>| -> Result<(), ()> {
            kinds.push(r.kind());
            Ok(())
        })
        .unwrap();
        assert_eq!(
            kinds,
            vec![
                "pubkey",
                "signature",
                "user_id",
                "signature",
                "user_attribute",
                "subkey",
                "signature"
            ]
        );
    }

    #[test]
    fn test_visit_stops_at_first_error() {
        let key = sample();
        let mut visited = Vec::new();
        let result = key.visit(&mut |r: Record<'_>| {
            visited.push(r.kind());
            if r.kind() == "user_id" {
                return Err(r.identity().to_string());
            }
            Ok(())
        });
        assert_eq!(result, Err(key.user_ids()[0].scoped_digest().to_string()));
        assert_eq!(visited, vec!["pubkey", "signature", "user_id"]);
    }

    #[test]
    fn test_add_components_sets_back_reference_and_dedups() {
        let mut key = sample();
        assert!(key
            .user_ids()
            .iter()
            .all(|u| u.pubkey_rfp() == key.rfingerprint()));
        assert_eq!(key.subkeys()[0].pubkey_rfp(), key.rfingerprint());

        let mut again = UserId::new(hkp_packet::UserId::new("alice"));
        again
            .add_signature_packet(sig(SignatureType::CasualCertification, 9))
            .unwrap();
        assert_eq!(key.add_user_id(again), 0);
        assert_eq!(key.user_ids().len(), 1);
        assert_eq!(key.user_ids()[0].signatures().len(), 2);
    }

    #[test]
    fn test_set_packet_rejects_subkey() {
        let mut key = sample();
        let before = key.clone();
        let sub = PublicKey::new_rsa(5, &[0xd0; 64], &[3], true).unwrap();
        assert!(key.set_packet(Packet::PublicKey(sub)).is_err());
        assert_eq!(key, before);
    }

    #[test]
    fn test_set_packet_with_new_key_drops_resolved_state() {
        let mut key = Pubkey::new(primary()).unwrap();
        let mut me = [0u8; 8];
        hex::decode_to_slice(key.key_id(), &mut me).unwrap();
        let self_sig = |sig_type: SignatureType, created: u32| {
            SignatureBuilder::new(sig_type)
                .creation_time(created)
                .issuer(me)
                .build([0, 0], &[1, created as u8])
                .unwrap()
        };
        key.add_signature_packet(self_sig(SignatureType::KeyRevocation, 5))
            .unwrap();
        let mut uid = UserId::new(hkp_packet::UserId::new("alice"));
        uid.add_signature_packet(self_sig(SignatureType::PositiveCertification, 6))
            .unwrap();
        key.add_user_id(uid);

        let ctx = crate::resolve::MergeContext::new().at(from_epoch(1_400_000_100));
        key.recompute(&ctx);
        assert_eq!(key.state(), EntityState::Revoked);
        assert!(key.revsig().is_some());
        assert!(key.user_ids()[0].self_signature().is_some());

        let other = PublicKey::new_rsa(1_400_000_000, &[0xc3; 256], &[1, 0, 1], false).unwrap();
        key.set_packet(Packet::PublicKey(other)).unwrap();
        assert_eq!(key.state(), EntityState::Valid);
        assert!(key.revsig_digest().is_none());
        assert!(key.revsig().is_none());
        assert!(key.self_signature_digest().is_none());
        assert!(key.user_ids()[0].self_signature_digest().is_none());
        assert!(key
            .signatures()
            .iter()
            .all(|s| s.state() == EntityState::Valid && s.revsig().is_none()));

        // the old key's revocation is not self-issued for the new one
        key.recompute(&ctx);
        assert_eq!(key.state(), EntityState::Valid);
        assert!(key.revsig().is_none());
    }

    #[test]
    fn test_serde_roundtrip() {
        let key = sample();
        let json = serde_json::to_string(&key).unwrap();
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
