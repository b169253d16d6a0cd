//! Signature entity

use chrono::{DateTime, Duration, Utc};
use hkp_packet::{Packet, SignatureType, Tag};
use serde::{Deserialize, Serialize};

use super::{from_epoch, packet_bytes, EntityState, PacketRecord, Record};
use crate::error::{ModelError, ModelResult};
use crate::identity::{reverse, scoped_digest};

/// A signature attached to a key, subkey, user ID or user attribute.
///
/// Its identity is a digest scoped to the entity it is attached to, so
/// two copies of the same signature packet on the same component
/// collapse to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    scoped_digest: String,
    /// Identity of the owning entity (lookup only)
    scope: String,
    creation: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    state: EntityState,
    #[serde(with = "packet_bytes")]
    packet: Vec<u8>,
    sig_type: u8,
    r_issuer_key_id: String,
    #[serde(default)]
    r_issuer_fingerprint: String,
    /// Key lifetime in seconds carried by a self-signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_lifetime: Option<u32>,
    #[serde(default)]
    primary_user_id: bool,
    /// Digest of a later signature revoking this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revsig: Option<String>,
}

/// Fields derived from a signature packet, computed before any is stored.
struct Derived {
    scoped_digest: String,
    creation: DateTime<Utc>,
    expiration: Option<DateTime<Utc>>,
    packet: Vec<u8>,
    sig_type: u8,
    r_issuer_key_id: String,
    r_issuer_fingerprint: String,
    key_lifetime: Option<u32>,
    primary_user_id: bool,
}

impl Derived {
    fn from_packet(scope: &str, sig: &hkp_packet::Signature) -> ModelResult<Self> {
        let issuer = sig.issuer().ok_or(ModelError::MissingIssuer)?;
        let packet = sig.to_bytes();
        let creation = from_epoch(sig.creation_time().unwrap_or(0));
        let expiration = sig
            .signature_lifetime()
            .map(|secs| creation + Duration::seconds(i64::from(secs)));
        Ok(Self {
            scoped_digest: scoped_digest(scope, &packet),
            creation,
            expiration,
            sig_type: u8::from(sig.sig_type()),
            r_issuer_key_id: reverse(&hex::encode(issuer)),
            r_issuer_fingerprint: sig
                .issuer_fingerprint()
                .map(|fp| reverse(&hex::encode(fp)))
                .unwrap_or_default(),
            key_lifetime: sig.key_lifetime(),
            primary_user_id: sig.is_primary_userid(),
            packet,
        })
    }
}

impl Signature {
    /// Build a signature record scoped to the entity identified by `scope`.
    pub fn new(scope: &str, sig: hkp_packet::Signature) -> ModelResult<Self> {
        let derived = Derived::from_packet(scope, &sig)?;
        Ok(Self::from_derived(scope.to_string(), derived))
    }

    /// Rehydrate from stored packet bytes.
    pub fn from_bytes(scope: &str, bytes: &[u8]) -> ModelResult<Self> {
        let sig = hkp_packet::Signature::try_from(Packet::decode(bytes)?)?;
        Self::new(scope, sig)
    }

    fn from_derived(scope: String, d: Derived) -> Self {
        Self {
            scoped_digest: d.scoped_digest,
            scope,
            creation: d.creation,
            expiration: d.expiration,
            state: EntityState::Valid,
            packet: d.packet,
            sig_type: d.sig_type,
            r_issuer_key_id: d.r_issuer_key_id,
            r_issuer_fingerprint: d.r_issuer_fingerprint,
            key_lifetime: d.key_lifetime,
            primary_user_id: d.primary_user_id,
            revsig: None,
        }
    }

    /// Same packet attached to another entity.
    pub(crate) fn rescoped(mut self, scope: &str) -> Self {
        self.scoped_digest = scoped_digest(scope, &self.packet);
        self.scope = scope.to_string();
        self.reset_derivation();
        self
    }

    pub fn scoped_digest(&self) -> &str {
        &self.scoped_digest
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn creation(&self) -> DateTime<Utc> {
        self.creation
    }

    /// Creation plus signature lifetime, if the signature expires.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn sig_type(&self) -> SignatureType {
        SignatureType::from(self.sig_type)
    }

    pub fn r_issuer_key_id(&self) -> &str {
        &self.r_issuer_key_id
    }

    pub fn issuer_key_id(&self) -> String {
        reverse(&self.r_issuer_key_id)
    }

    pub fn r_issuer_fingerprint(&self) -> &str {
        &self.r_issuer_fingerprint
    }

    pub fn issuer_fingerprint(&self) -> Option<String> {
        if self.r_issuer_fingerprint.is_empty() {
            None
        } else {
            Some(reverse(&self.r_issuer_fingerprint))
        }
    }

    pub fn key_lifetime(&self) -> Option<u32> {
        self.key_lifetime
    }

    pub fn is_primary_user_id(&self) -> bool {
        self.primary_user_id
    }

    /// Digest of the signature revoking this one, if any.
    pub fn revsig(&self) -> Option<&str> {
        self.revsig.as_deref()
    }

    pub fn packet_bytes(&self) -> &[u8] {
        &self.packet
    }

    /// Decode the stored signature packet.
    pub fn signature(&self) -> ModelResult<hkp_packet::Signature> {
        if self.packet.is_empty() {
            return Err(ModelError::MissingPacket);
        }
        Ok(hkp_packet::Signature::try_from(Packet::decode(&self.packet)?)?)
    }

    /// Forget resolver output; the next resolve recomputes it.
    pub(crate) fn reset_derivation(&mut self) {
        self.state = EntityState::Valid;
        self.revsig = None;
    }

    pub(crate) fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    pub(crate) fn set_revsig(&mut self, revsig: Option<String>) {
        self.revsig = revsig;
    }
}

impl PacketRecord for Signature {
    fn packet(&self) -> ModelResult<Packet> {
        self.signature().map(Packet::Signature)
    }

    fn set_packet(&mut self, packet: Packet) -> ModelResult<()> {
        let sig = match packet {
            Packet::Signature(sig) => sig,
            other => {
                return Err(ModelError::PacketType {
                    expected: Tag::Signature,
                    actual: other.tag(),
                })
            }
        };
        let derived = Derived::from_packet(&self.scope, &sig)?;
        let scope = std::mem::take(&mut self.scope);
        *self = Self::from_derived(scope, derived);
        Ok(())
    }

    fn visit<'a, E, F>(&'a self, visitor: &mut F) -> Result<(), E>
    where
        F: FnMut(Record<'a>) -> Result<(), E>,
    {
        visitor(Record::Signature(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkp_packet::{SignatureBuilder, UserId as UserIdPacket};

    fn cert(issuer: [u8; 8], created: u32) -> hkp_packet::Signature {
        SignatureBuilder::new(SignatureType::PositiveCertification)
            .creation_time(created)
            .signature_lifetime(600)
            .key_lifetime(86_400)
            .issuer(issuer)
            .build([0x12, 0x34], &[0, 8, 0x80])
            .unwrap()
    }

    #[test]
    fn test_new_derives_fields() {
        let packet = cert([0xaa, 0xbb, 0xcc, 0xdd, 0x00, 0x11, 0x22, 0x33], 1_600_000_000);
        let sig = Signature::new("scope", packet.clone()).unwrap();

        assert_eq!(sig.issuer_key_id(), "aabbccdd00112233");
        assert_eq!(sig.r_issuer_key_id(), "33221100ddccbbaa");
        assert_eq!(sig.issuer_fingerprint(), None);
        assert_eq!(sig.sig_type(), SignatureType::PositiveCertification);
        assert_eq!(sig.creation(), from_epoch(1_600_000_000));
        assert_eq!(sig.expiration(), Some(from_epoch(1_600_000_600)));
        assert_eq!(sig.key_lifetime(), Some(86_400));
        assert_eq!(sig.packet_bytes(), &packet.to_bytes()[..]);
        assert_eq!(sig.scoped_digest(), scoped_digest("scope", &packet.to_bytes()));
    }

    #[test]
    fn test_missing_issuer_rejected() {
        let packet = SignatureBuilder::new(SignatureType::PositiveCertification)
            .creation_time(1)
            .build([0, 0], &[0, 1, 1])
            .unwrap();
        assert_eq!(Signature::new("scope", packet), Err(ModelError::MissingIssuer));
    }

    #[test]
    fn test_roundtrip() {
        let packet = cert([1; 8], 100);
        let sig = Signature::new("scope", packet.clone()).unwrap();
        assert_eq!(sig.packet().unwrap(), Packet::Signature(packet));
        assert_eq!(Signature::from_bytes("scope", sig.packet_bytes()).unwrap(), sig);
    }

    #[test]
    fn test_set_packet_type_check_leaves_state_untouched() {
        let mut sig = Signature::new("scope", cert([1; 8], 100)).unwrap();
        let before = sig.clone();
        let err = sig
            .set_packet(Packet::UserId(UserIdPacket::new("mallory")))
            .unwrap_err();
        assert!(matches!(err, ModelError::PacketType { .. }));
        assert_eq!(sig, before);

        let no_issuer = SignatureBuilder::new(SignatureType::Binary)
            .creation_time(5)
            .build([0, 0], &[0, 1, 1])
            .unwrap();
        assert_eq!(
            sig.set_packet(Packet::Signature(no_issuer)),
            Err(ModelError::MissingIssuer)
        );
        assert_eq!(sig, before);
    }

    #[test]
    fn test_set_packet_keeps_scope() {
        let mut sig = Signature::new("owner", cert([1; 8], 100)).unwrap();
        let replacement = cert([2; 8], 200);
        sig.set_packet(Packet::Signature(replacement.clone())).unwrap();
        assert_eq!(sig.scope(), "owner");
        assert_eq!(sig.scoped_digest(), scoped_digest("owner", &replacement.to_bytes()));
        assert_eq!(sig.issuer_key_id(), "0202020202020202");
    }

    #[test]
    fn test_rescoped_changes_identity() {
        let sig = Signature::new("a", cert([1; 8], 100)).unwrap();
        let moved = sig.clone().rescoped("b");
        assert_ne!(sig.scoped_digest(), moved.scoped_digest());
        assert_eq!(sig.packet_bytes(), moved.packet_bytes());
    }
}
