//! Signature packets (tag 2).
//!
//! Only the fields a key server indexes are exposed: type, creation and
//! expiration times, issuer key id and fingerprint, the primary user ID
//! flag and the revocation reason. All of them come from sequoia's
//! subpacket accessors, which read the hashed area except for the issuer
//! subpackets.

use std::time::Duration;

use sequoia_openpgp as openpgp;
use openpgp::crypto::mpi::{self, MPI};
use openpgp::packet::signature::subpacket::{Subpacket, SubpacketArea, SubpacketValue};
use openpgp::packet::signature::Signature4;
use openpgp::serialize::SerializeInto;
use openpgp::types::{HashAlgorithm, ReasonForRevocation, Timestamp};
use openpgp::{Fingerprint, KeyID};

use crate::error::{PacketError, Result};
use crate::header::read_header;
use crate::packet::parse_openpgp;
use crate::{epoch_secs, PublicKeyAlgorithm, SignatureType, Tag};

/// Groupings of signature types the model cares about.
pub trait SignatureTypeExt {
    /// One of the four user ID certification types (0x10-0x13).
    fn is_certification(self) -> bool;

    fn is_revocation(self) -> bool;
}

impl SignatureTypeExt for SignatureType {
    fn is_certification(self) -> bool {
        matches!(
            self,
            SignatureType::GenericCertification
                | SignatureType::PersonaCertification
                | SignatureType::CasualCertification
                | SignatureType::PositiveCertification
        )
    }

    fn is_revocation(self) -> bool {
        matches!(
            self,
            SignatureType::KeyRevocation
                | SignatureType::SubkeyRevocation
                | SignatureType::CertificationRevocation
        )
    }
}

fn whole_secs(period: Duration) -> Option<u32> {
    u32::try_from(period.as_secs()).ok().filter(|secs| *secs != 0)
}

/// A signature packet.
#[derive(Debug, Clone)]
pub struct Signature {
    raw: Vec<u8>,
    header_len: usize,
    version: u8,
    sig: openpgp::packet::Signature,
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Signature {}

impl Signature {
    /// Read one complete signature packet.
    ///
    /// Version 5 signatures share the v4 layout. Sequoia does not accept
    /// them, so their fields are read from a copy relabelled as v4; the
    /// stored bytes are untouched.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let header = read_header(raw)?;
        if header.tag != Tag::Signature {
            return Err(PacketError::UnexpectedTag {
                expected: Tag::Signature,
                actual: header.tag,
            });
        }
        let end = header.packet_len()?;
        let body = header.body(raw)?;
        let version = *body.first().ok_or_else(|| PacketError::truncated("signature"))?;

        let packet = match version {
            3 | 4 | 6 => parse_openpgp(&raw[..end])?,
            5 => {
                let mut as_v4 = raw[..end].to_vec();
                as_v4[header.header_len] = 4;
                parse_openpgp(&as_v4)?
            }
            other => {
                return Err(PacketError::UnsupportedVersion {
                    packet: Tag::Signature,
                    version: other,
                })
            }
        };
        let sig = match packet {
            openpgp::Packet::Signature(sig) => sig,
            other => {
                return Err(PacketError::UnexpectedTag {
                    expected: Tag::Signature,
                    actual: other.tag(),
                })
            }
        };

        Ok(Self {
            raw: raw[..end].to_vec(),
            header_len: header.header_len,
            version,
            sig,
        })
    }

    /// Version octet as stored.
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn sig_type(&self) -> SignatureType {
        self.sig.typ()
    }

    pub fn pk_algo(&self) -> PublicKeyAlgorithm {
        self.sig.pk_algo()
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.sig.hash_algo()
    }

    /// Signature creation time in seconds since the epoch.
    pub fn creation_time(&self) -> Option<u32> {
        self.sig.signature_creation_time().map(epoch_secs)
    }

    /// Seconds after creation at which the signature expires.
    pub fn signature_lifetime(&self) -> Option<u32> {
        self.sig.signature_validity_period().and_then(whole_secs)
    }

    /// Seconds after key creation at which the signed key expires.
    pub fn key_lifetime(&self) -> Option<u32> {
        self.sig.key_validity_period().and_then(whole_secs)
    }

    /// Issuer key id.
    ///
    /// Falls back to the low-order eight octets of the issuer fingerprint
    /// when no issuer subpacket is present.
    pub fn issuer(&self) -> Option<[u8; 8]> {
        let issuer = self
            .sig
            .issuers()
            .find_map(|id| <[u8; 8]>::try_from(id.as_bytes()).ok());
        if issuer.is_some() {
            return issuer;
        }
        let fp = self.issuer_fingerprint()?;
        let tail = fp.get(fp.len().checked_sub(8)?..)?;
        tail.try_into().ok()
    }

    /// Issuer fingerprint octets, without the key version prefix.
    pub fn issuer_fingerprint(&self) -> Option<&[u8]> {
        self.sig
            .issuer_fingerprints()
            .map(|fp| fp.as_bytes())
            .find(|fp| !fp.is_empty())
    }

    pub fn is_primary_userid(&self) -> bool {
        self.sig.primary_userid().unwrap_or(false)
    }

    /// Revocation reason code and human-readable text.
    pub fn revocation_reason(&self) -> Option<(u8, &[u8])> {
        self.sig
            .reason_for_revocation()
            .map(|(code, text)| (u8::from(code), text))
    }

    /// The parsed sequoia signature, for verification.
    pub fn openpgp(&self) -> &openpgp::packet::Signature {
        &self.sig
    }

    pub fn body(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.clone()
    }
}

/// Builds version 4 signature packets.
///
/// Produces structurally valid packets carrying whatever signature value
/// the caller supplies; nothing here signs.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    sig_type: SignatureType,
    pk_algo: PublicKeyAlgorithm,
    hash_algo: HashAlgorithm,
    hashed: Vec<SubpacketValue>,
    unhashed: Vec<SubpacketValue>,
    issuer_fingerprint: Option<Vec<u8>>,
}

impl SignatureBuilder {
    pub fn new(sig_type: SignatureType) -> Self {
        Self {
            sig_type,
            pk_algo: PublicKeyAlgorithm::RSAEncryptSign,
            hash_algo: HashAlgorithm::SHA256,
            hashed: Vec::new(),
            unhashed: Vec::new(),
            issuer_fingerprint: None,
        }
    }

    pub fn algorithms(mut self, pk_algo: PublicKeyAlgorithm, hash_algo: HashAlgorithm) -> Self {
        self.pk_algo = pk_algo;
        self.hash_algo = hash_algo;
        self
    }

    pub fn creation_time(mut self, secs: u32) -> Self {
        self.hashed
            .push(SubpacketValue::SignatureCreationTime(Timestamp::from(secs)));
        self
    }

    pub fn signature_lifetime(mut self, secs: u32) -> Self {
        self.hashed
            .push(SubpacketValue::SignatureExpirationTime(secs.into()));
        self
    }

    pub fn key_lifetime(mut self, secs: u32) -> Self {
        self.hashed.push(SubpacketValue::KeyExpirationTime(secs.into()));
        self
    }

    pub fn primary_userid(mut self) -> Self {
        self.hashed.push(SubpacketValue::PrimaryUserID(true));
        self
    }

    pub fn revocation_reason(mut self, code: u8, text: &str) -> Self {
        self.hashed.push(SubpacketValue::ReasonForRevocation {
            code: ReasonForRevocation::from(code),
            reason: text.as_bytes().to_vec(),
        });
        self
    }

    /// Issuer fingerprint in the hashed area. 32 octets mark a v6 key.
    pub fn issuer_fingerprint(mut self, fingerprint: &[u8]) -> Self {
        self.issuer_fingerprint = Some(fingerprint.to_vec());
        self
    }

    /// Issuer key id in the unhashed area, where GnuPG puts it.
    pub fn issuer(mut self, key_id: [u8; 8]) -> Self {
        self.unhashed
            .push(SubpacketValue::Issuer(KeyID::from_bytes(&key_id)));
        self
    }

    /// Finish the packet with `value` as the signature value.
    pub fn build(self, hash_prefix: [u8; 2], value: &[u8]) -> Result<Signature> {
        if value.is_empty() {
            return Err(PacketError::Build("signature value is empty".to_string()));
        }
        let mut hashed = self.hashed;
        if let Some(fp) = self.issuer_fingerprint {
            let version = if fp.len() == 32 { 6 } else { 4 };
            let fp = Fingerprint::from_bytes(version, &fp).map_err(PacketError::build)?;
            hashed.push(SubpacketValue::IssuerFingerprint(fp));
        }
        let area = |values: Vec<SubpacketValue>| -> Result<SubpacketArea> {
            let subpackets = values
                .into_iter()
                .map(|value| Subpacket::new(value, false))
                .collect::<openpgp::Result<Vec<_>>>()
                .map_err(PacketError::build)?;
            SubpacketArea::new(subpackets).map_err(PacketError::build)
        };

        let sig4 = Signature4::new(
            self.sig_type,
            self.pk_algo,
            self.hash_algo,
            area(hashed)?,
            area(self.unhashed)?,
            hash_prefix,
            mpi::Signature::RSA { s: MPI::new(value) },
        );
        let packet = openpgp::Packet::from(openpgp::packet::Signature::from(sig4));
        Signature::from_bytes(&packet.to_vec().map_err(PacketError::build)?)
    }
}
