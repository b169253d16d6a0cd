//! Signature verification backed by sequoia.
//!
//! Only self-signatures can be checked: the tree holds no key material for
//! third-party issuers, so their certifications come back `Unknown`.

use hkp_packet::Packet;
use sequoia_openpgp as openpgp;
use openpgp::packet::key::{PrimaryRole, PublicParts};
use openpgp::packet::Key;
use openpgp::types::SignatureType;
use tracing::debug;

use crate::model::{PacketRecord, Pubkey, Signature};
use crate::resolve::{is_self_issued, SignatureVerifier, SignedTarget, Verification};

/// Checks self-signatures against the primary key.
///
/// Keys sequoia cannot read (v2, v3, v5) and v5 signatures are `Unknown`,
/// as are signatures made with algorithms the backend lacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPgpVerifier;

fn primary_key(key: &Pubkey) -> Option<Key<PublicParts, PrimaryRole>> {
    match key.packet().ok()? {
        Packet::PublicKey(pk) => Some(pk.openpgp()?.clone().role_into_primary()),
        _ => None,
    }
}

fn verdict(result: openpgp::Result<()>) -> Verification {
    match result {
        Ok(()) => Verification::Valid,
        Err(err) => match err.downcast_ref::<openpgp::Error>() {
            Some(
                openpgp::Error::UnsupportedPublicKeyAlgorithm(_)
                | openpgp::Error::UnsupportedHashAlgorithm(_),
            ) => Verification::Unknown,
            _ => {
                debug!(error = %err, "signature does not verify");
                Verification::Invalid
            }
        },
    }
}

impl SignatureVerifier for OpenPgpVerifier {
    fn verify(&self, primary: &Pubkey, target: SignedTarget<'_>, sig: &Signature) -> Verification {
        if !is_self_issued(sig, primary.rfingerprint()) {
            return Verification::Unknown;
        }
        let Ok(decoded) = sig.signature() else {
            return Verification::Unknown;
        };
        if decoded.version() == 5 {
            return Verification::Unknown;
        }
        let Some(pk) = primary_key(primary) else {
            return Verification::Unknown;
        };
        let s = decoded.openpgp();

        let result = match (target, s.typ()) {
            (SignedTarget::Key, SignatureType::DirectKey) => s.verify_direct_key(&pk, &pk),
            (SignedTarget::Key, SignatureType::KeyRevocation) => {
                s.verify_primary_key_revocation(&pk, &pk)
            }
            (SignedTarget::UserId(uid), typ) => {
                let Ok(Packet::UserId(packet)) = uid.packet() else {
                    return Verification::Unknown;
                };
                let userid = packet.openpgp();
                match typ {
                    SignatureType::CertificationRevocation => {
                        s.verify_userid_revocation(&pk, &pk, &userid)
                    }
                    _ => s.verify_userid_binding(&pk, &pk, &userid),
                }
            }
            (SignedTarget::UserAttribute(uat), typ) => {
                let Some(ua) = uat.packet().ok().and_then(|p| match p {
                    Packet::Opaque(op) => op.openpgp_user_attribute(),
                    _ => None,
                }) else {
                    return Verification::Unknown;
                };
                match typ {
                    SignatureType::CertificationRevocation => {
                        s.verify_user_attribute_revocation(&pk, &pk, &ua)
                    }
                    _ => s.verify_user_attribute_binding(&pk, &pk, &ua),
                }
            }
            (SignedTarget::Subkey(sub), typ) => {
                let Some(subkey) = sub.packet().ok().and_then(|p| match p {
                    Packet::PublicKey(k) => k.openpgp().map(|k| k.clone().role_into_subordinate()),
                    _ => None,
                }) else {
                    return Verification::Unknown;
                };
                match typ {
                    SignatureType::SubkeyBinding => s.verify_subkey_binding(&pk, &pk, &subkey),
                    SignatureType::SubkeyRevocation => {
                        s.verify_subkey_revocation(&pk, &pk, &subkey)
                    }
                    _ => return Verification::Unknown,
                }
            }
            _ => return Verification::Unknown,
        };
        verdict(result)
    }
}
