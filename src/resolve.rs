//! Self-signature resolution and state derivation.
//!
//! Every cached field the resolver writes (`self_signature`, `binding`,
//! `revsig`, `state`, `expiration`) is a pure function of the signature
//! sets in the tree. Nothing depends on list order or on which copy of a
//! key a signature came from, which is what keeps merging commutative.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use hkp_packet::{Packet, SignatureType, SignatureTypeExt};
use tracing::{debug, warn};

use crate::identity::rkey_id;
use crate::model::{
    Derivation, EntityState, PacketRecord, Pubkey, Signable, Signature, Subkey, UserAttribute, UserId,
};
use crate::verify::OpenPgpVerifier;

/// Outcome of checking a signature's cryptographic validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid,
    /// The verifier could not decide, e.g. a third-party issuer
    Unknown,
}

/// What a signature is made over, handed to the verifier.
#[derive(Debug, Clone, Copy)]
pub enum SignedTarget<'a> {
    /// Direct-key signature or key revocation
    Key,
    UserId(&'a UserId),
    UserAttribute(&'a UserAttribute),
    Subkey(&'a Subkey),
}

/// Cryptographic verification, supplied by the caller.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, primary: &Pubkey, target: SignedTarget<'_>, sig: &Signature) -> Verification;
}

static OPENPGP_VERIFIER: OpenPgpVerifier = OpenPgpVerifier;

/// Inputs to resolution and merging, passed explicitly.
#[derive(Clone, Copy)]
pub struct MergeContext<'a> {
    /// Weigh the verifier's verdict when selecting signatures
    pub verify_sigs: bool,
    pub verifier: &'a dyn SignatureVerifier,
    /// Reference time for expiry
    pub now: DateTime<Utc>,
}

impl MergeContext<'static> {
    /// Evaluated at the current time. Verification is off until
    /// `verify_sigs(true)`, and then uses [`OpenPgpVerifier`].
    pub fn new() -> Self {
        Self {
            verify_sigs: false,
            verifier: &OPENPGP_VERIFIER,
            now: Utc::now(),
        }
    }
}

impl Default for MergeContext<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> MergeContext<'a> {
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn verify_sigs(mut self, verify: bool) -> Self {
        self.verify_sigs = verify;
        self
    }

    pub fn with_verifier<'b>(self, verifier: &'b dyn SignatureVerifier) -> MergeContext<'b> {
        MergeContext {
            verify_sigs: self.verify_sigs,
            verifier,
            now: self.now,
        }
    }
}

impl std::fmt::Debug for MergeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeContext")
            .field("verify_sigs", &self.verify_sigs)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// Signatures excluded from derivation in one resolver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Scoped digests of signatures whose stored packet does not decode
    pub malformed: Vec<String>,
    /// Scoped digests of signatures the verifier declared invalid
    pub rejected: Vec<String>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty() && self.rejected.is_empty()
    }
}

const KEY_SELF_SIGS: &[SignatureType] = &[
    SignatureType::PrimaryKeyBinding,
    SignatureType::DirectKey,
];
const UID_SELF_SIGS: &[SignatureType] = &[SignatureType::PositiveCertification];
const BINDING_SIGS: &[SignatureType] = &[SignatureType::SubkeyBinding];

/// Re-derive every cached field in the tree.
///
/// Malformed or rejected signatures stay in the tree with state
/// `Invalid` and are never selected.
pub fn resolve(key: &mut Pubkey, ctx: &MergeContext<'_>) -> Resolution {
    let mut resolution = Resolution::default();
    let unusable = classify(key, ctx, &mut resolution);
    let rfp = key.rfingerprint().to_string();
    let now = ctx.now;

    for uid in key.user_ids_mut() {
        let derived = resolve_component(&mut uid.signatures, &rfp, &unusable, now);
        uid.apply(derived);
    }
    for uat in key.user_attributes_mut() {
        let derived = resolve_component(&mut uat.signatures, &rfp, &unusable, now);
        uat.apply(derived);
    }
    for sub in key.subkeys_mut() {
        let derived = resolve_subkey(sub, &rfp, &unusable, now);
        sub.apply(derived);
    }
    let derived = resolve_primary(key, &rfp, &unusable, now);
    key.apply(derived);

    debug!(
        fingerprint = %key.fingerprint(),
        state = %key.state(),
        malformed = resolution.malformed.len(),
        rejected = resolution.rejected.len(),
        "resolved key"
    );
    resolution
}

/// Digests of signatures that must not take part in derivation.
fn classify(key: &Pubkey, ctx: &MergeContext<'_>, resolution: &mut Resolution) -> HashSet<String> {
    let mut unusable = HashSet::new();
    let mut check = |target: SignedTarget<'_>, sig: &Signature| {
        if let Err(err) = sig.signature() {
            warn!(digest = %sig.scoped_digest(), error = %err, "malformed signature packet");
            resolution.malformed.push(sig.scoped_digest().to_string());
            unusable.insert(sig.scoped_digest().to_string());
            return;
        }
        if ctx.verify_sigs && ctx.verifier.verify(key, target, sig) == Verification::Invalid {
            warn!(
                digest = %sig.scoped_digest(),
                issuer = %sig.issuer_key_id(),
                "signature failed verification"
            );
            resolution.rejected.push(sig.scoped_digest().to_string());
            unusable.insert(sig.scoped_digest().to_string());
        }
    };

    for sig in key.signatures() {
        check(SignedTarget::Key, sig);
    }
    for uid in key.user_ids() {
        for sig in uid.signatures() {
            check(SignedTarget::UserId(uid), sig);
        }
    }
    for uat in key.user_attributes() {
        for sig in uat.signatures() {
            check(SignedTarget::UserAttribute(uat), sig);
        }
    }
    for sub in key.subkeys() {
        for sig in sub.signatures() {
            check(SignedTarget::Subkey(sub), sig);
        }
    }
    unusable
}

pub(crate) fn is_self_issued(sig: &Signature, rfp: &str) -> bool {
    sig.r_issuer_fingerprint() == rfp || sig.r_issuer_key_id() == rkey_id(rfp)
}

/// Newest first; equal times fall back to the lower digest.
fn recency(a: &Signature, b: &Signature) -> Ordering {
    a.creation()
        .cmp(&b.creation())
        .then_with(|| b.scoped_digest().cmp(a.scoped_digest()))
}

/// Most recent usable, unrevoked, self-issued signature of one of `types`.
fn select<'s>(
    sigs: &'s [Signature],
    types: &[SignatureType],
    rfp: &str,
    unusable: &HashSet<String>,
) -> Option<&'s Signature> {
    sigs.iter()
        .filter(|s| types.contains(&s.sig_type()))
        .filter(|s| is_self_issued(s, rfp))
        .filter(|s| !unusable.contains(s.scoped_digest()))
        .filter(|s| s.revsig().is_none())
        .max_by(|a, b| recency(a, b))
}

/// Apply certification revocations and set per-signature state.
fn mark_signatures(
    sigs: &mut [Signature],
    revokes_certifications: bool,
    unusable: &HashSet<String>,
    now: DateTime<Utc>,
) {
    let revocations: Vec<(String, String, DateTime<Utc>)> = if revokes_certifications {
        sigs.iter()
            .filter(|s| s.sig_type() == SignatureType::CertificationRevocation)
            .filter(|s| !unusable.contains(s.scoped_digest()))
            .map(|s| {
                (
                    s.scoped_digest().to_string(),
                    s.r_issuer_key_id().to_string(),
                    s.creation(),
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    for sig in sigs.iter_mut() {
        let revsig = if sig.sig_type().is_certification() {
            revocations
                .iter()
                .filter(|(_, issuer, at)| *issuer == sig.r_issuer_key_id() && *at >= sig.creation())
                .max_by(|a, b| a.2.cmp(&b.2).then_with(|| b.0.cmp(&a.0)))
                .map(|(digest, _, _)| digest.clone())
        } else {
            None
        };
        let state = if unusable.contains(sig.scoped_digest()) {
            EntityState::Invalid
        } else {
            EntityState::derive(revsig.is_some(), sig.expiration(), now)
        };
        sig.set_revsig(revsig);
        sig.set_state(state);
    }
}

/// User IDs and user attributes.
fn resolve_component(
    sigs: &mut [Signature],
    rfp: &str,
    unusable: &HashSet<String>,
    now: DateTime<Utc>,
) -> Derivation {
    mark_signatures(sigs, true, unusable, now);

    let self_sig = select(sigs, UID_SELF_SIGS, rfp, unusable);
    let revsig = match self_sig {
        Some(_) => None,
        None => sigs
            .iter()
            .filter(|s| s.sig_type() == SignatureType::CertificationRevocation)
            .filter(|s| is_self_issued(s, rfp) && !unusable.contains(s.scoped_digest()))
            .max_by(|a, b| recency(a, b)),
    };

    let expiration = self_sig.and_then(|s| s.expiration());
    let state = if revsig.is_some() {
        EntityState::Revoked
    } else {
        EntityState::derive(false, expiration, now)
    };
    Derivation {
        creation: self_sig.map(|s| s.creation()),
        expiration,
        state,
        self_signature: self_sig.map(|s| s.scoped_digest().to_string()),
        revsig: revsig.map(|s| s.scoped_digest().to_string()),
    }
}

fn resolve_subkey(
    sub: &mut Subkey,
    rfp: &str,
    unusable: &HashSet<String>,
    now: DateTime<Utc>,
) -> Derivation {
    mark_signatures(&mut sub.signatures, false, unusable, now);
    let sigs = &sub.signatures;

    let binding = select(sigs, BINDING_SIGS, rfp, unusable);
    let revsig = select(sigs, &[SignatureType::SubkeyRevocation], rfp, unusable);
    let expiration = binding
        .and_then(|s| s.key_lifetime())
        .map(|secs| sub.creation() + Duration::seconds(i64::from(secs)));

    Derivation {
        creation: Some(sub.creation()),
        expiration,
        state: EntityState::derive(revsig.is_some(), expiration, now),
        self_signature: binding.map(|s| s.scoped_digest().to_string()),
        revsig: revsig.map(|s| s.scoped_digest().to_string()),
    }
}

fn resolve_primary(
    key: &mut Pubkey,
    rfp: &str,
    unusable: &HashSet<String>,
    now: DateTime<Utc>,
) -> Derivation {
    mark_signatures(&mut key.signatures, false, unusable, now);

    let revsig = select(key.signatures(), &[SignatureType::KeyRevocation], rfp, unusable)
        .map(|s| s.scoped_digest().to_string());
    let self_sig = select(key.signatures(), KEY_SELF_SIGS, rfp, unusable).or_else(|| {
        // No direct self-signature: take the key's lifetime from the user
        // ID self-signatures, primary-flagged ones first.
        let uid_sigs: Vec<&Signature> = key
            .user_ids()
            .iter()
            .filter(|u| u.state() != EntityState::Revoked)
            .filter_map(|u| u.self_signature())
            .collect();
        let primaries = uid_sigs.iter().copied().filter(|s| s.is_primary_user_id());
        primaries
            .max_by(|a, b| recency(a, b))
            .or_else(|| uid_sigs.iter().copied().max_by(|a, b| recency(a, b)))
    });

    let expiration = match self_sig.and_then(|s| s.key_lifetime()) {
        Some(secs) => Some(key.creation() + Duration::seconds(i64::from(secs))),
        None => v3_expiration(key),
    };

    Derivation {
        creation: Some(key.creation()),
        expiration,
        state: EntityState::derive(revsig.is_some(), expiration, now),
        self_signature: self_sig.map(|s| s.scoped_digest().to_string()),
        revsig,
    }
}

/// Expiry encoded in a v2/v3 key packet itself.
fn v3_expiration(key: &Pubkey) -> Option<DateTime<Utc>> {
    let days = match key.packet() {
        Ok(Packet::PublicKey(packet)) => packet.v3_days_valid()?,
        _ => return None,
    };
    if days == 0 {
        return None;
    }
    Some(key.creation() + Duration::days(i64::from(days)))
}
