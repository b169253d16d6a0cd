//! Merging two copies of the same key.
//!
//! The result holds the union of both trees: nothing already accepted is
//! ever dropped and nothing is stored twice. Cached derivations are then
//! rebuilt from scratch by the resolver, so the outcome does not depend
//! on which side a signature came from.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::digest::sks_digest;
use crate::error::{ErrorKind, ModelError};
use crate::model::{PacketRecord, Pubkey, Record, Signable};
use crate::resolve::{resolve, MergeContext, Resolution};

/// Errors that can occur while merging keys
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("cannot merge key {incoming} into {existing}: fingerprints differ")]
    FingerprintMismatch { existing: String, incoming: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FingerprintMismatch { .. } => ErrorKind::IdentityMismatch,
            Self::Model(err) => err.kind(),
        }
    }
}

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub added_signatures: usize,
    pub added_user_ids: usize,
    pub added_user_attributes: usize,
    pub added_subkeys: usize,
    /// Signatures kept but excluded because their packet does not decode
    pub malformed: Vec<String>,
    /// Signatures kept but excluded because verification failed
    pub rejected: Vec<String>,
}

impl MergeReport {
    /// True when the incoming key carried nothing new.
    pub fn is_unchanged(&self) -> bool {
        self.added_signatures == 0
            && self.added_user_ids == 0
            && self.added_user_attributes == 0
            && self.added_subkeys == 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Census {
    signatures: usize,
    user_ids: usize,
    user_attributes: usize,
    subkeys: usize,
}

fn census(key: &Pubkey) -> Census {
    let mut counts = Census::default();
    let _ = key.visit(&mut |record: Record<'_>| -> Result<(), ()> {
        match record {
            Record::Signature(_) => counts.signatures += 1,
            Record::UserId(_) => counts.user_ids += 1,
            Record::UserAttribute(_) => counts.user_attributes += 1,
            Record::Subkey(_) => counts.subkeys += 1,
            Record::Pubkey(_) => {}
        }
        Ok(())
    });
    counts
}

/// Merge `incoming` into a copy of `existing`.
pub fn merge(
    existing: &Pubkey,
    incoming: &Pubkey,
    ctx: &MergeContext<'_>,
) -> Result<Pubkey, MergeError> {
    merge_with_report(existing, incoming, ctx).map(|(key, _)| key)
}

/// Merge using the default context: no verification, current time.
pub fn merge_keys(existing: &Pubkey, incoming: &Pubkey) -> Result<Pubkey, MergeError> {
    merge(existing, incoming, &MergeContext::new())
}

/// Merge and describe what changed.
pub fn merge_with_report(
    existing: &Pubkey,
    incoming: &Pubkey,
    ctx: &MergeContext<'_>,
) -> Result<(Pubkey, MergeReport), MergeError> {
    if existing.rfingerprint() != incoming.rfingerprint() {
        return Err(MergeError::FingerprintMismatch {
            existing: existing.fingerprint(),
            incoming: incoming.fingerprint(),
        });
    }

    let before = census(existing);
    let mut merged = existing.clone();
    for sig in incoming.signatures() {
        merged.add_signature(sig.clone());
    }
    for uid in incoming.user_ids() {
        merged.add_user_id(uid.clone());
    }
    for uat in incoming.user_attributes() {
        merged.add_user_attribute(uat.clone());
    }
    for sub in incoming.subkeys() {
        merged.add_subkey(sub.clone());
    }
    let after = census(&merged);

    let Resolution { malformed, rejected } = merged.recompute(ctx);
    let report = MergeReport {
        added_signatures: after.signatures - before.signatures,
        added_user_ids: after.user_ids - before.user_ids,
        added_user_attributes: after.user_attributes - before.user_attributes,
        added_subkeys: after.subkeys - before.subkeys,
        malformed,
        rejected,
    };
    debug!(
        fingerprint = %merged.fingerprint(),
        added_signatures = report.added_signatures,
        added_user_ids = report.added_user_ids,
        added_subkeys = report.added_subkeys,
        "merged key"
    );
    Ok((merged, report))
}

/// Fold a batch of keys so each fingerprint appears once.
///
/// Keys come back in the order their fingerprint was first seen.
pub fn merge_all(keys: Vec<Pubkey>, ctx: &MergeContext<'_>) -> Result<Vec<Pubkey>, MergeError> {
    let total = keys.len();
    let mut order: Vec<String> = Vec::new();
    let mut folded: HashMap<String, Pubkey> = HashMap::new();
    for key in keys {
        let rfp = key.rfingerprint().to_string();
        let next = match folded.remove(&rfp) {
            None => {
                order.push(rfp.clone());
                let mut key = key;
                key.recompute(ctx);
                key
            }
            Some(prev) => merge(&prev, &key, ctx)?,
        };
        folded.insert(rfp, next);
    }
    let merged: Vec<Pubkey> = order
        .iter()
        .filter_map(|rfp| folded.remove(rfp))
        .collect();
    info!(read = total, distinct = merged.len(), "folded key batch");
    Ok(merged)
}

impl Pubkey {
    /// Re-run resolution and refresh the whole-key digests.
    pub fn recompute(&mut self, ctx: &MergeContext<'_>) -> Resolution {
        let resolution = resolve(self, ctx);
        let digest = sks_digest(self);
        self.set_digests(digest.md5, digest.sha256);
        resolution
    }
}
