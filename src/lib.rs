//! HKP key model and merge engine
//!
//! This crate holds the object model a key server keeps for OpenPGP
//! public keys: a tree of primary key, user IDs, user attributes,
//! subkeys and the signatures over each, plus the merge engine that folds
//! new copies of a key into the stored one.
//!
//! Packet bytes come from the `hkp-packet` crate and are stored verbatim,
//! so a stored key re-serializes to exactly the packets it was built from.

pub mod config;
pub mod digest;
pub mod error;
pub mod identity;
pub mod keyring;
pub mod merge;
pub mod model;
pub mod resolve;
pub mod verify;

pub use config::{ConfigError, EffectiveSettings, Settings};
pub use digest::{sks_digest, KeyDigest};
pub use error::{ErrorKind, ModelError, ModelResult};
pub use keyring::{read_any, read_armored_keys, read_keys, to_armored, write_key, KeyringError};
pub use merge::{merge, merge_all, merge_keys, merge_with_report, MergeError, MergeReport};
pub use model::{
    EntityState, PacketRecord, Pubkey, Record, Signable, Signature, Subkey, UserAttribute, UserId,
};
pub use resolve::{
    resolve, MergeContext, Resolution, SignatureVerifier, SignedTarget, Verification,
};
pub use verify::OpenPgpVerifier;
