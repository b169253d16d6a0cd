//! Entity model
//!
//! A key is a tree:
//!
//! ```text
//! Pubkey ─┬─ Signature*            (direct-key sigs, key revocations)
//!         ├─ UserId* ─── Signature*
//!         ├─ UserAttribute* ─── Signature*
//!         └─ Subkey* ─── Signature*
//! ```
//!
//! Parents own their children exclusively. References the other way
//! (`pubkey_rfp`, a signature's `scope`) and cached resolver outputs
//! (`self_signature`, `revsig`) are identity strings resolved by lookup,
//! never ownership.

mod pubkey;
mod signature;
mod state;
mod subkey;
mod user_attribute;
mod user_id;

pub use pubkey::Pubkey;
pub use signature::Signature;
pub use state::EntityState;
pub use subkey::Subkey;
pub use user_attribute::{UserAttribute, IMAGE_SUBPACKET_OFFSET, IMAGE_SUBPACKET_TYPE};
pub use user_id::UserId;

pub(crate) use state::from_epoch;

use chrono::{DateTime, Utc};
use hkp_packet::Packet;

use crate::error::ModelResult;

/// A borrowed view of any entity in the tree, handed to visitors.
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    Pubkey(&'a Pubkey),
    Signature(&'a Signature),
    UserId(&'a UserId),
    UserAttribute(&'a UserAttribute),
    Subkey(&'a Subkey),
}

impl<'a> Record<'a> {
    /// Stored packet bytes, header included.
    pub fn packet_bytes(&self) -> &'a [u8] {
        match *self {
            Record::Pubkey(r) => r.packet_bytes(),
            Record::Signature(r) => r.packet_bytes(),
            Record::UserId(r) => r.packet_bytes(),
            Record::UserAttribute(r) => r.packet_bytes(),
            Record::Subkey(r) => r.packet_bytes(),
        }
    }

    /// Reversed identity string (fingerprint or scoped digest).
    pub fn identity(&self) -> &'a str {
        match *self {
            Record::Pubkey(r) => r.rfingerprint(),
            Record::Signature(r) => r.scoped_digest(),
            Record::UserId(r) => r.scoped_digest(),
            Record::UserAttribute(r) => r.scoped_digest(),
            Record::Subkey(r) => r.rfingerprint(),
        }
    }

    pub fn state(&self) -> EntityState {
        match self {
            Record::Pubkey(r) => r.state(),
            Record::Signature(r) => r.state(),
            Record::UserId(r) => r.state(),
            Record::UserAttribute(r) => r.state(),
            Record::Subkey(r) => r.state(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Record::Pubkey(_) => "pubkey",
            Record::Signature(_) => "signature",
            Record::UserId(_) => "user_id",
            Record::UserAttribute(_) => "user_attribute",
            Record::Subkey(_) => "subkey",
        }
    }
}

/// Uniform packet access and traversal, implemented by every entity.
pub trait PacketRecord {
    /// Decode the stored packet bytes.
    fn packet(&self) -> ModelResult<Packet>;

    /// Type-check `packet`, re-derive identity fields and store it.
    ///
    /// Either every field is updated or none is.
    fn set_packet(&mut self, packet: Packet) -> ModelResult<()>;

    /// Pre-order walk: self first, then owned children.
    ///
    /// Stops at the first error, returning it unchanged.
    fn visit<'a, E, F>(&'a self, visitor: &mut F) -> Result<(), E>
    where
        F: FnMut(Record<'a>) -> Result<(), E>;
}

/// Entities that own a signature list.
pub trait Signable {
    /// Identity string signatures on this entity are scoped to.
    fn scope(&self) -> &str;

    fn signatures(&self) -> &[Signature];

    #[doc(hidden)]
    fn signatures_mut(&mut self) -> &mut Vec<Signature>;

    /// Attach a signature, re-scoping it to this entity if needed.
    ///
    /// Returns false if an identical signature is already attached.
    fn add_signature(&mut self, sig: Signature) -> bool {
        let sig = if sig.scope() == self.scope() {
            sig
        } else {
            sig.rescoped(self.scope())
        };
        if self
            .signatures()
            .iter()
            .any(|s| s.scoped_digest() == sig.scoped_digest())
        {
            return false;
        }
        self.signatures_mut().push(sig);
        true
    }

    /// Construct a signature from a packet and attach it.
    fn add_signature_packet(&mut self, packet: hkp_packet::Signature) -> ModelResult<bool> {
        let sig = Signature::new(self.scope(), packet)?;
        Ok(self.add_signature(sig))
    }

    /// Look up one of this entity's signatures by scoped digest.
    fn signature(&self, digest: &str) -> Option<&Signature> {
        self.signatures().iter().find(|s| s.scoped_digest() == digest)
    }
}

/// Resolver output cached on a component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Derivation {
    pub creation: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
    pub state: EntityState,
    pub self_signature: Option<String>,
    pub revsig: Option<String>,
}

pub(crate) fn visit_signatures<'a, E, F>(sigs: &'a [Signature], visitor: &mut F) -> Result<(), E>
where
    F: FnMut(Record<'a>) -> Result<(), E>,
{
    for sig in sigs {
        sig.visit(visitor)?;
    }
    Ok(())
}

/// Serde adapter storing packet bytes as base64 text.
pub(crate) mod packet_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
