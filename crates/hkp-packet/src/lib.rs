//! OpenPGP packet access for key server storage
//!
//! Splits a packet stream into packets, keeps every packet's exact bytes
//! (header included) and parses the contents with `sequoia-openpgp`.
//! Nothing is ever re-serialized from the parsed form, so a stored packet
//! comes back out byte for byte.
//!
//! Sequoia does not read v2, v3 or v5 keys. Those are handled by a small
//! fixed-field reader in [`key`] so old keys still get a fingerprint.

use std::time::{SystemTime, UNIX_EPOCH};

pub use sequoia_openpgp as openpgp;

pub mod armor;
pub mod error;
pub mod header;
pub mod key;
pub mod opaque;
pub mod packet;
pub mod signature;
pub mod userid;

pub use error::{PacketError, Result};
pub use key::PublicKey;
pub use opaque::{AttributeSubpackets, OpaquePacket};
pub use openpgp::packet::Tag;
pub use openpgp::types::{PublicKeyAlgorithm, SignatureType};
pub use packet::{Packet, PacketReader};
pub use signature::{Signature, SignatureBuilder, SignatureTypeExt};
pub use userid::UserId;

/// Seconds since the epoch, clamped to the 32-bit range OpenPGP uses.
pub(crate) fn epoch_secs(time: SystemTime) -> u32 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}
