//! Identity utilities: fingerprints, key ids and the reversed-hex form.
//!
//! Every identity string stored by the model is reversed. A fingerprint's
//! low-order octets are its most distinguishing ones, and reversing the hex
//! puts them first, which spreads keys evenly over prefix-based indexes.
//! `Pubkey::fingerprint()` and friends undo the reversal on read.

use hkp_packet::{PacketError, PublicKey};
use sha2::{Digest, Sha256};

/// Length in hex characters of a long key id
pub const KEY_ID_LEN: usize = 16;

/// Length in hex characters of a short key id
pub const SHORT_ID_LEN: usize = 8;

/// Flip the character order of `s`.
pub fn reverse(s: &str) -> String {
    s.chars().rev().collect()
}

/// Raw fingerprint octets of a public key packet.
///
/// v4 and v6 come from sequoia; v3 is MD5 over the RSA modulus and
/// exponent, v5 SHA-256 over the length-prefixed body.
pub fn fingerprint_bytes(key: &PublicKey) -> Result<Vec<u8>, PacketError> {
    key.fingerprint()
}

/// Lower-case hex fingerprint of a public key packet.
pub fn fingerprint(key: &PublicKey) -> Result<String, PacketError> {
    fingerprint_bytes(key).map(hex::encode)
}

/// Long key id: the last 16 hex characters of a fingerprint.
pub fn key_id(fingerprint: &str) -> &str {
    tail(fingerprint, KEY_ID_LEN)
}

/// Short key id: the last 8 hex characters of a fingerprint.
pub fn short_id(fingerprint: &str) -> &str {
    tail(fingerprint, SHORT_ID_LEN)
}

fn tail(s: &str, n: usize) -> &str {
    &s[s.len().saturating_sub(n)..]
}

/// Reversed long key id, read straight off a reversed fingerprint.
pub fn rkey_id(rfingerprint: &str) -> &str {
    &rfingerprint[..rfingerprint.len().min(KEY_ID_LEN)]
}

/// Lossy UTF-8 decode with control characters removed.
///
/// Used to derive searchable keywords from user IDs. Never fails: invalid
/// sequences become U+FFFD.
pub fn clean_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Reversed hex SHA-256 over `scope` followed by `data`.
///
/// Scoping a packet's digest by its owner makes the same signature packet
/// attached to two different components two distinct records.
pub fn scoped_digest(scope: &str, data: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(scope.as_bytes());
    h.update(data);
    reverse(&hex::encode(h.finalize()))
}
