//! Whole-key digests in the form SKS key servers compare.
//!
//! Every packet of the tree is sorted by tag, then by body octets, and
//! hashed as `u32 tag || u32 body length || body`.

use std::convert::Infallible;

use hkp_packet::header::read_header;
use md5::Md5;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::model::{PacketRecord, Pubkey, Record};

/// MD5 and SHA-256 key hashes, lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyDigest {
    pub md5: String,
    pub sha256: String,
}

/// Compute the SKS digests of a key.
///
/// Records whose stored bytes lack a readable header are left out.
pub fn sks_digest(key: &Pubkey) -> KeyDigest {
    let mut packets: Vec<(u8, &[u8])> = Vec::new();
    let _ = key.visit(&mut |record: Record<'_>| -> Result<(), Infallible> {
        let bytes = record.packet_bytes();
        match read_header(bytes) {
            Ok(h) => match bytes.get(h.header_len..h.header_len + h.body_len) {
                Some(body) => packets.push((u8::from(h.tag), body)),
                None => debug!(kind = record.kind(), "truncated packet left out of digest"),
            },
            Err(err) => debug!(kind = record.kind(), error = %err, "unreadable packet left out of digest"),
        }
        Ok(())
    });
    packets.sort();

    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    for (tag, body) in packets {
        let tag = u32::from(tag).to_be_bytes();
        let len = (body.len() as u32).to_be_bytes();
        md5.update(tag);
        md5.update(len);
        md5.update(body);
        sha256.update(tag);
        sha256.update(len);
        sha256.update(body);
    }
    KeyDigest {
        md5: hex::encode(md5.finalize()),
        sha256: hex::encode(sha256.finalize()),
    }
}
