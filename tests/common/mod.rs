//! Shared builders for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use hkp_keyring::{MergeContext, Pubkey, Signable, Subkey, UserAttribute, UserId};
use hkp_packet::{OpaquePacket, PublicKey, SignatureBuilder, SignatureType};

pub const KEY_CREATED: u32 = 1_600_000_000;

pub fn at(secs: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(secs), 0).unwrap()
}

/// Context pinned to a fixed clock.
pub fn ctx(now: u32) -> MergeContext<'static> {
    MergeContext::new().at(at(now))
}

pub fn primary_packet(seed: u8) -> PublicKey {
    PublicKey::new_rsa(KEY_CREATED, &[0x80 | seed; 128], &[1, 0, 1], false).unwrap()
}

pub fn subkey_packet(seed: u8) -> PublicKey {
    PublicKey::new_rsa(KEY_CREATED + 10, &[0xc0 | seed; 128], &[1, 0, 1], true).unwrap()
}

pub fn bare_key(seed: u8) -> Pubkey {
    Pubkey::new(primary_packet(seed)).unwrap()
}

pub fn issuer_of(key: &Pubkey) -> [u8; 8] {
    let mut out = [0u8; 8];
    hex::decode_to_slice(key.key_id(), &mut out).unwrap();
    out
}

/// A signature with distinct material per (type, creation).
pub fn sig(
    sig_type: SignatureType,
    issuer: [u8; 8],
    created: u32,
    tweak: impl FnOnce(SignatureBuilder) -> SignatureBuilder,
) -> hkp_packet::Signature {
    let salt = created.to_be_bytes();
    tweak(SignatureBuilder::new(sig_type).creation_time(created))
        .issuer(issuer)
        .build([salt[2], salt[3]], &[0, 16, salt[2] | 0x80, salt[3]])
        .unwrap()
}

/// The same signature relabelled as version 5, which shares the v4 layout.
pub fn as_v5(sig: hkp_packet::Signature) -> hkp_packet::Signature {
    let mut raw = sig.to_bytes();
    let header_len = hkp_packet::header::read_header(&raw).unwrap().header_len;
    raw[header_len] = 5;
    hkp_packet::Signature::try_from(hkp_packet::Packet::decode(&raw).unwrap()).unwrap()
}

pub fn user_id(text: &str, sigs: Vec<hkp_packet::Signature>) -> UserId {
    let mut uid = UserId::new(hkp_packet::UserId::new(text));
    for s in sigs {
        uid.add_signature_packet(s).unwrap();
    }
    uid
}

pub fn user_attribute(image: &[u8], sigs: Vec<hkp_packet::Signature>) -> UserAttribute {
    let mut content = vec![0x10, 0x00, 0x01, 0x01];
    content.extend_from_slice(&[0u8; 12]);
    content.extend_from_slice(image);
    let mut uat = UserAttribute::new(OpaquePacket::user_attribute([(1, &content[..])]).unwrap()).unwrap();
    for s in sigs {
        uat.add_signature_packet(s).unwrap();
    }
    uat
}

pub fn subkey(seed: u8, sigs: Vec<hkp_packet::Signature>) -> Subkey {
    let mut sub = Subkey::new(subkey_packet(seed)).unwrap();
    for s in sigs {
        sub.add_signature_packet(s).unwrap();
    }
    sub
}

/// Every reversed identity in the tree, signatures tagged with their scope.
pub fn identities(key: &Pubkey) -> std::collections::BTreeSet<String> {
    use hkp_keyring::{PacketRecord, Record};
    let mut out = std::collections::BTreeSet::new();
    key.visit(&mut |record: Record<'_>| -> Result<(), ()> {
        let id = match record {
            Record::Signature(s) => format!("sig:{}:{}", s.scope(), s.scoped_digest()),
            other => format!("{}:{}", other.kind(), other.identity()),
        };
        out.insert(id);
        Ok(())
    })
    .unwrap();
    out
}
