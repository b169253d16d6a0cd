//! Keyring read/write integration tests

mod common;

use common::*;
use hkp_keyring::keyring::to_bytes;
use hkp_keyring::{read_any, read_keys, sks_digest, to_armored, write_key, EntityState, Signable};
use hkp_packet::SignatureType;

fn full_key() -> hkp_keyring::Pubkey {
    let mut key = bare_key(20);
    let me = issuer_of(&key);
    key.add_signature_packet(sig(SignatureType::DirectKey, me, KEY_CREATED + 1, |b| b))
        .unwrap();
    key.add_user_id(user_id(
        "Frank <frank@example.net>",
        vec![
            sig(SignatureType::PositiveCertification, me, KEY_CREATED + 2, |b| b.primary_userid()),
            sig(SignatureType::GenericCertification, [5; 8], KEY_CREATED + 3, |b| b),
        ],
    ));
    key.add_user_attribute(user_attribute(
        b"\xff\xd8\xff",
        vec![sig(SignatureType::PositiveCertification, me, KEY_CREATED + 4, |b| b)],
    ));
    key.add_subkey(subkey(
        3,
        vec![sig(SignatureType::SubkeyBinding, me, KEY_CREATED + 5, |b| b)],
    ));
    key.recompute(&ctx(KEY_CREATED + 100));
    key
}

// =============================================================================
// Binary round trip
// =============================================================================

#[test]
fn test_binary_round_trip() {
    let key = full_key();
    let bytes = to_bytes(&key);

    let mut read = read_keys(&bytes).unwrap();
    assert_eq!(read.len(), 1);
    read[0].recompute(&ctx(KEY_CREATED + 100));
    assert_eq!(read[0], key);
    assert_eq!(to_bytes(&read[0]), bytes);

    let mut written = Vec::new();
    write_key(&read[0], &mut written).unwrap();
    assert_eq!(written, bytes);
}

#[test]
fn test_resolved_state_after_read() {
    let key = full_key();
    assert_eq!(key.state(), EntityState::Valid);
    assert!(key.self_signature().is_some());
    assert_eq!(
        key.primary_user_id().map(|u| u.keywords()),
        Some("Frank <frank@example.net>")
    );
    assert!(key.user_attributes()[0].self_signature().is_some());
    assert!(key.subkeys()[0].binding().is_some());
}

#[test]
fn test_old_format_framing_survives() {
    let primary = primary_packet(21).to_bytes();
    // old-format CTB for tag 13 with a one-octet length
    let mut uid = vec![0xb4, 5];
    uid.extend_from_slice(b"Grace");
    let mut input = primary.clone();
    input.extend_from_slice(&uid);

    let keys = read_keys(&input).unwrap();
    assert_eq!(keys[0].user_ids()[0].keywords(), "Grace");
    assert_eq!(keys[0].user_ids()[0].packet_bytes(), &uid[..]);
    assert_eq!(to_bytes(&keys[0]), input);
}

#[test]
fn test_v5_signatures_round_trip() {
    let mut key = bare_key(23);
    let me = issuer_of(&key);
    let cert = as_v5(sig(
        SignatureType::PositiveCertification,
        me,
        KEY_CREATED + 2,
        |b| b.key_lifetime(86_400),
    ));
    assert_eq!(cert.version(), 5);
    key.add_user_id(user_id("Heidi <heidi@example.org>", vec![cert.clone()]));
    key.recompute(&ctx(KEY_CREATED + 100));

    let bytes = to_bytes(&key);
    assert!(bytes.windows(cert.as_bytes().len()).any(|w| w == cert.as_bytes()));

    let mut read = read_keys(&bytes).unwrap();
    read[0].recompute(&ctx(KEY_CREATED + 100));
    assert_eq!(read[0], key);
    assert_eq!(to_bytes(&read[0]), bytes);

    let uid = &read[0].user_ids()[0];
    let self_sig = uid.self_signature().unwrap();
    assert_eq!(self_sig.packet_bytes(), cert.as_bytes());
    assert_eq!(self_sig.key_lifetime(), Some(86_400));
}

// =============================================================================
// Armor
// =============================================================================

#[test]
fn test_armored_keyring_with_several_keys() {
    let keys = vec![full_key(), bare_key(22)];
    let armored = to_armored(&keys).unwrap();
    assert!(armored.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));

    let read = read_any(armored.as_bytes()).unwrap();
    assert_eq!(read.len(), 2);
    assert_eq!(read[0].rfingerprint(), keys[0].rfingerprint());
    assert_eq!(read[1].rfingerprint(), keys[1].rfingerprint());
    assert_eq!(sks_digest(&read[0]), sks_digest(&keys[0]));
}

#[test]
fn test_garbage_is_an_error() {
    assert!(read_any(b"\x00\x01\x02").is_err());
    assert!(read_any(b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n!!!\n").is_err());
}

#[test]
fn test_empty_input_has_no_keys() {
    assert!(read_keys(&[]).unwrap().is_empty());
}
