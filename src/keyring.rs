//! Reading and writing transferable public keys.
//!
//! A keyring is a flat packet stream: each primary key is followed by its
//! direct signatures, then user IDs, user attributes and subkeys, each
//! trailed by the signatures made over it.

use std::io::{self, Write};

use hkp_packet::armor::{self, Kind};
use hkp_packet::header::read_header;
use hkp_packet::{Packet, PacketError, Tag};
use tracing::{debug, warn};

use crate::error::{ModelError, ModelResult};
use crate::model::{PacketRecord, Pubkey, Record, Signable, Subkey, UserAttribute, UserId};

/// Errors from keyring input and output
#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("keyring I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{tag} found before any public key packet")]
    NoPrimaryKey { tag: Tag },
}

/// Where the next signature in the stream belongs.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Key,
    UserId(usize),
    UserAttribute(usize),
    Subkey(usize),
    /// Following a component that could not be read
    Orphaned,
}

#[derive(Default)]
struct Parser {
    keys: Vec<Pubkey>,
    current: Option<(Pubkey, Slot)>,
    /// Primary key was unreadable; drop everything up to the next one
    skipping: bool,
}

impl Parser {
    fn finish_key(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.keys.push(key);
        }
    }

    fn primary(&mut self, decoded: Result<Packet, PacketError>) {
        self.finish_key();
        match decoded.map_err(ModelError::from).and_then(|p| {
            let key = hkp_packet::PublicKey::try_from(p)?;
            Pubkey::new(key)
        }) {
            Ok(key) => {
                self.current = Some((key, Slot::Key));
                self.skipping = false;
            }
            Err(err) => {
                warn!(error = %err, "skipping unreadable primary key and its components");
                self.skipping = true;
            }
        }
    }

    fn component(&mut self, tag: Tag, decoded: Result<Packet, PacketError>) -> Result<(), KeyringError> {
        if self.skipping {
            debug!(%tag, "skipping packet of unreadable key");
            return Ok(());
        }
        let Some((key, slot)) = self.current.as_mut() else {
            return Err(KeyringError::NoPrimaryKey { tag });
        };
        let packet = match decoded {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%tag, error = %err, "skipping malformed packet");
                if tag != Tag::Signature {
                    *slot = Slot::Orphaned;
                }
                return Ok(());
            }
        };
        let attached: ModelResult<()> = match packet {
            Packet::Signature(sig) => attach_signature(key, *slot, sig),
            Packet::UserId(uid) => {
                *slot = Slot::UserId(key.add_user_id(UserId::new(uid)));
                Ok(())
            }
            Packet::PublicKey(sub) => Subkey::new(sub).map(|sub| {
                *slot = Slot::Subkey(key.add_subkey(sub));
            }),
            Packet::Opaque(opaque) if opaque.tag() == Tag::UserAttribute => {
                UserAttribute::new(opaque).map(|uat| {
                    *slot = Slot::UserAttribute(key.add_user_attribute(uat));
                })
            }
            Packet::Opaque(other) => {
                debug!(tag = %other.tag(), "ignoring packet");
                Ok(())
            }
        };
        if let Err(err) = attached {
            warn!(%tag, error = %err, "dropping packet");
            if tag != Tag::Signature {
                *slot = Slot::Orphaned;
            }
        }
        Ok(())
    }
}

fn attach_signature(key: &mut Pubkey, slot: Slot, sig: hkp_packet::Signature) -> ModelResult<()> {
    let added = match slot {
        Slot::Key => key.add_signature_packet(sig)?,
        Slot::UserId(at) => key.user_ids_mut()[at].add_signature_packet(sig)?,
        Slot::UserAttribute(at) => key.user_attributes_mut()[at].add_signature_packet(sig)?,
        Slot::Subkey(at) => key.subkeys_mut()[at].add_signature_packet(sig)?,
        Slot::Orphaned => {
            debug!("dropping signature over unreadable component");
            return Ok(());
        }
    };
    if !added {
        debug!("duplicate signature ignored");
    }
    Ok(())
}

/// Parse a binary keyring into key trees.
///
/// Unreadable packets are skipped with a warning as long as the framing
/// holds; broken framing ends the read with an error. Resolution is left
/// to the caller (see `Pubkey::recompute`).
pub fn read_keys(data: &[u8]) -> Result<Vec<Pubkey>, KeyringError> {
    let mut parser = Parser::default();
    let mut rest = data;
    while !rest.is_empty() {
        let header = read_header(rest)?;
        let end = header
            .header_len
            .checked_add(header.body_len)
            .filter(|end| *end <= rest.len())
            .ok_or_else(|| PacketError::Malformed("truncated packet body".to_string()))?;
        let decoded = Packet::decode(&rest[..end]);
        rest = &rest[end..];

        match header.tag {
            Tag::PublicKey => parser.primary(decoded),
            tag => parser.component(tag, decoded)?,
        }
    }
    parser.finish_key();
    debug!(keys = parser.keys.len(), octets = data.len(), "read keyring");
    Ok(parser.keys)
}

/// Parse every armored block in `text`.
pub fn read_armored_keys(text: &str) -> Result<Vec<Pubkey>, KeyringError> {
    read_keys(&armor::decode(text)?)
}

/// Parse binary or armored input, whichever it is.
pub fn read_any(data: &[u8]) -> Result<Vec<Pubkey>, KeyringError> {
    if armor::is_armored(data) {
        let text = std::str::from_utf8(data)
            .map_err(|e| PacketError::Armor(format!("armored input is not UTF-8: {}", e)))?;
        read_armored_keys(text)
    } else {
        read_keys(data)
    }
}

/// Write the stored packets of a key in transferable order.
pub fn write_key<W: Write>(key: &Pubkey, w: &mut W) -> io::Result<()> {
    key.visit(&mut |record: Record<'_>| w.write_all(record.packet_bytes()))
}

pub fn to_bytes(key: &Pubkey) -> Vec<u8> {
    let mut out = Vec::new();
    append_packets(key, &mut out);
    out
}

fn append_packets(key: &Pubkey, out: &mut Vec<u8>) {
    let _ = key.visit(&mut |record: Record<'_>| -> Result<(), std::convert::Infallible> {
        out.extend_from_slice(record.packet_bytes());
        Ok(())
    });
}

/// One armored block holding all `keys`.
pub fn to_armored(keys: &[Pubkey]) -> Result<String, KeyringError> {
    let mut out = Vec::new();
    for key in keys {
        append_packets(key, &mut out);
    }
    Ok(armor::encode(&out, Kind::PublicKey)?)
}
