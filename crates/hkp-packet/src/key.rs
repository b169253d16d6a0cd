//! Public-Key and Public-Subkey packets.

use std::time::{Duration, UNIX_EPOCH};

use md5::Md5;
use sequoia_openpgp as openpgp;
use openpgp::packet::key::{Key4, PublicParts, UnspecifiedRole};
use openpgp::packet::Key;
use openpgp::serialize::SerializeInto;
use sha2::{Digest, Sha256};

use crate::error::{PacketError, Result};
use crate::header::{self, read_header};
use crate::packet::parse_openpgp;
use crate::{epoch_secs, PublicKeyAlgorithm, Tag};

/// Fixed fields of a key version sequoia does not read (v2, v3, v5).
#[derive(Debug, Clone)]
struct LegacyKey {
    version: u8,
    creation_time: u32,
    days_valid: Option<u16>,
    algorithm: PublicKeyAlgorithm,
    material_offset: usize,
}

impl LegacyKey {
    fn parse(body: &[u8], tag: Tag) -> Result<Self> {
        let version = *body.first().ok_or_else(|| PacketError::truncated("public key"))?;
        let (days_valid, algo_at, material_offset) = match version {
            2 | 3 => {
                let days = body.get(5..7).ok_or_else(|| PacketError::truncated("public key"))?;
                (Some(u16::from_be_bytes([days[0], days[1]])), 7, 8)
            }
            5 => {
                let declared = body.get(6..10).ok_or_else(|| PacketError::truncated("public key"))?;
                let declared =
                    u32::from_be_bytes([declared[0], declared[1], declared[2], declared[3]]) as usize;
                if body.len() - 10 != declared {
                    return Err(PacketError::malformed(format!(
                        "v5 key material length {} does not match body ({} octets)",
                        declared,
                        body.len() - 10
                    )));
                }
                (None, 5, 10)
            }
            other => {
                return Err(PacketError::UnsupportedVersion {
                    packet: tag,
                    version: other,
                })
            }
        };
        let created = body.get(1..5).ok_or_else(|| PacketError::truncated("public key"))?;
        if body.len() <= material_offset {
            return Err(PacketError::truncated("public key material"));
        }
        Ok(Self {
            version,
            creation_time: u32::from_be_bytes([created[0], created[1], created[2], created[3]]),
            days_valid,
            algorithm: PublicKeyAlgorithm::from(body[algo_at]),
            material_offset,
        })
    }
}

#[derive(Debug, Clone)]
enum Parsed {
    OpenPgp(Key<PublicParts, UnspecifiedRole>),
    Legacy(LegacyKey),
}

/// A Public-Key (tag 6) or Public-Subkey (tag 14) packet.
///
/// The packet bytes are kept verbatim; everything else is a parsed view.
#[derive(Debug, Clone)]
pub struct PublicKey {
    raw: Vec<u8>,
    header_len: usize,
    is_subkey: bool,
    parsed: Parsed,
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PublicKey {}

/// Leading MPI of `material`: value octets, bit count and the remainder.
fn read_mpi(material: &[u8]) -> Result<(&[u8], u16, &[u8])> {
    let bits = material.get(..2).ok_or_else(|| PacketError::truncated("MPI"))?;
    let bits = u16::from_be_bytes([bits[0], bits[1]]);
    let len = (bits as usize).div_ceil(8);
    let value = material
        .get(2..2 + len)
        .ok_or_else(|| PacketError::truncated("MPI"))?;
    Ok((value, bits, &material[2 + len..]))
}

impl PublicKey {
    /// Read one complete key packet.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let header = read_header(raw)?;
        let is_subkey = match header.tag {
            Tag::PublicKey => false,
            Tag::PublicSubkey => true,
            other => {
                return Err(PacketError::UnexpectedTag {
                    expected: Tag::PublicKey,
                    actual: other,
                })
            }
        };
        let body = header.body(raw)?;
        let version = *body.first().ok_or_else(|| PacketError::truncated("public key"))?;
        let parsed = match version {
            4 | 6 => match parse_openpgp(&raw[..header.packet_len()?])? {
                openpgp::Packet::PublicKey(key) => Parsed::OpenPgp(key.role_into_unspecified()),
                openpgp::Packet::PublicSubkey(key) => Parsed::OpenPgp(key.role_into_unspecified()),
                other => {
                    return Err(PacketError::UnexpectedTag {
                        expected: header.tag,
                        actual: other.tag(),
                    })
                }
            },
            _ => Parsed::Legacy(LegacyKey::parse(body, header.tag)?),
        };

        Ok(Self {
            raw: raw[..header.packet_len()?].to_vec(),
            header_len: header.header_len,
            is_subkey,
            parsed,
        })
    }

    /// Build a version 4 RSA key from modulus and exponent.
    pub fn new_rsa(creation_time: u32, n: &[u8], e: &[u8], is_subkey: bool) -> Result<Self> {
        let ctime = UNIX_EPOCH + Duration::from_secs(u64::from(creation_time));
        let key4: Key4<PublicParts, UnspecifiedRole> =
            Key4::import_public_rsa(e, n, Some(ctime)).map_err(PacketError::build)?;
        let key = Key::from(key4);
        let packet = if is_subkey {
            openpgp::Packet::from(key.role_into_subordinate())
        } else {
            openpgp::Packet::from(key.role_into_primary())
        };
        Self::from_bytes(&packet.to_vec().map_err(PacketError::build)?)
    }

    pub fn tag(&self) -> Tag {
        if self.is_subkey {
            Tag::PublicSubkey
        } else {
            Tag::PublicKey
        }
    }

    pub fn is_subkey(&self) -> bool {
        self.is_subkey
    }

    /// Same key material, re-tagged as a primary key or subkey.
    pub fn with_subkey_flag(mut self, is_subkey: bool) -> Self {
        if is_subkey != self.is_subkey {
            self.is_subkey = is_subkey;
            let raw = header::frame(self.tag(), self.body());
            self.header_len = raw.len() - self.body().len();
            self.raw = raw;
        }
        self
    }

    pub fn version(&self) -> u8 {
        match &self.parsed {
            Parsed::OpenPgp(key) => key.version(),
            Parsed::Legacy(legacy) => legacy.version,
        }
    }

    /// Creation time in seconds since the epoch
    pub fn creation_time(&self) -> u32 {
        match &self.parsed {
            Parsed::OpenPgp(key) => epoch_secs(key.creation_time()),
            Parsed::Legacy(legacy) => legacy.creation_time,
        }
    }

    /// Validity period carried by v2/v3 keys (days, 0 = forever)
    pub fn v3_days_valid(&self) -> Option<u16> {
        match &self.parsed {
            Parsed::OpenPgp(_) => None,
            Parsed::Legacy(legacy) => legacy.days_valid,
        }
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        match &self.parsed {
            Parsed::OpenPgp(key) => key.pk_algo(),
            Parsed::Legacy(legacy) => legacy.algorithm,
        }
    }

    /// Key size in bits, if the algorithm is understood.
    pub fn bit_length(&self) -> Option<u16> {
        match &self.parsed {
            Parsed::OpenPgp(key) => key.mpis().bits().and_then(|bits| u16::try_from(bits).ok()),
            Parsed::Legacy(legacy) => {
                // RSA, ElGamal and DSA lead with the modulus or prime
                if !matches!(u8::from(legacy.algorithm), 1 | 2 | 3 | 16 | 17 | 20) {
                    return None;
                }
                read_mpi(&self.body()[legacy.material_offset..])
                    .ok()
                    .map(|(_, bits, _)| bits)
            }
        }
    }

    /// Raw fingerprint octets.
    ///
    /// v4 and v6 come from sequoia. v2/v3 keys hash the RSA modulus and
    /// exponent with MD5; v5 keys hash `0x9a`, a four-octet length and the
    /// body with SHA-256.
    pub fn fingerprint(&self) -> Result<Vec<u8>> {
        let legacy = match &self.parsed {
            Parsed::OpenPgp(key) => return Ok(key.fingerprint().as_bytes().to_vec()),
            Parsed::Legacy(legacy) => legacy,
        };
        let body = self.body();
        if legacy.version == 5 {
            let mut h = Sha256::new();
            h.update([0x9a]);
            h.update((body.len() as u32).to_be_bytes());
            h.update(body);
            return Ok(h.finalize().to_vec());
        }
        let (n, _, rest) = read_mpi(&body[legacy.material_offset..])?;
        let (e, _, _) = read_mpi(rest)?;
        let mut h = Md5::new();
        h.update(n);
        h.update(e);
        Ok(h.finalize().to_vec())
    }

    /// Parsed sequoia key, for v4 and v6 keys.
    pub fn openpgp(&self) -> Option<&Key<PublicParts, UnspecifiedRole>> {
        match &self.parsed {
            Parsed::OpenPgp(key) => Some(key),
            Parsed::Legacy(_) => None,
        }
    }

    /// Packet body, without the header
    pub fn body(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3_body() -> Vec<u8> {
        let mut body = vec![3];
        body.extend_from_slice(&1_000_000u32.to_be_bytes());
        body.extend_from_slice(&30u16.to_be_bytes());
        body.push(1);
        body.extend_from_slice(&1024u16.to_be_bytes());
        body.extend_from_slice(&[0xaa; 128]);
        body.extend_from_slice(&5u16.to_be_bytes());
        body.push(0x11);
        body
    }

    #[test]
    fn test_v4_rsa_key() {
        let key = PublicKey::new_rsa(1_400_000_000, &[0xc5; 256], &[0x01, 0x00, 0x01], false).unwrap();
        let parsed = PublicKey::from_bytes(key.as_bytes()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.version(), 4);
        assert_eq!(parsed.creation_time(), 1_400_000_000);
        assert_eq!(parsed.algorithm(), PublicKeyAlgorithm::RSAEncryptSign);
        assert_eq!(parsed.bit_length(), Some(2048));
        assert_eq!(parsed.fingerprint().unwrap().len(), 20);
        assert!(parsed.openpgp().is_some());
    }

    #[test]
    fn test_v4_fingerprint() {
        let key = PublicKey::new_rsa(1_234_567_890, &[0xd1; 256], &[1, 0, 1], false).unwrap();
        let expected = key.openpgp().unwrap().fingerprint();
        assert_eq!(key.fingerprint().unwrap(), expected.as_bytes());
        assert_eq!(key.fingerprint().unwrap().len(), 20);
    }

    #[test]
    fn test_subkey_flag() {
        let key = PublicKey::new_rsa(1, &[0x77; 64], &[3], false).unwrap();
        let sub = key.clone().with_subkey_flag(true);
        assert!(sub.is_subkey());
        assert_eq!(sub.tag(), Tag::PublicSubkey);
        assert_eq!(sub.body(), key.body());
        assert_eq!(sub.fingerprint().unwrap(), key.fingerprint().unwrap());
        assert_eq!(PublicKey::from_bytes(sub.as_bytes()).unwrap(), sub);
    }

    #[test]
    fn test_v3_key() {
        let raw = header::frame(Tag::PublicKey, &v3_body());
        let key = PublicKey::from_bytes(&raw).unwrap();
        assert_eq!(key.version(), 3);
        assert_eq!(key.creation_time(), 1_000_000);
        assert_eq!(key.v3_days_valid(), Some(30));
        assert_eq!(key.bit_length(), Some(1024));
        assert!(key.openpgp().is_none());

        let mut h = Md5::new();
        h.update([0xaa; 128]);
        h.update([0x11]);
        assert_eq!(key.fingerprint().unwrap(), h.finalize().to_vec());
    }

    #[test]
    fn test_v5_key_fingerprint() {
        let material = [0x01, 0x00, 0x01];
        let mut body = vec![5];
        body.extend_from_slice(&7u32.to_be_bytes());
        body.push(22);
        body.extend_from_slice(&(material.len() as u32).to_be_bytes());
        body.extend_from_slice(&material);
        let key = PublicKey::from_bytes(&header::frame(Tag::PublicKey, &body)).unwrap();
        assert_eq!(key.version(), 5);
        assert_eq!(key.creation_time(), 7);
        assert_eq!(key.fingerprint().unwrap().len(), 32);
    }

    #[test]
    fn test_rejects_unknown_version_and_truncation() {
        let raw = header::frame(Tag::PublicKey, &[7, 0, 0, 0, 0, 1, 1]);
        assert!(matches!(
            PublicKey::from_bytes(&raw),
            Err(PacketError::UnsupportedVersion { version: 7, .. })
        ));
        assert!(PublicKey::from_bytes(&header::frame(Tag::PublicKey, &[3, 0, 0])).is_err());
        assert!(PublicKey::from_bytes(&header::frame(Tag::PublicKey, &[4, 0, 0])).is_err());
        assert!(PublicKey::from_bytes(&header::frame(Tag::PublicSubkey, &[])).is_err());
    }
}
