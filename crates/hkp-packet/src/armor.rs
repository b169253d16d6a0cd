//! ASCII armor, via sequoia's armor reader and writer.
//!
//! Key submissions often paste several armored blocks into one body, with
//! text in between. Each block is located here and handed to sequoia on
//! its own; the payloads are concatenated.

use std::io::{Read, Write};

use sequoia_openpgp as openpgp;
use openpgp::armor::{Reader, ReaderMode, Writer};

use crate::error::{PacketError, Result};

pub use openpgp::armor::Kind;

const BEGIN: &str = "-----BEGIN PGP ";
const END: &str = "-----END ";

/// True if `input` looks like it contains an armored block.
pub fn is_armored(input: &[u8]) -> bool {
    input.windows(BEGIN.len()).any(|w| w == BEGIN.as_bytes())
}

/// Decode every armored block in `text` and concatenate their payloads.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut rest = text;
    let mut blocks = 0;

    while let Some(start) = rest.find(BEGIN) {
        let block = &rest[start..];
        let end_marker = block
            .find(END)
            .ok_or_else(|| PacketError::Armor("missing armor tail line".to_string()))?;
        let end = block[end_marker..]
            .find('\n')
            .map(|nl| end_marker + nl + 1)
            .unwrap_or(block.len());

        Reader::from_bytes(block[..end].as_bytes(), ReaderMode::Tolerant(None))
            .read_to_end(&mut out)
            .map_err(|e| PacketError::Armor(e.to_string()))?;
        blocks += 1;
        rest = &block[end..];
    }

    if blocks == 0 {
        return Err(PacketError::Armor("no armored block found".to_string()));
    }
    Ok(out)
}

/// Armor `data` as a single block.
pub fn encode(data: &[u8], kind: Kind) -> Result<String> {
    let mut writer =
        Writer::new(Vec::new(), kind).map_err(|e| PacketError::Armor(e.to_string()))?;
    writer
        .write_all(data)
        .map_err(|e| PacketError::Armor(e.to_string()))?;
    let bytes = writer
        .finalize()
        .map_err(|e| PacketError::Armor(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| PacketError::Armor(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PublicKey, UserId};

    fn sample_packets() -> Vec<u8> {
        let mut data = PublicKey::new_rsa(1_400_000_000, &[0xc3; 128], &[1, 0, 1], false)
            .unwrap()
            .to_bytes();
        data.extend(UserId::new("armor <armor@example.org>").to_bytes());
        data
    }

    #[test]
    fn test_encode_decode() {
        let data = sample_packets();
        let armored = encode(&data, Kind::PublicKey).unwrap();
        assert!(armored.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
        assert!(is_armored(armored.as_bytes()));
        assert_eq!(decode(&armored).unwrap(), data);
    }

    #[test]
    fn test_decode_concatenates_blocks() {
        let first = encode(&sample_packets(), Kind::PublicKey).unwrap();
        let second = encode(&UserId::new("second").to_bytes(), Kind::PublicKey).unwrap();
        let text = format!("junk before\n{}between\n{}", first, second);

        let mut expected = sample_packets();
        expected.extend(UserId::new("second").to_bytes());
        assert_eq!(decode(&text).unwrap(), expected);
    }

    #[test]
    fn test_unterminated_block() {
        let armored = encode(&sample_packets(), Kind::PublicKey).unwrap();
        let cut: String = armored.lines().take(3).collect::<Vec<_>>().join("\n");
        assert!(decode(&cut).is_err());
        assert!(decode("no armor here").is_err());
        assert!(!is_armored(b"no armor here"));
    }
}
