//! Packet boundaries.
//!
//! Sequoia parses packet contents but re-frames whatever it serializes.
//! Key material in the wild mixes old (RFC 1991) and new CTB formats and
//! does not always use the shortest length field, so packet boundaries
//! are found here and each packet's bytes are kept exactly as read.

use crate::error::{PacketError, Result};
use crate::Tag;

/// A packet header read off the front of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    /// Octets taken by the CTB and the length field
    pub header_len: usize,
    pub body_len: usize,
}

impl Header {
    /// Header plus body.
    pub fn packet_len(&self) -> Result<usize> {
        self.header_len
            .checked_add(self.body_len)
            .ok_or_else(|| PacketError::truncated("packet body"))
    }

    /// The body of the packet at the front of `raw`.
    pub fn body<'a>(&self, raw: &'a [u8]) -> Result<&'a [u8]> {
        let end = self.packet_len()?;
        raw.get(self.header_len..end)
            .ok_or_else(|| PacketError::truncated("packet body"))
    }
}

/// Read a packet header from the front of `input`.
///
/// Partial and indeterminate lengths are refused: neither may appear in
/// key material.
pub fn read_header(input: &[u8]) -> Result<Header> {
    let ctb = *input.first().ok_or_else(|| PacketError::truncated("packet header"))?;
    if ctb & 0x80 == 0 {
        return Err(PacketError::malformed(format!(
            "invalid CTB 0x{:02x}: high bit not set",
            ctb
        )));
    }

    if ctb & 0x40 == 0 {
        let tag = Tag::from((ctb >> 2) & 0x0f);
        let width = match ctb & 0x03 {
            0 => 1,
            1 => 2,
            2 => 4,
            _ => {
                return Err(PacketError::malformed(
                    "indeterminate length is not allowed for key material",
                ))
            }
        };
        let field = input
            .get(1..1 + width)
            .ok_or_else(|| PacketError::truncated("packet length"))?;
        let body_len = field.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        return Ok(Header {
            tag,
            header_len: 1 + width,
            body_len,
        });
    }

    let tag = Tag::from(ctb & 0x3f);
    let first = *input.get(1).ok_or_else(|| PacketError::truncated("packet length"))?;
    let (header_len, body_len) = match first {
        0..=191 => (2, first as usize),
        192..=223 => {
            let second = *input.get(2).ok_or_else(|| PacketError::truncated("packet length"))?;
            (3, ((first as usize - 192) << 8) + second as usize + 192)
        }
        255 => {
            let field = input
                .get(2..6)
                .ok_or_else(|| PacketError::truncated("packet length"))?;
            let len = u32::from_be_bytes([field[0], field[1], field[2], field[3]]);
            (6, len as usize)
        }
        _ => {
            return Err(PacketError::malformed(
                "partial body lengths are not allowed for key material",
            ))
        }
    };

    Ok(Header {
        tag,
        header_len,
        body_len,
    })
}

/// Frame `body` as a new-format packet with the shortest length field.
pub fn frame(tag: Tag, body: &[u8]) -> Vec<u8> {
    let len = body.len();
    let mut out = Vec::with_capacity(len + 6);
    out.push(0xc0 | u8::from(tag));
    match len {
        0..=191 => out.push(len as u8),
        192..=8383 => {
            let adjusted = len - 192;
            out.push(((adjusted >> 8) + 192) as u8);
            out.push((adjusted & 0xff) as u8);
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_format_two_octet() {
        // 0x99: old format, tag 6, two-octet length
        let header = read_header(&[0x99, 0x01, 0x0d]).unwrap();
        assert_eq!(header.tag, Tag::PublicKey);
        assert_eq!(header.header_len, 3);
        assert_eq!(header.body_len, 269);
    }

    #[test]
    fn test_old_format_wide_length_for_small_body() {
        let packet = [0x89, 0x00, 0x03, 1, 2, 3];
        let header = read_header(&packet).unwrap();
        assert_eq!(header.tag, Tag::Signature);
        assert_eq!(header.body(&packet).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_new_format_lengths() {
        for len in [0usize, 191, 192, 8383, 8384, 70000] {
            let body = vec![0u8; len];
            let packet = frame(Tag::UserID, &body);
            let header = read_header(&packet).unwrap();
            assert_eq!(header.body_len, len, "length {}", len);
            assert_eq!(header.packet_len().unwrap(), packet.len());
            assert_eq!(header.tag, Tag::UserID);
        }
    }

    #[test]
    fn test_high_tags_use_new_format() {
        let packet = frame(Tag::UserAttribute, &[0u8; 4]);
        assert_eq!(packet[0], 0xc0 | 17);
    }

    #[test]
    fn test_rejects_bad_ctb() {
        assert!(read_header(&[0x00, 0x01]).is_err());
        assert!(read_header(&[]).is_err());
        // old format indeterminate length
        assert!(read_header(&[0x9b]).is_err());
        // new format partial length
        assert!(read_header(&[0xc2, 0xe1]).is_err());
        // truncated two-octet length
        assert!(read_header(&[0xc2, 0xc5]).is_err());
    }

    #[test]
    fn test_body_past_end() {
        let header = read_header(&[0xcd, 0x05, b'a']).unwrap();
        assert!(header.body(&[0xcd, 0x05, b'a']).is_err());
    }
}
