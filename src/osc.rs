//! Minimal OSC codec for single-float messages
//!
//! The control plane only ever carries one message shape: an address pattern
//! like `/track/3/volume` with a single big-endian float32 argument. Encoding
//! follows the OSC 1.0 layout (NUL-terminated address padded to 4 bytes, the
//! `,f\0\0` type-tag block, then the value). Anything else on the wire is not
//! an error worth surfacing - a malformed datagram is dropped and the receive
//! loop keeps running.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Why a datagram was not accepted as an OSC float message.
///
/// These are diagnostic only; callers drop the datagram and carry on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscError {
    #[error("datagram too short ({0} bytes)")]
    TooShort(usize),
    #[error("address is not NUL-terminated")]
    UnterminatedAddress,
    #[error("address is not valid UTF-8")]
    BadAddress,
    #[error("unsupported type tag (expected ,f)")]
    BadTypeTag,
    #[error("truncated float argument")]
    TruncatedArgument,
}

/// Encode an OSC message with a single float32 argument.
pub fn encode(address: &str, value: f32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(address.len() + 12);

    buf.put_slice(address.as_bytes());
    buf.put_u8(0);
    while buf.len() % 4 != 0 {
        buf.put_u8(0);
    }

    // Type tag block: ",f" padded to 4 bytes
    buf.put_slice(b",f\0\0");

    buf.put_f32(value);
    buf
}

/// Decode an OSC message carrying exactly one float32 argument.
pub fn decode(data: &[u8]) -> Result<(String, f32), OscError> {
    if data.len() < 8 {
        return Err(OscError::TooShort(data.len()));
    }

    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(OscError::UnterminatedAddress)?;
    let address = std::str::from_utf8(&data[..nul])
        .map_err(|_| OscError::BadAddress)?
        .to_string();

    // Address block is padded so the type tag starts on a 4-byte boundary
    let padded_len = (nul + 1 + 3) & !3;

    let tag = data
        .get(padded_len..padded_len + 4)
        .ok_or(OscError::BadTypeTag)?;
    if tag != b",f\0\0" {
        return Err(OscError::BadTypeTag);
    }

    let mut arg = data
        .get(padded_len + 4..padded_len + 8)
        .ok_or(OscError::TruncatedArgument)?;
    let value = arg.get_f32();

    Ok((address, value))
}

/// Build the `/track/<id>/volume` address for a track id.
pub fn track_volume_address(track_id: u32) -> String {
    format!("/track/{}/volume", track_id)
}

/// Parse a `/track/<id>/volume` address back into a track id.
///
/// Returns `None` for any address that does not match the convention exactly,
/// including ids with leading zeros.
pub fn parse_track_volume_address(address: &str) -> Option<u32> {
    let id = address.strip_prefix("/track/")?.strip_suffix("/volume")?;
    if id.is_empty() || (id.len() > 1 && id.starts_with('0')) {
        return None;
    }
    if !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_bit_exact() {
        let encoded = encode("/track/3/volume", 0.75);
        let (address, value) = decode(&encoded).unwrap();
        assert_eq!(address, "/track/3/volume");
        assert_eq!(value.to_bits(), 0.75f32.to_bits());
    }

    #[test]
    fn test_encode_layout() {
        // "/a" + NUL + 1 pad byte = 4, tag = 4, float = 4
        let encoded = encode("/a", 1.0);
        assert_eq!(encoded.len(), 12);
        assert_eq!(&encoded[..4], b"/a\0\0");
        assert_eq!(&encoded[4..8], b",f\0\0");
        assert_eq!(&encoded[8..12], &1.0f32.to_be_bytes());
    }

    #[test]
    fn test_address_padding_when_len_is_multiple_of_four() {
        // "/abc" is 4 bytes; the NUL terminator forces a full pad block
        let encoded = encode("/abc", 2.5);
        assert_eq!(encoded.len(), 16);
        let (address, value) = decode(&encoded).unwrap();
        assert_eq!(address, "/abc");
        assert_eq!(value, 2.5);
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        assert_eq!(decode(b"/a\0\0"), Err(OscError::TooShort(4)));
    }

    #[test]
    fn test_decode_rejects_foreign_type_tag() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"/x\0\0");
        buf.put_slice(b",i\0\0");
        buf.put_i32(42);
        assert_eq!(decode(&buf), Err(OscError::BadTypeTag));
    }

    #[test]
    fn test_decode_rejects_truncated_argument() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"/x\0\0");
        buf.put_slice(b",f\0\0");
        buf.put_u8(0);
        assert_eq!(decode(&buf), Err(OscError::TruncatedArgument));
    }

    #[test]
    fn test_track_address_round_trip() {
        assert_eq!(
            parse_track_volume_address(&track_volume_address(12)),
            Some(12)
        );
        assert_eq!(parse_track_volume_address("/track/0/volume"), Some(0));
    }

    #[test]
    fn test_track_address_rejects_non_matching() {
        assert_eq!(parse_track_volume_address("/track/3/pan"), None);
        assert_eq!(parse_track_volume_address("/track//volume"), None);
        assert_eq!(parse_track_volume_address("/track/03/volume"), None);
        assert_eq!(parse_track_volume_address("/track/x/volume"), None);
        assert_eq!(parse_track_volume_address("/master/volume"), None);
    }
}
