//! Wire framing.
//!
//! ```text
//! 0x00 | u32 BE schema id | body
//! ```

use crate::core::constants::WIRE_MAGIC;
use crate::error::{Result, WireError};

const HEADER_LEN: usize = 5;

/// Prefix `body` with the magic byte and schema id.
pub fn frame(schema_id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(WIRE_MAGIC);
    out.extend_from_slice(&schema_id.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Split a message into its schema id and body.
///
/// # Errors
///
/// Returns `WireError::Truncated` for messages shorter than the header and
/// `WireError::UnknownMagic` for a wrong first byte.
pub fn unframe(message: &[u8]) -> Result<(u32, &[u8])> {
    if message.len() < HEADER_LEN {
        return Err(WireError::Truncated(message.len()).into());
    }
    if message[0] != WIRE_MAGIC {
        return Err(WireError::UnknownMagic(message[0]).into());
    }
    let id = u32::from_be_bytes([message[1], message[2], message[3], message[4]]);
    Ok((id, &message[HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let framed = frame(0x0102_0304, b"body");
        assert_eq!(framed, b"\x00\x01\x02\x03\x04body");
        assert_eq!(unframe(&framed).unwrap(), (0x0102_0304, &b"body"[..]));
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(unframe(&frame(7, b"")).unwrap(), (7, &b""[..]));
    }

    #[test]
    fn test_rejects_bad_header() {
        assert!(matches!(
            unframe(&[0, 0, 1]).unwrap_err(),
            crate::error::Error::Wire(WireError::Truncated(3))
        ));
        assert!(matches!(
            unframe(&[1, 0, 0, 0, 1]).unwrap_err(),
            crate::error::Error::Wire(WireError::UnknownMagic(1))
        ));
    }
}
