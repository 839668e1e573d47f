//! WebSocket frame codec (RFC 6455 Section 5.2-5.3).
//!
//! Pure functions between byte buffers and [`Frame`]s:
//!
//! - [`decode`]: Parse exactly one client frame from a buffer
//! - [`encode`]: Render a frame, optionally masked with a random key
//! - [`encode_with_key`]: Same, with a caller-supplied mask key
//! - [`apply_mask`]: Symmetric XOR masking
//!
//! # Wire Layout
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |     Masking-key (if MASK set) |          Payload Data         |
//! +-------------------------------+-------------------------------+
//! ```
//!
//! A frame must arrive whole in one buffer. Reassembly across reads and
//! fragmented messages are not supported.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// FIN flag in byte 0.
const FIN_BIT: u8 = 0b1000_0000;

/// Opcode bits in byte 0.
const OPCODE_BITS: u8 = 0b0000_1111;

/// MASK flag in byte 1.
const MASK_BIT: u8 = 0b1000_0000;

/// Base length bits in byte 1.
const LENGTH_BITS: u8 = 0b0111_1111;

/// Base length marker for a 16-bit extended length.
const LENGTH_16: u8 = 126;

/// Base length marker for a 64-bit extended length.
const LENGTH_64: u8 = 127;

/// Smallest possible frame: byte 0 and byte 1.
pub const MIN_FRAME_LEN: usize = 2;

/// Largest header: 2 + 8 (extended length) + 4 (mask key).
pub const MAX_HEADER_LEN: usize = 14;

// ============================================================================
// Opcode
// ============================================================================

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text payload.
    Text = 0x1,
    /// Binary payload.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl Opcode {
    /// Parses a 4-bit opcode. Returns `None` for reserved values.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Returns the raw 4-bit value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for opcodes carrying application payload.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Continuation | Self::Text | Self::Binary)
    }

    /// Returns `true` for close, ping and pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        !self.is_data()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// FIN flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
}

// ============================================================================
// Masking
// ============================================================================

/// XORs `payload` in place with the 4-byte mask key.
///
/// Applying the same key twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one client frame occupying the whole of `buffer`.
///
/// # Errors
///
/// - [`Error::FrameTooShort`] if the buffer ends inside the header
/// - [`Error::UnsupportedOpcode`] for anything but continuation, text,
///   binary, close and ping
/// - [`Error::ClientMustMask`] if a data frame is unmasked
/// - [`Error::FrameLengthMismatch`] if the bytes after the header differ
///   from the declared payload length
pub fn decode(buffer: &[u8]) -> Result<Frame> {
    if buffer.len() < MIN_FRAME_LEN {
        return Err(Error::frame_too_short(buffer.len()));
    }

    let fin = buffer[0] & FIN_BIT != 0;
    let raw_opcode = buffer[0] & OPCODE_BITS;
    let opcode = match Opcode::from_u8(raw_opcode) {
        Some(opcode) if opcode != Opcode::Pong => opcode,
        _ => return Err(Error::unsupported_opcode(raw_opcode)),
    };

    let masked = buffer[1] & MASK_BIT != 0;
    if opcode.is_data() && !masked {
        return Err(Error::ClientMustMask);
    }

    let (declared, mut offset) = match buffer[1] & LENGTH_BITS {
        LENGTH_16 => {
            let raw = read_array::<2>(buffer, 2)?;
            (u64::from(u16::from_be_bytes(raw)), 4)
        }
        LENGTH_64 => {
            let raw = read_array::<8>(buffer, 2)?;
            (u64::from_be_bytes(raw), 10)
        }
        inline => (u64::from(inline), 2),
    };

    let mask_key = if masked {
        let key = read_array::<4>(buffer, offset)?;
        offset += 4;
        Some(key)
    } else {
        None
    };

    let actual = (buffer.len() - offset) as u64;
    if declared != actual {
        return Err(Error::frame_length_mismatch(declared, actual));
    }

    let mut payload = buffer[offset..].to_vec();
    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

/// Copies `N` header bytes starting at `offset`.
fn read_array<const N: usize>(buffer: &[u8], offset: usize) -> Result<[u8; N]> {
    buffer
        .get(offset..offset + N)
        .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
        .ok_or_else(|| Error::frame_too_short(buffer.len()))
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a single FIN frame.
///
/// Server frames are normally unmasked; `mask = true` picks a random key
/// the way a client would.
#[must_use]
pub fn encode(payload: &[u8], opcode: Opcode, mask: bool) -> Vec<u8> {
    let mask_key = mask.then(rand::random::<[u8; 4]>);
    encode_with_key(payload, opcode, mask_key)
}

/// Encodes a single FIN frame, masked with `mask_key` when given.
#[must_use]
pub fn encode_with_key(payload: &[u8], opcode: Opcode, mask_key: Option<[u8; 4]>) -> Vec<u8> {
    let len = payload.len();
    let mask_flag = if mask_key.is_some() { MASK_BIT } else { 0 };

    let mut out = Vec::with_capacity(MAX_HEADER_LEN + len);
    out.push(FIN_BIT | opcode.as_u8());

    if len < usize::from(LENGTH_16) {
        out.push(mask_flag | len as u8);
    } else if let Ok(len) = u16::try_from(len) {
        out.push(mask_flag | LENGTH_16);
        out.extend_from_slice(&len.to_be_bytes());
    } else {
        out.push(mask_flag | LENGTH_64);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask_key {
        Some(key) => {
            out.extend_from_slice(&key);
            let start = out.len();
            out.extend_from_slice(payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.extend_from_slice(payload),
    }

    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    /// Masked "Hello" from RFC 6455 Section 5.7.
    const MASKED_HELLO: [u8; 11] = [
        0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
    ];

    #[test]
    fn test_decode_rfc_masked_text() {
        let frame = decode(&MASKED_HELLO).expect("valid frame");
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"Hello");
    }

    #[test]
    fn test_decode_unmasked_text_requires_mask() {
        let frame = [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        assert!(matches!(decode(&frame), Err(Error::ClientMustMask)));
    }

    #[test]
    fn test_decode_unmasked_data_opcodes_require_mask() {
        for opcode in [Opcode::Continuation, Opcode::Text, Opcode::Binary] {
            let frame = encode_with_key(b"abc", opcode, None);
            assert!(matches!(decode(&frame), Err(Error::ClientMustMask)));
        }
    }

    #[test]
    fn test_decode_unmasked_ping() {
        let frame = [0x89, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let frame = decode(&frame).expect("ping may be unmasked");
        assert_eq!(frame.opcode, Opcode::Ping);
        assert_eq!(frame.payload, b"Hello");
    }

    #[test]
    fn test_decode_masked_close() {
        let encoded = encode_with_key(&1000u16.to_be_bytes(), Opcode::Close, Some([1, 2, 3, 4]));
        let frame = decode(&encoded).expect("valid close");
        assert_eq!(frame.opcode, Opcode::Close);
        assert_eq!(frame.payload, vec![0x03, 0xE8]);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(decode(&[]), Err(Error::FrameTooShort { len: 0 })));
        assert!(matches!(decode(&[0x81]), Err(Error::FrameTooShort { len: 1 })));
        // Masked, but the key is cut off.
        assert!(matches!(
            decode(&[0x81, 0x85, 0x37, 0xfa]),
            Err(Error::FrameTooShort { len: 4 })
        ));
        // 16-bit length marker without the length bytes.
        assert!(matches!(
            decode(&[0x82, 0xFE, 0x01]),
            Err(Error::FrameTooShort { .. })
        ));
    }

    #[test]
    fn test_decode_unsupported_opcodes() {
        for raw in [0x3, 0x7, 0xA, 0xB, 0xF] {
            let buffer = [0x80 | raw, 0x80, 0, 0, 0, 0];
            match decode(&buffer) {
                Err(Error::UnsupportedOpcode { opcode }) => assert_eq!(opcode, raw),
                other => panic!("expected unsupported opcode, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut encoded = encode_with_key(b"hello", Opcode::Text, Some([9, 8, 7, 6]));
        encoded.pop();
        assert!(matches!(
            decode(&encoded),
            Err(Error::FrameLengthMismatch {
                declared: 5,
                actual: 4
            })
        ));

        let mut encoded = encode_with_key(b"hello", Opcode::Text, Some([9, 8, 7, 6]));
        encoded.push(0);
        assert!(matches!(
            decode(&encoded),
            Err(Error::FrameLengthMismatch {
                declared: 5,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_decode_16bit_length_is_big_endian() {
        let payload = vec![0x5A; 256];
        let encoded = encode_with_key(&payload, Opcode::Binary, Some([0, 0, 0, 0]));
        assert_eq!(&encoded[..4], &[0x82, 0x80 | 126, 0x01, 0x00]);

        let frame = decode(&encoded).expect("valid frame");
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_decode_64bit_length_is_big_endian() {
        let payload = vec![0xA5; 65536];
        let encoded = encode_with_key(&payload, Opcode::Binary, Some([1, 1, 1, 1]));
        assert_eq!(
            &encoded[..10],
            &[0x82, 0x80 | 127, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00]
        );

        let frame = decode(&encoded).expect("valid frame");
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_encode_unmasked_layout() {
        assert_eq!(
            encode(b"Hello", Opcode::Text, false),
            vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]
        );
        assert_eq!(encode(&[], Opcode::Pong, false), vec![0x8A, 0x00]);
    }

    #[test]
    fn test_encode_with_rfc_key() {
        let encoded = encode_with_key(b"Hello", Opcode::Text, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(encoded, MASKED_HELLO);
    }

    #[test]
    fn test_encode_length_tiers() {
        assert_eq!(encode(&[0; 125], Opcode::Binary, false)[1], 125);
        assert_eq!(encode(&[0; 126], Opcode::Binary, false)[1], 126);
        assert_eq!(encode(&vec![0; 65535], Opcode::Binary, false)[1], 126);
        assert_eq!(encode(&vec![0; 65536], Opcode::Binary, false)[1], 127);
    }

    #[test]
    fn test_round_trip_boundary_lengths() {
        for len in [0usize, 1, 125, 126, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let encoded = encode(&payload, Opcode::Binary, true);
            assert_ne!(encoded[1] & MASK_BIT, 0);

            let frame = decode(&encoded).expect("round trip");
            assert_eq!(frame.opcode, Opcode::Binary);
            assert_eq!(frame.payload, payload, "length {len}");
        }
    }

    #[test]
    fn test_apply_mask_is_involution() {
        let key = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut data = b"some payload".to_vec();
        apply_mask(&mut data, key);
        assert_ne!(data, b"some payload");
        apply_mask(&mut data, key);
        assert_eq!(data, b"some payload");
    }

    #[test]
    fn test_opcode_helpers() {
        assert!(Opcode::Text.is_data());
        assert!(Opcode::Ping.is_control());
        assert_eq!(Opcode::from_u8(0xA), Some(Opcode::Pong));
        assert_eq!(Opcode::from_u8(0x3), None);
        assert_eq!(Opcode::Close.to_string(), "close");
    }

    proptest! {
        #[test]
        fn prop_masked_round_trip(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            key in any::<[u8; 4]>(),
            text in any::<bool>(),
        ) {
            let opcode = if text { Opcode::Text } else { Opcode::Binary };
            let encoded = encode_with_key(&payload, opcode, Some(key));
            let frame = decode(&encoded).expect("round trip");
            prop_assert_eq!(frame.opcode, opcode);
            prop_assert_eq!(frame.payload, payload);
        }

        #[test]
        fn prop_truncated_frame_never_decodes(
            payload in proptest::collection::vec(any::<u8>(), 1..512),
            cut in 1usize..512,
        ) {
            let encoded = encode_with_key(&payload, Opcode::Binary, Some([7, 7, 7, 7]));
            let cut = cut.min(encoded.len());
            let truncated = &encoded[..encoded.len() - cut];
            prop_assert!(decode(truncated).is_err());
        }

        #[test]
        fn prop_unmasked_data_always_rejected(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let encoded = encode_with_key(&payload, Opcode::Binary, None);
            prop_assert!(matches!(decode(&encoded), Err(Error::ClientMustMask)));
        }
    }
}
