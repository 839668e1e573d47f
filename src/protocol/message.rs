//! Application-level messages.
//!
//! A [`Message`] is what the delegate sees: the payload of one data frame
//! together with its opcode. Control frames never become messages.

// ============================================================================
// Imports
// ============================================================================

use super::frame::{Frame, Opcode};

// ============================================================================
// Message
// ============================================================================

/// Payload of one data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `Text`, `Binary` or `Continuation`.
    opcode: Opcode,
    /// Unmasked payload.
    payload: Vec<u8>,
}

impl Message {
    /// Creates a text message.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            opcode: Opcode::Text,
            payload: text.into().into_bytes(),
        }
    }

    /// Creates a binary message.
    #[inline]
    #[must_use]
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode: Opcode::Binary,
            payload: payload.into(),
        }
    }

    /// Converts a decoded data frame. Returns `None` for control frames.
    #[must_use]
    pub fn from_frame(frame: Frame) -> Option<Self> {
        frame.opcode.is_data().then_some(Self {
            opcode: frame.opcode,
            payload: frame.payload,
        })
    }

    /// Returns the frame opcode.
    #[inline]
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns `true` for text messages.
    #[inline]
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.opcode == Opcode::Text
    }

    /// Returns the payload as UTF-8, if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Returns the payload bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` for an empty payload.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message() {
        let message = Message::text("hello");
        assert!(message.is_text());
        assert_eq!(message.as_text(), Some("hello"));
        assert_eq!(message.as_bytes(), b"hello");
        assert_eq!(message.len(), 5);
    }

    #[test]
    fn test_binary_message_invalid_utf8() {
        let message = Message::binary(vec![0xFF, 0x00]);
        assert_eq!(message.opcode(), Opcode::Binary);
        assert_eq!(message.as_text(), None);
        assert_eq!(message.into_payload(), vec![0xFF, 0x00]);
    }

    #[test]
    fn test_from_frame() {
        let data = Frame {
            fin: true,
            opcode: Opcode::Continuation,
            payload: b"tail".to_vec(),
        };
        let message = Message::from_frame(data).expect("data frame");
        assert_eq!(message.opcode(), Opcode::Continuation);

        let ping = Frame {
            fin: true,
            opcode: Opcode::Ping,
            payload: Vec::new(),
        };
        assert!(Message::from_frame(ping).is_none());
    }
}
