//! WebSocket HTTP upgrade handshake.
//!
//! Parses the client's upgrade request, derives the challenge answer and
//! renders the `101` response.
//!
//! - [`negotiate`]: Main entry point over the raw bytes buffered so far
//! - [`compute_accept_key`]: SHA-1 + Base64 per RFC 6455 Section 4.2.2
//! - [`compute_legacy_response`]: MD5 challenge of the key1/key2 handshake
//! - [`HandshakeRequest`]: Parsed request line and headers
//!
//! # Variants
//!
//! | Request carries | Answer |
//! |-----------------|--------|
//! | `Sec-WebSocket-Key` | `Sec-Websocket-Accept` header |
//! | `Sec-WebSocket-Key1` + `Sec-WebSocket-Key2` | 16-byte MD5 body after the headers |
//!
//! The key1/key2 variant predates RFC 6455 and no current client sends it.
//! It is kept for old clients only.

// ============================================================================
// Imports
// ============================================================================

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use md5::Md5;
use sha1::{Digest, Sha1};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Blank line ending the header block.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Body bytes the legacy handshake sends after its headers.
const LEGACY_CHALLENGE_LEN: usize = 8;

/// Status line of the upgrade response.
const STATUS_LINE: &str = "HTTP/1.1 101 Web Socket Protocol Handshake";

/// Protocol version advertised on the modern path.
const PROTOCOL_VERSION: &str = "13";

// ============================================================================
// Endpoint
// ============================================================================

/// Address the server advertises in `WebSocket-Location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host the server was bound with.
    pub host: String,
    /// Port the server is listening on.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns `ws://{host}:{port}/`.
    #[inline]
    #[must_use]
    pub fn location(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }
}

// ============================================================================
// HandshakeRequest
// ============================================================================

/// Parsed upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request method (always `GET` once parsed).
    pub method: String,
    /// Request target, e.g. `/chat`.
    pub target: String,
    /// HTTP version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Headers in arrival order, names lowercased.
    headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    /// Parses a header block (without the terminating blank line).
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeMalformed`] if the request line is not
    /// `GET <target> HTTP/<version>` or a header line lacks `": "`.
    pub fn parse(header_block: &str) -> Result<Self> {
        let mut lines = header_block.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let mut parts = request_line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(method), Some(target), Some(version), None) => (method, target, version),
            _ => {
                return Err(Error::handshake_malformed(format!(
                    "malformed request line: {request_line:?}"
                )));
            }
        };

        if method != "GET" {
            return Err(Error::handshake_malformed(format!(
                "method must be GET, got {method:?}"
            )));
        }
        if target.is_empty() || !version.starts_with("HTTP/") {
            return Err(Error::handshake_malformed(format!(
                "malformed request line: {request_line:?}"
            )));
        }

        let headers = lines
            .map(|line| {
                line.split_once(": ")
                    .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                    .ok_or_else(|| {
                        Error::handshake_malformed(format!("malformed header line: {line:?}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Returns the first value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns all headers in arrival order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the `Origin` header.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    /// Returns the `Sec-WebSocket-Key` header.
    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.header("sec-websocket-key")
    }

    /// Returns `Sec-WebSocket-Key1` and `Sec-WebSocket-Key2` when both exist.
    #[must_use]
    pub fn legacy_keys(&self) -> Option<(&str, &str)> {
        Some((
            self.header("sec-websocket-key1")?,
            self.header("sec-websocket-key2")?,
        ))
    }
}

// ============================================================================
// Negotiation
// ============================================================================

/// Answer to the client's challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// `Sec-Websocket-Accept` value.
    Modern {
        /// Base64 accept key.
        accept: String,
    },
    /// MD5 digest sent as the response body.
    Legacy {
        /// 16-byte digest.
        digest: [u8; 16],
    },
}

/// Successful handshake.
#[derive(Debug, Clone)]
pub struct Negotiation {
    /// The parsed request.
    pub request: HandshakeRequest,
    /// How the challenge was answered.
    pub challenge: Challenge,
    /// Bytes to write back to the client.
    pub response: Vec<u8>,
    /// Bytes of the input buffer used by the handshake.
    ///
    /// Anything after this offset arrived pipelined behind the handshake
    /// and belongs to the frame decoder.
    pub consumed: usize,
}

/// Negotiates the upgrade from everything buffered so far.
///
/// # Errors
///
/// - [`Error::HandshakeIncomplete`] if the header terminator (or the legacy
///   8-byte body) has not arrived yet. Keep the buffer and retry.
/// - [`Error::HandshakeMalformed`] if the request cannot be accepted
pub fn negotiate(buffer: &[u8], endpoint: &Endpoint) -> Result<Negotiation> {
    let header_end = find_terminator(buffer).ok_or(Error::HandshakeIncomplete)?;
    let header_block = std::str::from_utf8(&buffer[..header_end])
        .map_err(|_| Error::handshake_malformed("header block is not valid UTF-8"))?;

    trace!(bytes = header_end, "Parsing handshake header block");

    let request = HandshakeRequest::parse(header_block)?;
    let body_start = header_end + HEADER_TERMINATOR.len();

    let (challenge, consumed) = if let Some(key) = request.key() {
        let accept = compute_accept_key(key);
        debug!(path = %request.target, "Negotiated RFC 6455 handshake");
        (Challenge::Modern { accept }, body_start)
    } else if let Some((key1, key2)) = request.legacy_keys() {
        warn!(path = %request.target, "Client uses legacy challenge-response handshake");
        let body_end = body_start + LEGACY_CHALLENGE_LEN;
        let body = buffer
            .get(body_start..body_end)
            .ok_or(Error::HandshakeIncomplete)?;
        let digest = compute_legacy_response(key1, key2, body)?;
        (Challenge::Legacy { digest }, body_end)
    } else {
        return Err(Error::handshake_malformed("missing Sec-WebSocket-Key"));
    };

    let response = render_response(endpoint, request.origin(), &challenge);

    Ok(Negotiation {
        request,
        challenge,
        response,
        consumed,
    })
}

/// Returns the offset of the first `\r\n\r\n`.
fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

// ============================================================================
// Challenge Computation
// ============================================================================

/// Computes `Sec-WebSocket-Accept`: base64(SHA-1(key + GUID)).
#[must_use]
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Computes the legacy MD5 challenge answer.
///
/// # Errors
///
/// Returns [`Error::HandshakeMalformed`] if either key has no spaces, no
/// digits, or a number not evenly divisible by its space count.
pub fn compute_legacy_response(key1: &str, key2: &str, body: &[u8]) -> Result<[u8; 16]> {
    let part1 = legacy_key_part(key1)?;
    let part2 = legacy_key_part(key2)?;

    let mut hasher = Md5::new();
    hasher.update(part1.to_be_bytes());
    hasher.update(part2.to_be_bytes());
    hasher.update(body);
    Ok(hasher.finalize().into())
}

/// Digits of `value` divided by its whitespace count.
fn legacy_key_part(value: &str) -> Result<u32> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    let number: u64 = digits
        .parse()
        .map_err(|_| Error::handshake_malformed(format!("legacy key has no usable number: {value:?}")))?;

    let spaces = value.chars().filter(|c| c.is_whitespace()).count() as u64;
    if spaces == 0 {
        return Err(Error::handshake_malformed("legacy key contains no spaces"));
    }
    if number % spaces != 0 {
        return Err(Error::handshake_malformed(
            "legacy key number is not a multiple of its space count",
        ));
    }

    u32::try_from(number / spaces)
        .map_err(|_| Error::handshake_malformed("legacy key part exceeds 32 bits"))
}

// ============================================================================
// Response
// ============================================================================

/// Renders the `101` response.
fn render_response(endpoint: &Endpoint, origin: Option<&str>, challenge: &Challenge) -> Vec<u8> {
    let location = endpoint.location();

    let mut head = String::with_capacity(256);
    head.push_str(STATUS_LINE);
    head.push_str("\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\n");
    if let Some(origin) = origin {
        head.push_str(&format!("WebSocket-Origin: {origin}\r\n"));
    }
    head.push_str(&format!("WebSocket-Location: {location}\r\n"));
    if let Some(origin) = origin {
        head.push_str(&format!("Sec-Websocket-Origin: {origin}\r\n"));
    }
    head.push_str(&format!("Sec-Websocket-Location: {location}\r\n"));
    if let Challenge::Modern { accept } = challenge {
        head.push_str(&format!("Sec-Websocket-Accept: {accept}\r\n"));
        head.push_str(&format!("Sec-Websocket-Version: {PROTOCOL_VERSION}\r\n"));
    }
    head.push_str("\r\n");

    let mut response = head.into_bytes();
    if let Challenge::Legacy { digest } = challenge {
        response.extend_from_slice(digest);
    }
    response
}

/// Renders a `400 Bad Request` with `reason` as a plain-text body.
#[must_use]
pub fn render_bad_request(reason: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {reason}",
        reason.len()
    )
    .into_bytes()
}

// ============================================================================
// Tests
// ============================================================================
