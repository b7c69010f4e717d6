//! HTTP Upgrade handshake, client side (RFC 6455 section 4.1).
//!
//! [`UpgradeRequest`] renders the request text; [`UpgradeResponse`] reads
//! the server's answer out of the receive buffer, leaving any bytes past the
//! blank line for the frame decoder.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Number of random bytes in a `Sec-WebSocket-Key`.
pub const NONCE_LEN: usize = 16;

/// Base64 length of a 16-byte nonce.
const ENCODED_NONCE_LEN: usize = 24;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parse HTTP header lines into a map keyed by lowercase name.
///
/// Lines without a colon are skipped. A repeated header keeps its last value.
/// Header names are tokens; values may carry obs-text and are decoded
/// lossily.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a [u8]>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let Ok(name) = std::str::from_utf8(&line[..colon]) else {
            continue;
        };
        let value = String::from_utf8_lossy(&line[colon + 1..]);
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    headers
}

/// Validate that a header value does not contain CR or LF characters.
///
/// # Errors
///
/// Returns `Error::InvalidHeaderValue` if the value contains `\r` or `\n`.
pub fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Validate a header name: a non-empty HTTP token.
///
/// # Errors
///
/// Returns `Error::InvalidHeaderValue` for empty names or names containing
/// separators, whitespace or control characters.
pub fn validate_header_name(name: &str) -> Result<()> {
    let is_token_char = |c: char| {
        c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c)
    };
    if name.is_empty() || !name.chars().all(is_token_char) {
        return Err(Error::InvalidHeaderValue {
            header: name.to_string(),
            reason: "not a valid header name".to_string(),
        });
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use uws::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Base64-encode a 16-byte nonce into a `Sec-WebSocket-Key` value.
///
/// # Errors
///
/// Returns `Error::Base64EncodeFailed` if the encoding does not fit.
pub fn encode_nonce(nonce: &[u8; NONCE_LEN]) -> Result<String> {
    let mut out = [0u8; ENCODED_NONCE_LEN];
    let written = BASE64
        .encode_slice(nonce, &mut out)
        .map_err(|_| Error::Base64EncodeFailed)?;
    String::from_utf8(out[..written].to_vec()).map_err(|_| Error::Base64EncodeFailed)
}

/// Draw a fresh random nonce and encode it.
///
/// # Errors
///
/// - `Error::RandomSource` if the random source fails
/// - `Error::Base64EncodeFailed` if encoding fails
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce)?;
    encode_nonce(&nonce)
}

/// Client handshake request.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeRequest<'a> {
    pub resource: &'a str,
    pub host: &'a str,
    pub port: u16,
    /// `Sec-WebSocket-Key` value.
    pub key: &'a str,
    pub protocols: &'a [String],
    /// Caller headers, written after the standard ones in order.
    pub headers: &'a [(String, String)],
}

impl UpgradeRequest<'_> {
    /// Render the request, terminated by the blank line.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n",
            self.resource, self.host, self.port, self.key
        );
        if !self.protocols.is_empty() {
            text.push_str("Sec-WebSocket-Protocol: ");
            text.push_str(&self.protocols.join(", "));
            text.push_str("\r\n");
        }
        for (name, value) in self.headers {
            text.push_str(name);
            text.push_str(": ");
            text.push_str(value);
            text.push_str("\r\n");
        }
        text.push_str("\r\n");
        text.into_bytes()
    }
}

/// Server handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// Numeric status code from the status line.
    pub status: u16,
    /// Reason phrase, possibly empty.
    pub reason: String,
    headers: HashMap<String, String>,
}

impl UpgradeResponse {
    /// Parse a response from the front of `buf`.
    ///
    /// Returns `Ok(None)` until the blank line ending the header block has
    /// arrived; otherwise the response and the number of bytes it occupies.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the status line is not UTF-8 or
    /// lacks an `HTTP/1.x` version or a numeric status code.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some(end) = buf
            .windows(HEADER_TERMINATOR.len())
            .position(|window| window == HEADER_TERMINATOR)
        else {
            return Ok(None);
        };
        let consumed = end + HEADER_TERMINATOR.len();

        let mut lines = buf[..end]
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

        let status_line = lines.next().unwrap_or_default();
        let status_line = std::str::from_utf8(status_line)
            .map_err(|_| Error::InvalidHandshake("Status line is not UTF-8".into()))?;
        let mut tokens = status_line.split_whitespace();
        let version = tokens
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty status line".into()))?;
        if !version.starts_with("HTTP/1.") {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.x, got {version}"
            )));
        }
        let status = tokens
            .next()
            .filter(|code| code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                Error::InvalidHandshake(format!("Missing status code in: {status_line}"))
            })?;
        let reason = tokens.collect::<Vec<_>>().join(" ");

        Ok(Some((
            Self {
                status,
                reason,
                headers: parse_headers(lines),
            },
            consumed,
        )))
    }

    /// Parse with an upper bound on the bytes a response may occupy.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` once more than `max_size` bytes are
    ///   buffered without a complete response, or the response is larger
    /// - Other errors as per `parse()`
    pub fn parse_with_limit(buf: &[u8], max_size: usize) -> Result<Option<(Self, usize)>> {
        match Self::parse(buf)? {
            Some((_, consumed)) if consumed > max_size => Err(Error::HandshakeTooLarge {
                size: consumed,
                max: max_size,
            }),
            None if buf.len() > max_size => Err(Error::HandshakeTooLarge {
                size: buf.len(),
                max: max_size,
            }),
            parsed => Ok(parsed),
        }
    }

    /// Require status 101.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadResponseStatus` for any other status.
    pub fn ensure_switching_protocols(&self) -> Result<()> {
        if self.status == 101 {
            Ok(())
        } else {
            Err(Error::BadResponseStatus(self.status))
        }
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Subprotocol the server selected.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.header("sec-websocket-protocol")
    }

    /// Check `Sec-WebSocket-Accept` against the key that was sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the header is missing or wrong.
    pub fn verify_accept(&self, key: &str) -> Result<()> {
        let accept = self
            .header("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?;
        if accept != compute_accept_key(key) {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: {accept}"
            )));
        }
        Ok(())
    }
}
