//! Classification of raw device responses.
//!
//! The device answers each frame with a single ASCII line. A line equal to the
//! acknowledgement token is an [`Outcome::Ack`], a line starting with the error
//! prefix carries a device error code, an empty read is a timeout and anything
//! else is a malformed frame. Nothing unrecognised is ever treated as success.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Terminating byte of a response line. A preceding `\r` is tolerated.
pub const RESPONSE_TERMINATOR: u8 = b'\n';
pub const DEFAULT_ACK_TOKEN: &str = "OK";
pub const DEFAULT_ERROR_PREFIX: &str = "ERROR";

/// The tokens the firmware answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResponseTokens {
    pub ack: String,
    pub error_prefix: String,
}

impl Default for ResponseTokens {
    fn default() -> Self {
        Self {
            ack: DEFAULT_ACK_TOKEN.to_string(),
            error_prefix: DEFAULT_ERROR_PREFIX.to_string(),
        }
    }
}

/// The meaning of a device response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The device accepted the command.
    Ack,
    /// The device rejected the command with an error code.
    DeviceError(String),
    /// No complete response line arrived before the timeout elapsed.
    Timeout,
    /// A response arrived but matches none of the known tokens.
    MalformedFrame,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ack => write!(f, "acknowledged"),
            Outcome::DeviceError(code) => write!(f, "device error {code}"),
            Outcome::Timeout => write!(f, "timeout"),
            Outcome::MalformedFrame => write!(f, "malformed response"),
        }
    }
}

/// A response as read from the link together with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    pub raw: Vec<u8>,
    pub outcome: Outcome,
}

impl DeviceResponse {
    /// Classifies a complete response line.
    pub fn from_raw(raw: Vec<u8>, tokens: &ResponseTokens) -> Self {
        let outcome = classify(&raw, tokens);
        Self { raw, outcome }
    }

    /// A response whose terminator never arrived.
    pub fn timeout(raw: Vec<u8>) -> Self {
        Self {
            raw,
            outcome: Outcome::Timeout,
        }
    }

    /// The raw bytes, lossily decoded for logs and error messages.
    pub fn raw_text(&self) -> String {
        String::from_utf8_lossy(&self.raw).trim().to_string()
    }
}

/// Removes the first complete, non-blank line from `buffer`.
///
/// Blank lines are dropped. Bytes after the returned line stay in `buffer`.
pub fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    while let Some(end) = buffer.iter().position(|b| *b == RESPONSE_TERMINATOR) {
        let line: Vec<u8> = buffer.drain(..=end).collect();
        if line.iter().any(|b| !b.is_ascii_whitespace()) {
            return Some(line);
        }
    }
    None
}

/// Maps a raw response to its [`Outcome`].
///
/// Surrounding whitespace, including the line terminator, is ignored. Token
/// comparison ignores ASCII letter case. The error code may be separated from
/// the prefix by `:`, `=` or whitespace and must not be empty.
pub fn classify(raw: &[u8], tokens: &ResponseTokens) -> Outcome {
    let Ok(text) = std::str::from_utf8(raw) else {
        return Outcome::MalformedFrame;
    };
    let line = text.trim();
    if line.is_empty() {
        return Outcome::Timeout;
    }
    if line.eq_ignore_ascii_case(&tokens.ack) {
        return Outcome::Ack;
    }

    let prefix_len = tokens.error_prefix.len();
    if prefix_len > 0
        && line.len() > prefix_len
        && line.is_char_boundary(prefix_len)
        && line[..prefix_len].eq_ignore_ascii_case(&tokens.error_prefix)
    {
        let rest = &line[prefix_len..];
        let separated = rest.starts_with(&[':', '=', ' ', '\t'][..]);
        let code = rest.trim_start_matches(&[':', '=', ' ', '\t'][..]).trim();
        // Without a separator only a numeric code counts, so "ERRORS" stays malformed.
        let delimited = separated || code.starts_with(|c: char| c.is_ascii_digit());
        if delimited
            && !code.is_empty()
            && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Outcome::DeviceError(code.to_string());
        }
    }
    Outcome::MalformedFrame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_default(raw: &[u8]) -> Outcome {
        classify(raw, &ResponseTokens::default())
    }

    #[test]
    fn classify_ack() {
        assert_eq!(classify_default(b"OK\r\n"), Outcome::Ack);
        assert_eq!(classify_default(b"ok\n"), Outcome::Ack);
        assert_eq!(classify_default(b"  OK  "), Outcome::Ack);
    }

    #[test]
    fn classify_device_error() {
        assert_eq!(
            classify_default(b"ERROR:3\r\n"),
            Outcome::DeviceError("3".to_string())
        );
        assert_eq!(
            classify_default(b"ERROR 12\r\n"),
            Outcome::DeviceError("12".to_string())
        );
        assert_eq!(
            classify_default(b"error=E7\r\n"),
            Outcome::DeviceError("E7".to_string())
        );
        assert_eq!(
            classify_default(b"ERROR4\r\n"),
            Outcome::DeviceError("4".to_string())
        );
    }

    #[test]
    fn classify_timeout() {
        assert_eq!(classify_default(b""), Outcome::Timeout);
        assert_eq!(classify_default(b"\r\n"), Outcome::Timeout);
    }

    #[test]
    fn classify_malformed() {
        for raw in [
            &b"OKAY\r\n"[..],
            b"ERROR\r\n",
            b"ERROR:\r\n",
            b"ERROR: bad thing\r\n",
            b"ERRORS\r\n",
            b"ErrorCode\r\n",
            b"AT+RES.SP=1000\r\n",
            b"\xff\xfe\r\n",
            b"K",
        ] {
            assert_eq!(classify_default(raw), Outcome::MalformedFrame, "raw {raw:?}");
        }
    }

    #[test]
    fn classify_with_injected_tokens() {
        let tokens = ResponseTokens {
            ack: "+ACK".to_string(),
            error_prefix: "+ERR".to_string(),
        };
        assert_eq!(classify(b"+ACK\r\n", &tokens), Outcome::Ack);
        assert_eq!(
            classify(b"+ERR:5\r\n", &tokens),
            Outcome::DeviceError("5".to_string())
        );
        assert_eq!(classify(b"OK\r\n", &tokens), Outcome::MalformedFrame);
    }

    #[test]
    fn take_line_skips_blank_lines() {
        let mut buffer = b"\r\n\r\nOK\r\nERR".to_vec();
        assert_eq!(take_line(&mut buffer), Some(b"OK\r\n".to_vec()));
        assert_eq!(buffer, b"ERR");
        assert_eq!(take_line(&mut buffer), None);
        assert_eq!(buffer, b"ERR");

        let mut buffer = b"\r\n".to_vec();
        assert_eq!(take_line(&mut buffer), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn device_response_keeps_raw_bytes() {
        let response = DeviceResponse::from_raw(b"ERROR:9\r\n".to_vec(), &ResponseTokens::default());
        assert_eq!(response.outcome, Outcome::DeviceError("9".to_string()));
        assert_eq!(response.raw_text(), "ERROR:9");
        let response = DeviceResponse::timeout(b"O".to_vec());
        assert_eq!(response.outcome, Outcome::Timeout);
        assert_eq!(response.raw, b"O");
    }
}
