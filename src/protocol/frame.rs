//! Response frame: the payload lines of one reply plus its terminator.
//!
//! # Example
//!
//! ```
//! use vscp_client::protocol::{FrameBuffer, Outcome};
//!
//! let mut buffer = FrameBuffer::new();
//! buffer.extend(b"1,2,3,4\r\n+OK - Success.\r\n");
//!
//! let frame = buffer.next_frame().unwrap();
//! assert_eq!(frame.outcome(), Outcome::Success);
//! assert_eq!(frame.lines(), ["1,2,3,4"]);
//! assert_eq!(frame.terminator(), "+OK - Success.");
//! ```

use super::wire_format::{Outcome, LINE_END, NEGATIVE_TOKEN, POSITIVE_TOKEN};
use crate::error::{ServerError, VscpError};

/// A complete response block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    lines: Vec<String>,
    terminator: String,
    outcome: Outcome,
}

impl ResponseFrame {
    /// Build a frame from payload lines and the terminator line.
    pub fn new(lines: Vec<String>, terminator: String, outcome: Outcome) -> Self {
        Self {
            lines,
            terminator,
            outcome,
        }
    }

    /// Split a raw block (all lines through the terminator, CRLF included).
    ///
    /// The block must end with a terminator line; the empty entry after the
    /// final CRLF is dropped.
    pub(crate) fn from_block(block: &[u8], outcome: Outcome) -> Self {
        let text = String::from_utf8_lossy(block);
        let mut lines: Vec<String> = text
            .split("\r\n")
            .map(str::to_string)
            .collect();

        // Trailing empty entry produced by the final CRLF.
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        let terminator = lines.pop().unwrap_or_default();

        Self {
            lines,
            terminator,
            outcome,
        }
    }

    /// Payload lines, terminator excluded.
    #[inline]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Take ownership of the payload lines.
    #[inline]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Terminator line text (`+OK...` or `-OK...`).
    #[inline]
    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    /// Outcome signalled by the terminator.
    #[inline]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Check if this is a positive response.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Explanatory text following the terminator token, e.g. `Success.`
    /// for `+OK - Success.`.
    pub fn terminator_text(&self) -> &str {
        let token_len = POSITIVE_TOKEN.len().max(NEGATIVE_TOKEN.len());
        self.terminator
            .get(token_len..)
            .unwrap_or("")
            .trim_start_matches([' ', '-'])
            .trim()
    }

    /// Parse the `<code>,<description>` error convention.
    pub fn server_error(&self) -> ServerError {
        if let Some(last) = self.lines.last() {
            if let Some((code, description)) = last.split_once(',') {
                if let Ok(code) = code.trim().parse::<u32>() {
                    return ServerError {
                        code: Some(code),
                        description: description.trim().to_string(),
                    };
                }
            }
            if !last.trim().is_empty() {
                return ServerError {
                    code: None,
                    description: last.trim().to_string(),
                };
            }
        }

        ServerError {
            code: None,
            description: self.terminator_text().to_string(),
        }
    }

    /// Payload lines on success, structured server error on failure.
    pub fn into_result(self) -> Result<Vec<String>, VscpError> {
        match self.outcome {
            Outcome::Success => Ok(self.lines),
            Outcome::Failure => Err(VscpError::Server(self.server_error())),
        }
    }

    /// Re-encode to wire form. Used by tests and mock servers.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in self.lines.iter().chain(std::iter::once(&self.terminator)) {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(LINE_END);
        }
        out
    }
}
