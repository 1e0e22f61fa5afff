//! Wire format encoding and decoding.
//!
//! The VSCP tcp/ip link protocol is line oriented:
//! ```text
//! request:   <VERB>[ <ARGUMENT>]\r\n
//! response:  <payload line>\r\n ... +OK[ text]\r\n
//!            <code>,<description>\r\n -OK[ text]\r\n
//! ```
//!
//! Verbs are case-insensitive on the wire and are sent upper-cased.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, VscpError};

/// Positive terminator token.
pub const POSITIVE_TOKEN: &[u8] = b"+OK";

/// Negative terminator token.
pub const NEGATIVE_TOKEN: &[u8] = b"-OK";

/// Line terminator sequence.
pub const LINE_END: &[u8] = b"\r\n";

/// Default VSCP tcp/ip link port.
pub const DEFAULT_PORT: u16 = 9598;

/// Command verbs understood by the VSCP daemon.
pub mod verbs {
    /// Placeholder for the unsent command that absorbs the welcome banner.
    pub const BANNER: &str = "(BANNER)";
    /// No operation.
    pub const NOOP: &str = "NOOP";
    /// Username half of the plain login.
    pub const USER: &str = "USER";
    /// Password half of the plain login.
    pub const PASS: &str = "PASS";
    /// Request an authentication nonce.
    pub const CHALLENGE: &str = "CHALLENGE";
    /// Answer a challenge with a digest.
    pub const AUTH: &str = "AUTH";
    /// Close the session.
    pub const QUIT: &str = "QUIT";
    /// Server version.
    pub const VERSION: &str = "VERSION";
    /// Number of events waiting in the input queue.
    pub const CHKDATA: &str = "CHKDATA";
    /// Clear the input queue.
    pub const CLRALL: &str = "CLRALL";
    /// Retrieve queued events.
    pub const RETR: &str = "RETR";
    /// Send an event.
    pub const SEND: &str = "SEND";
    /// Enter receive loop.
    pub const RCVLOOP: &str = "RCVLOOP";
    /// Leave receive loop.
    pub const QUITLOOP: &str = "QUITLOOP";
    /// List interfaces.
    pub const INTERFACE_LIST: &str = "INTERFACE LIST";
    /// Channel statistics.
    pub const STAT: &str = "STAT";
    /// Channel status information.
    pub const INFO: &str = "INFO";
    /// Channel id.
    pub const CHID: &str = "CHID";
    /// Read channel GUID.
    pub const GETGUID: &str = "GETGUID";
    /// Write channel GUID.
    pub const SETGUID: &str = "SETGUID";
    /// Capability query.
    pub const WCYD: &str = "WCYD";
    /// Set the channel filter.
    pub const SETFILTER: &str = "SETFILTER";
    /// Set the channel mask.
    pub const SETMASK: &str = "SETMASK";
    /// List variables.
    pub const VAR_LIST: &str = "VAR LIST";
    /// Read a variable.
    pub const VAR_READ: &str = "VAR READ";
    /// Write a variable.
    pub const VAR_WRITE: &str = "VAR WRITE";
    /// Remove a variable.
    pub const VAR_REMOVE: &str = "VAR REMOVE";
    /// Length of a variable value.
    pub const VAR_LENGTH: &str = "VAR LENGTH";
    /// Last change time of a variable.
    pub const VAR_LASTCHANGE: &str = "VAR LASTCHANGE";
    /// Reset a variable to its default.
    pub const VAR_RESET: &str = "VAR RESET";
}

/// Outcome signalled by a terminator line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `+OK`
    Success,
    /// `-OK`
    Failure,
}

/// Classify a complete line (without CRLF) as a terminator, if it is one.
#[inline]
pub fn classify_terminator(line: &[u8]) -> Option<Outcome> {
    if line.starts_with(POSITIVE_TOKEN) {
        Some(Outcome::Success)
    } else if line.starts_with(NEGATIVE_TOKEN) {
        Some(Outcome::Failure)
    } else {
        None
    }
}

/// Index of the first CRLF in `buf`.
#[inline]
pub fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(LINE_END.len()).position(|w| w == LINE_END)
}

/// A request ready to be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    argument: Option<String>,
}

impl Command {
    /// Create a command, upper-casing the verb.
    ///
    /// Fails if the verb is empty or either part contains a line break.
    ///
    /// # Example
    ///
    /// ```
    /// use vscp_client::protocol::Command;
    ///
    /// let cmd = Command::new("var read", Some("temperature")).unwrap();
    /// assert_eq!(&cmd.encode()[..], b"VAR READ temperature\r\n");
    /// ```
    pub fn new(verb: &str, argument: Option<&str>) -> Result<Self> {
        let verb = verb.trim();
        if verb.is_empty() {
            return Err(VscpError::InvalidArgument("empty command verb".into()));
        }
        if has_line_break(verb) {
            return Err(VscpError::InvalidArgument(format!(
                "line break in command verb {:?}",
                verb
            )));
        }
        if let Some(arg) = argument {
            if has_line_break(arg) {
                return Err(VscpError::InvalidArgument(format!(
                    "line break in argument to {}",
                    verb
                )));
            }
        }

        Ok(Self {
            verb: verb.to_ascii_uppercase(),
            argument: argument.filter(|a| !a.is_empty()).map(str::to_string),
        })
    }

    /// Command standing in for the server's welcome banner. Never written.
    pub(crate) fn banner() -> Self {
        Self {
            verb: verbs::BANNER.to_string(),
            argument: None,
        }
    }

    /// Upper-cased verb.
    #[inline]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Argument string, if any.
    #[inline]
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Whether this command's verb is `verb` (already upper-case).
    #[inline]
    pub fn is(&self, verb: &str) -> bool {
        self.verb == verb
    }

    /// Encode to wire bytes including the trailing CRLF.
    pub fn encode(&self) -> Bytes {
        let arg_len = self.argument.as_ref().map_or(0, |a| a.len() + 1);
        let mut buf = BytesMut::with_capacity(self.verb.len() + arg_len + LINE_END.len());
        buf.put_slice(self.verb.as_bytes());
        if let Some(arg) = &self.argument {
            buf.put_u8(b' ');
            buf.put_slice(arg.as_bytes());
        }
        buf.put_slice(LINE_END);
        buf.freeze()
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains('\r') || s.contains('\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_argument() {
        let cmd = Command::new("noop", None).unwrap();
        assert_eq!(cmd.verb(), "NOOP");
        assert_eq!(&cmd.encode()[..], b"NOOP\r\n");
    }

    #[test]
    fn test_encode_with_argument() {
        let cmd = Command::new("User", Some("admin")).unwrap();
        assert_eq!(&cmd.encode()[..], b"USER admin\r\n");
    }

    #[test]
    fn test_empty_argument_is_dropped() {
        let cmd = Command::new("VAR LIST", Some("")).unwrap();
        assert_eq!(cmd.argument(), None);
        assert_eq!(&cmd.encode()[..], b"VAR LIST\r\n");
    }

    #[test]
    fn test_reject_empty_verb() {
        assert!(matches!(
            Command::new("   ", None),
            Err(VscpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reject_line_break_in_argument() {
        let err = Command::new("PASS", Some("secret\r\nQUIT")).unwrap_err();
        assert!(err.to_string().contains("line break"));
    }

    #[test]
    fn test_classify_terminator() {
        assert_eq!(classify_terminator(b"+OK"), Some(Outcome::Success));
        assert_eq!(
            classify_terminator(b"+OK - Success."),
            Some(Outcome::Success)
        );
        assert_eq!(classify_terminator(b"-OK - Error"), Some(Outcome::Failure));
        assert_eq!(classify_terminator(b"1,2,3,4"), None);
        assert_eq!(classify_terminator(b" +OK"), None);
    }

    #[test]
    fn test_find_line_end() {
        assert_eq!(find_line_end(b"abc\r\ndef"), Some(3));
        assert_eq!(find_line_end(b"abc\r"), None);
        assert_eq!(find_line_end(b"abc\n"), None);
        assert_eq!(find_line_end(b""), None);
    }
}
