//! Base64 codec for free-text protocol fields.
//!
//! Variable values of text types and variable notes may contain `;`, `,`
//! or line breaks, so the server transfers them base64 encoded (standard
//! alphabet, padded).
//!
//! # Example
//!
//! ```
//! use vscp_client::codec::Base64Codec;
//!
//! let encoded = Base64Codec::encode("living room; north");
//! assert_eq!(Base64Codec::decode(&encoded).unwrap(), "living room; north");
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Result, VscpError};

/// Base64 codec for text fields.
pub struct Base64Codec;

impl Base64Codec {
    /// Encode text.
    #[inline]
    pub fn encode(text: &str) -> String {
        STANDARD.encode(text.as_bytes())
    }

    /// Decode to raw bytes. Surrounding whitespace is ignored.
    #[inline]
    pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(encoded.trim())?)
    }

    /// Decode to UTF-8 text.
    pub fn decode(encoded: &str) -> Result<String> {
        let bytes = Self::decode_bytes(encoded)?;
        String::from_utf8(bytes)
            .map_err(|e| VscpError::MalformedResponse(format!("base64 field is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_value() {
        assert_eq!(Base64Codec::encode("Hello"), "SGVsbG8=");
    }

    #[test]
    fn test_decode_known_value() {
        assert_eq!(Base64Codec::decode("SGVsbG8=").unwrap(), "Hello");
        assert_eq!(Base64Codec::decode(" SGVsbG8= ").unwrap(), "Hello");
    }

    #[test]
    fn test_empty() {
        assert_eq!(Base64Codec::encode(""), "");
        assert_eq!(Base64Codec::decode("").unwrap(), "");
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(
            Base64Codec::decode("not base64!"),
            Err(VscpError::Base64(_))
        ));
    }

    #[test]
    fn test_decode_non_utf8() {
        // 0xFF 0xFE
        assert!(matches!(
            Base64Codec::decode("//4="),
            Err(VscpError::MalformedResponse(_))
        ));
    }
}
