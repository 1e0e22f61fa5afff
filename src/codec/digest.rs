//! Challenge/response digest.
//!
//! The answer to a `CHALLENGE` nonce is the lowercase hex MD5 of
//! `<password>:<nonce>`. The password never goes on the wire.

use md5::{Digest, Md5};

/// Digest sent with `AUTH` for the given password and server nonce.
pub fn auth_digest(password: &str, nonce: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.trim().as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            auth_digest("secret", "abc"),
            "84edefb38b78c0b66ecb3761842c1638"
        );
    }

    #[test]
    fn test_nonce_whitespace_ignored() {
        assert_eq!(auth_digest("secret", " abc\r\n"), auth_digest("secret", "abc"));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(auth_digest("", ""), "853ae90f0351324bd73ea615e6487517");
    }
}
