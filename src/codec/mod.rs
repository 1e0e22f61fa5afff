//! Codec module - encodings used inside protocol fields.
//!
//! - [`Base64Codec`] - base64 for free-text variable values and notes
//! - [`auth_digest`] - MD5 digest answering an authentication challenge
//!
//! Codecs are marker structs and free functions rather than trait objects;
//! the grammar of each command decides which one applies.

mod base64;
mod digest;

pub use self::base64::Base64Codec;
pub use digest::auth_digest;
