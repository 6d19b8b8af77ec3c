//! NextGCore Cryptographic Library
//!
//! Key derivation for the 5GS security hierarchy. The HMAC-SHA-256 primitive
//! comes from the RustCrypto `hmac`/`sha2` crates; this crate only assembles
//! the TS 33.220 / TS 33.501 inputs around it.

pub mod kdf; // Key Derivation Functions

use thiserror::Error;

/// Crypto errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptError {
    /// Key material of the wrong size
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// KDF parameter longer than its 16-bit length field allows
    #[error("KDF parameter too long: {0} bytes")]
    ParameterTooLong(usize),

    /// Mandatory KDF input missing
    #[error("missing KDF parameter: {0}")]
    MissingParameter(&'static str),

    /// Key could not be decoded from its transport encoding
    #[error("key decode failed: {0}")]
    Decode(String),

    /// Underlying MAC primitive rejected its input
    #[error("crypto primitive failed: {0}")]
    Primitive(String),
}

/// Crypto result type
pub type CryptResult<T> = Result<T, CryptError>;
