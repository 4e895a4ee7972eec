
use std::fmt;

use crate::error::{Error, Result};

/// Object identifier for AES-128-CBC media encryption.
pub const OID_AES128: &str = "2.16.840.1.101.3.4.1.2";
/// Object identifier for AES-192-CBC media encryption.
pub const OID_AES192: &str = "2.16.840.1.101.3.4.1.22";
/// Object identifier for AES-256-CBC media encryption.
pub const OID_AES256: &str = "2.16.840.1.101.3.4.1.42";

/// CipherAlgorithm is the closed set of media encryption algorithms that can
/// be negotiated for a call, keyed by OID on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes128,
    Aes192,
    Aes256,
}

impl CipherAlgorithm {
    /// Resolves a negotiated OID. AES-192/256 are only accepted when the
    /// `aes256` feature is enabled.
    pub fn from_oid(oid: &str) -> Result<Self> {
        match oid {
            OID_AES128 => Ok(CipherAlgorithm::Aes128),
            #[cfg(feature = "aes256")]
            OID_AES192 => Ok(CipherAlgorithm::Aes192),
            #[cfg(feature = "aes256")]
            OID_AES256 => Ok(CipherAlgorithm::Aes256),
            _ => Err(Error::UnsupportedAlgorithm(oid.to_owned())),
        }
    }

    pub fn oid(&self) -> &'static str {
        match *self {
            CipherAlgorithm::Aes128 => OID_AES128,
            CipherAlgorithm::Aes192 => OID_AES192,
            CipherAlgorithm::Aes256 => OID_AES256,
        }
    }

    pub fn key_len(&self) -> usize {
        match *self {
            CipherAlgorithm::Aes128 => 16,
            CipherAlgorithm::Aes192 => 24,
            CipherAlgorithm::Aes256 => 32,
        }
    }

    /// All three algorithms run in CBC mode over 128-bit blocks.
    pub fn block_size(&self) -> usize {
        16
    }

    pub fn iv_len(&self) -> usize {
        16
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CipherAlgorithm::Aes128 => "AES-128",
            CipherAlgorithm::Aes192 => "AES-192",
            CipherAlgorithm::Aes256 => "AES-256",
        };
        write!(f, "{}", s)
    }
}
