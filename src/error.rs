use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("key must be len {0}, got {1}")]
    KeyLength(usize, usize),
    #[error("cipher context has no key")]
    NotInitialised,
    #[error("ciphertext stealing: expecting previous cipher block")]
    CtsMissingFinalBlock,
    #[error("ciphertext stealing: expecting trailing partial block")]
    CtsMissingPartialBlock,
    #[error("data not a multiple of block length")]
    NotBlockAligned,
    #[error("wrong final block length")]
    WrongFinalBlockLength,
    #[error("bad decrypt")]
    BadPadding,
    #[error("output buffer must be at least {0} bytes, got {1}")]
    ShortOutputBuffer(usize, usize),
    #[error("session is already initialised")]
    SessionAlreadyInitialised,
    #[error("session is not initialised")]
    SessionNotInitialised,
    #[error("shared secret must be at least {0} bytes, got {1}")]
    ShortSharedSecret(usize, usize),

    #[error("{0}")]
    Util(#[from] util::Error),
}
