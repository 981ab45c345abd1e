use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid token format")]
    MalformedToken,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token expired")]
    Expired,

    #[error("Signing key error: {0}")]
    Key(String),

    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("{0}")]
    WeakPassword(String),
}
