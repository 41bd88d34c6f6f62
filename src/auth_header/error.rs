//! Error types for the signing subsystem.

use thiserror::Error;

/// Construction-time failure. The filter must not be mounted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} not set")]
    MissingSecret(String),

    #[error("shared secret cannot be used as an HMAC key")]
    InvalidKey,
}

/// Reasons an upstream rejects a signed envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("X-Auth-Ts is not a Unix timestamp")]
    InvalidTimestamp,

    #[error("timestamp {timestamp} outside allowed window (now {now}, max skew {max_skew_secs}s)")]
    Expired {
        timestamp: u64,
        now: u64,
        max_skew_secs: u64,
    },

    #[error("malformed base64 in {0} header")]
    Malformed(&'static str),

    #[error("signature mismatch")]
    BadSignature,
}
