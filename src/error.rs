//! Error kinds produced by the JOSE pipelines.
//!
//! Every fallible public operation in this crate returns [`Error`]. Errors are
//! never caught and re-dispatched inside the pipelines (see `jws`/`jwe`):
//! they bubble to the facade unmodified so callers can match on the kind.

use thiserror::Error;

/// The single error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed base64url, wrong number of compact segments, or non-object JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// A header required by RFC 7515/7516 or by the resolved algorithm is missing.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// A header is present but has the wrong type or an invalid value.
    #[error("invalid value for header {name}: {reason}")]
    InvalidHeaderValue {
        name: &'static str,
        reason: String,
    },

    /// `alg`/`enc`/`zip` names an algorithm this crate does not implement.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The resolved algorithm is not present in the caller's allow-list.
    #[error("algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),

    /// The key's declared `use` is incompatible with the requested operation.
    #[error("key use {declared} cannot be used for {requested}")]
    UnsupportedKeyUse {
        declared: &'static str,
        requested: &'static str,
    },

    /// The key's declared `alg` constraint does not match the algorithm in use.
    #[error("key is constrained to alg {declared}, cannot be used with {requested}")]
    UnsupportedKeyAlgorithm {
        declared: String,
        requested: String,
    },

    /// The key's `key_ops` does not list the requested operation.
    #[error("key_ops does not permit operation {0}")]
    UnsupportedKeyOperation(&'static str),

    /// Key material is malformed, or of the wrong kind/curve for the algorithm.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// JWS signature verification failed, or JWE authentication tag check failed.
    ///
    /// Both failure modes share one variant on purpose: distinguishing them to a
    /// caller leaks which stage rejected a forged message.
    #[error("bad signature or authentication tag")]
    BadSignature,

    /// A name in `crit` was missing, unknown, or a standard JOSE parameter.
    #[error("critical header error: {0}")]
    CriticalHeader(String),

    /// The underlying crypto provider failed (e.g. RNG exhaustion). Fatal,
    /// never retried internally.
    #[error("crypto provider error: {0}")]
    Provider(String),
}

impl Error {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub(crate) fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub(crate) fn invalid_header(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidHeaderValue {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
