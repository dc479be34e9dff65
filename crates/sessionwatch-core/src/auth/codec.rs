//! Bearer credential decoding.
//!
//! A credential is three dot-separated segments; the middle one is a
//! base64url-encoded JSON payload carrying at least an `exp` claim.
//!
//! The signature segment is never checked. The client cannot verify
//! authenticity, so decoded claims are only used to time UX (expiry warnings,
//! proactive logout). Every API call is still authorized server-side.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of dot-separated segments in a well-formed credential
const SEGMENT_COUNT: usize = 3;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed credential: expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("Malformed credential: payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Malformed credential: payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed credential: exp {0} is out of range")]
    ExpiryOutOfRange(i64),
}

/// An issued bearer credential.
///
/// Immutable once issued; a new login replaces it wholesale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the bearer value.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

impl From<String> for Credential {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Decoded claims. Only `exp` is interpreted; everything else is carried along.
#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    /// Absolute expiration, seconds since the Unix epoch
    pub exp: i64,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Decode the payload segment of a credential. Pure; no signature check.
pub fn decode(credential: &Credential) -> Result<Payload, DecodeError> {
    let segments: Vec<&str> = credential.as_str().split('.').collect();
    if segments.len() != SEGMENT_COUNT {
        return Err(DecodeError::SegmentCount(segments.len()));
    }

    // Some issuers keep the base64 padding; the URL-safe alphabet is the same.
    let bytes = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    let payload = serde_json::from_slice(&bytes)?;
    Ok(payload)
}
