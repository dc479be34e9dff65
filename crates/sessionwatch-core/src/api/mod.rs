//! Client for the authentication service.
//!
//! This module provides the `Authenticator` seam the session controller logs
//! in through, the reqwest-backed `ApiClient` implementing it, and the error
//! types for login (`LoginError`) and authenticated requests (`ApiError`).

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthGrant, Authenticator, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::{ApiError, LoginError};
