//! Credential and identity types.
//!
//! This module provides:
//! - `codec`: Decoding of a bearer credential's payload (no signature check)
//! - `expiry`: Expiry instants, fail-closed expiry checks and the `Clock` seam
//! - `models`: The `User` record and the live `Session`

pub mod codec;
pub mod expiry;
pub mod models;

pub use codec::{Credential, DecodeError, Payload};
pub use expiry::{expiry_instant, is_expired, Clock, SystemClock, VirtualClock};
pub use models::{Session, User, UserId};
