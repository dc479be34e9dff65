//! Client-side session lifecycle management.
//!
//! sessionwatch holds a bearer credential, works out when it will expire,
//! warns before it does, and guarantees a single clean logout whichever way
//! the session ends (explicit sign-out, expiry, or a server rejection).
//!
//! - `auth`: Credential decoding, expiry checks, user/session types
//! - `timers`: Cancellable warning, countdown and logout timers
//! - `store`: Durable persistence of the signed-in user and credential
//! - `session`: The `SessionController` state machine
//! - `api`: HTTP client for the authentication service
//! - `config`: Application configuration
//!
//! Credentials are decoded without signature verification. The decoded `exp`
//! only drives client-side timing; the server authorizes every request on
//! its own.

pub mod api;
pub mod auth;
pub mod config;
pub mod session;
pub mod store;
pub mod timers;

pub use api::{ApiClient, ApiError, AuthGrant, Authenticator, LoginError};
pub use auth::{Clock, Credential, Session, SystemClock, User, UserId, VirtualClock};
pub use config::Config;
pub use session::{SessionController, SessionSettings, SessionState, SessionStatus, WarningState};
pub use store::{KeyValueStore, MemoryStore, SessionStore, StoreError};
pub use timers::{TimerKey, TimerSet};
