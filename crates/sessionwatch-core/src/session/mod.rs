//! Session lifecycle management.
//!
//! This module provides:
//! - `SessionController`: Owns the live session and drives the
//!   warning/countdown/logout state machine from armed timers
//! - `SessionState`, `WarningState`, `SessionStatus`: The observable state
//!
//! A session is logged out exactly when its credential's `exp` passes, unless
//! the user signs out first. The expiry warning is cosmetic: dismissing it or
//! letting its countdown hit zero never moves the actual logout.

pub mod controller;
pub mod state;

pub use controller::{SessionController, SessionSettings};
pub use state::{SessionState, SessionStatus, WarningState};
