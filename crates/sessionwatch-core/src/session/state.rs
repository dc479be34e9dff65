use chrono::{DateTime, Utc};

use crate::auth::User;

/// Where the session state machine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated,
    AuthenticatedWarning { seconds_remaining: u32 },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, SessionState::Unauthenticated)
    }
}

/// Expiry warning shown to the user. Never persisted.
///
/// Inactive always means zero seconds remaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WarningState {
    active: bool,
    seconds_remaining: u32,
}

impl WarningState {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn active(seconds_remaining: u32) -> Self {
        Self {
            active: true,
            seconds_remaining,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    /// Countdown text, e.g. "4:05"
    pub fn countdown_display(&self) -> String {
        format!(
            "{}:{:02}",
            self.seconds_remaining / 60,
            self.seconds_remaining % 60
        )
    }
}

/// Snapshot published to subscribers after every transition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionStatus {
    pub state: SessionState,
    pub user: Option<User>,
    pub warning: WarningState,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_warning_has_no_seconds() {
        let warning = WarningState::inactive();
        assert!(!warning.is_active());
        assert_eq!(warning.seconds_remaining(), 0);
        assert_eq!(warning, WarningState::default());
    }

    #[test]
    fn test_countdown_display() {
        assert_eq!(WarningState::active(300).countdown_display(), "5:00");
        assert_eq!(WarningState::active(245).countdown_display(), "4:05");
        assert_eq!(WarningState::active(9).countdown_display(), "0:09");
    }

    #[test]
    fn test_state_is_authenticated() {
        assert!(!SessionState::Unauthenticated.is_authenticated());
        assert!(SessionState::Authenticated.is_authenticated());
        assert!(SessionState::AuthenticatedWarning { seconds_remaining: 0 }.is_authenticated());
    }
}
