//! The session state machine.
//!
//! `SessionController` is the single writer of session state. Timers armed
//! through `TimerSet` only report back over a channel; the controller applies
//! their effect when it drains that channel (`process_pending_timers`,
//! `next_timer`, `run_until`).
//!
//! Transitions:
//!
//! ```text
//! Unauthenticated --login/initialize--> Authenticated
//! Authenticated --warning-start--> AuthenticatedWarning(window)
//! AuthenticatedWarning(n) --tick--> AuthenticatedWarning(n - 1)
//! AuthenticatedWarning(_) --cancel_warning--> Authenticated
//! any authenticated --hard-logout/force_logout/unauthorized--> Unauthenticated
//! ```
//!
//! Only the hard-logout timer (or an explicit action) ends a session. The
//! countdown reaching zero just stops the countdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::api::{Authenticator, LoginError};
use crate::auth::{expiry_instant, Clock, Credential, Session, User};
use crate::store::{KeyValueStore, SessionStore};
use crate::timers::{TimerFired, TimerKey, TimerSet};

use super::state::{SessionState, SessionStatus, WarningState};

/// Warn this long before the credential expires.
pub const DEFAULT_WARNING_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Countdown display refresh period
pub const DEFAULT_COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub warning_window: Duration,
    pub countdown_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            warning_window: DEFAULT_WARNING_WINDOW,
            countdown_interval: DEFAULT_COUNTDOWN_INTERVAL,
        }
    }
}

pub struct SessionController<A, S> {
    auth: A,
    store: SessionStore<S>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    timers: TimerSet,
    fired: mpsc::Receiver<TimerFired>,
    session: Option<Session>,
    state: SessionState,
    warning: WarningState,
    initialized: bool,
    status_tx: watch::Sender<SessionStatus>,
}

impl<A: Authenticator, S: KeyValueStore> SessionController<A, S> {
    pub fn new(
        auth: A,
        store: SessionStore<S>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let (timers, fired) = TimerSet::new();
        let (status_tx, _) = watch::channel(SessionStatus::default());

        Self {
            auth,
            store,
            clock,
            settings,
            timers,
            fired,
            session: None,
            state: SessionState::Unauthenticated,
            warning: WarningState::inactive(),
            initialized: false,
            status_tx,
        }
    }

    // =========================================================================
    // Public Session API
    // =========================================================================

    /// Restore the persisted session, if it is still valid.
    ///
    /// Runs once; later calls return the current state untouched. A stored
    /// session that has already expired (or cannot be decoded) is cleared
    /// silently, with no warning and no timers.
    pub fn initialize(&mut self) -> SessionState {
        if self.initialized {
            debug!("Session controller already initialized");
            return self.state;
        }
        self.initialized = true;

        let Some(stored) = self.store.load() else {
            debug!("No stored session");
            return self.state;
        };

        let now = self.clock.now();
        let expires_at = match expiry_instant(&stored.credential) {
            Ok(expires_at) if expires_at > now => expires_at,
            Ok(expires_at) => {
                info!(%expires_at, "Stored session already expired");
                self.clear_store();
                return self.state;
            }
            Err(e) => {
                warn!(error = %e, "Stored credential unreadable, treating as expired");
                self.clear_store();
                return self.state;
            }
        };

        info!(user_id = %stored.user.id, %expires_at, "Restored stored session");
        self.session = Some(Session {
            user: stored.user,
            credential: stored.credential,
            expires_at,
        });
        self.state = SessionState::Authenticated;
        self.arm_schedules();
        self.publish();
        self.state
    }

    /// Authenticate and start a new session, replacing any current one.
    ///
    /// On failure nothing changes and the error is returned for the caller
    /// to present. Failures are not retried.
    pub async fn login(&mut self, email: &str, secret: &str) -> Result<Session, LoginError> {
        let grant = match self.auth.authenticate(email, secret).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Err(e);
            }
        };

        let expires_at = expiry_instant(&grant.credential).map_err(|e| {
            warn!(error = %e, "Issued credential is unreadable");
            LoginError::ServerError(format!("Issued credential is unreadable: {}", e))
        })?;

        self.timers.cancel_all();
        self.warning = WarningState::inactive();
        self.initialized = true;

        if let Err(e) = self.store.save(&grant.user, &grant.credential) {
            warn!(error = %e, "Failed to save session");
        }

        let session = Session {
            user: grant.user,
            credential: grant.credential,
            expires_at,
        };
        info!(user_id = %session.user.id, %expires_at, "Login successful");
        self.session = Some(session.clone());
        self.state = SessionState::Authenticated;
        self.arm_schedules();
        self.publish();
        Ok(session)
    }

    /// Dismiss the expiry warning ("stay signed in").
    ///
    /// Stops only the countdown; the hard-logout timer keeps running, so the
    /// session still ends at the credential's expiry.
    pub fn cancel_warning(&mut self) {
        if !self.warning.is_active() {
            return;
        }
        self.timers.cancel(TimerKey::CountdownTick);
        self.warning = WarningState::inactive();
        self.state = SessionState::Authenticated;
        info!("Expiry warning dismissed");
        self.publish();
    }

    /// Sign out now, as if the hard-logout timer had fired early
    pub fn force_logout(&mut self) {
        info!("Logout requested");
        self.logout();
    }

    /// End the session. Safe to call repeatedly.
    pub fn logout(&mut self) {
        let was_live = self.session.is_some();

        self.timers.cancel_all();
        self.clear_store();
        self.session = None;
        self.warning = WarningState::inactive();
        self.state = SessionState::Unauthenticated;

        if was_live {
            info!("Logged out");
            self.publish();
        }
    }

    /// Replace the user record without touching the credential or timers
    pub fn update_user(&mut self, user: User) {
        let Some(session) = self.session.as_mut() else {
            debug!("No live session, ignoring user update");
            return;
        };

        if let Err(e) = self.store.save_user(&user) {
            warn!(error = %e, "Failed to save updated user");
        }
        debug!(user_id = %user.id, "User record updated");
        session.user = user;
        self.publish();
    }

    /// The server rejected the credential (HTTP 401): end the session
    pub fn handle_unauthorized(&mut self) {
        if self.session.is_none() {
            return;
        }
        warn!("Credential rejected by server, ending session");
        self.logout();
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Live session whose credential has not yet expired
    pub fn is_authenticated(&self) -> bool {
        let now = self.clock.now();
        self.session
            .as_ref()
            .map(|s| !s.is_expired(now))
            .unwrap_or(false)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn warning_state(&self) -> WarningState {
        self.warning
    }

    pub fn current_user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.session.as_ref().map(|s| &s.credential)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.expires_at)
    }

    /// Route-guard check: authenticated and holding `role`
    pub fn has_required_role(&self, role: &str) -> bool {
        self.is_authenticated() && self.current_user().map(|u| u.has_role(role)).unwrap_or(false)
    }

    /// Route-guard check: authenticated and holding any of `roles`
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_required_role(role))
    }

    pub fn armed_timers(&self) -> Vec<TimerKey> {
        self.timers.armed_keys()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            user: self.current_user().cloned(),
            warning: self.warning,
            expires_at: self.expires_at(),
        }
    }

    /// Receive a fresh `SessionStatus` after every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    // =========================================================================
    // Timer Delivery
    // =========================================================================

    /// Apply every timer firing already queued, without waiting.
    /// Returns how many were applied (stale firings are not counted).
    pub fn process_pending_timers(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(fired) = self.fired.try_recv() {
            if self.handle_timer(fired) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next timer firing that still applies, and apply it.
    pub async fn next_timer(&mut self) -> Option<TimerKey> {
        loop {
            let fired = self.fired.recv().await?;
            if self.handle_timer(fired) {
                return Some(fired.key);
            }
        }
    }

    /// Apply timer firings as they arrive until `deadline`
    pub async fn run_until(&mut self, deadline: Instant) {
        loop {
            let fired = tokio::select! {
                biased;
                fired = self.fired.recv() => fired,
                _ = time::sleep_until(deadline) => None,
            };
            match fired {
                Some(fired) => {
                    self.handle_timer(fired);
                }
                None => return,
            }
        }
    }

    pub async fn run_for(&mut self, duration: Duration) {
        self.run_until(Instant::now() + duration).await;
    }

    fn handle_timer(&mut self, fired: TimerFired) -> bool {
        if !self.timers.accept(fired) {
            return false;
        }
        if self.session.is_none() {
            debug!(key = ?fired.key, "Timer fired without a live session");
            return false;
        }

        match fired.key {
            TimerKey::WarningStart => self.on_warning_start(),
            TimerKey::CountdownTick => self.on_countdown_tick(),
            TimerKey::HardLogout => {
                info!("Session expired");
                self.logout();
                return true;
            }
        }
        self.publish();
        true
    }

    // =========================================================================
    // State Machine Internals
    // =========================================================================

    /// Arm timers for the live credential, or log out if it has run out.
    fn arm_schedules(&mut self) {
        let Some(expires_at) = self.expires_at() else {
            return;
        };

        let remaining = match (expires_at - self.clock.now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => {
                info!(%expires_at, "Credential expired before timers were armed");
                self.logout();
                return;
            }
        };

        self.timers.schedule_once(TimerKey::HardLogout, remaining);

        if remaining > self.settings.warning_window {
            self.timers
                .schedule_once(TimerKey::WarningStart, remaining - self.settings.warning_window);
            self.state = SessionState::Authenticated;
        } else {
            self.enter_warning(whole_secs(remaining));
        }
        debug!(remaining_secs = remaining.as_secs(), "Session timers armed");
    }

    fn on_warning_start(&mut self) {
        if self.state != SessionState::Authenticated {
            return;
        }
        self.enter_warning(whole_secs(self.settings.warning_window));
    }

    fn enter_warning(&mut self, seconds_remaining: u32) {
        info!(seconds_remaining, "Session expiring soon");
        self.warning = WarningState::active(seconds_remaining);
        self.state = SessionState::AuthenticatedWarning { seconds_remaining };
        self.timers
            .schedule_repeating(TimerKey::CountdownTick, self.settings.countdown_interval);
    }

    fn on_countdown_tick(&mut self) {
        if !self.warning.is_active() {
            return;
        }

        let seconds_remaining = self.warning.seconds_remaining().saturating_sub(1);
        self.warning = WarningState::active(seconds_remaining);
        self.state = SessionState::AuthenticatedWarning { seconds_remaining };

        // The hard-logout timer ends the session, not the countdown
        if seconds_remaining == 0 {
            self.timers.cancel(TimerKey::CountdownTick);
            debug!("Countdown finished");
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

/// Whole seconds in `duration`, saturating at `u32::MAX`
fn whole_secs(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}
