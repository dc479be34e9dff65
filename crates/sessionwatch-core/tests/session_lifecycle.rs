//! End-to-end session lifecycle scenarios on tokio's paused clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};

use sessionwatch_core::auth::is_expired;
use sessionwatch_core::store::{CREDENTIAL_KEY, USER_KEY};
use sessionwatch_core::{
    AuthGrant, Authenticator, Credential, KeyValueStore, LoginError, MemoryStore,
    SessionController, SessionSettings, SessionState, SessionStore, TimerKey, User,
    VirtualClock,
};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct ScriptedAuth {
    grants: Mutex<VecDeque<AuthGrant>>,
}

#[async_trait]
impl Authenticator for ScriptedAuth {
    async fn authenticate(&self, _email: &str, _secret: &str) -> Result<AuthGrant, LoginError> {
        self.grants
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or(LoginError::InvalidCredentials(None))
    }
}

const ORIGIN_SECS: i64 = 1_700_000_000;

fn origin() -> DateTime<Utc> {
    DateTime::from_timestamp(ORIGIN_SECS, 0).expect("valid timestamp")
}

/// Unsigned credential whose `exp` is `secs` after the origin
fn credential_expiring_in(secs: i64) -> Credential {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::json!({ "sub": "42", "exp": ORIGIN_SECS + secs });
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    Credential::new(format!("{}.{}.sig", header, body))
}

fn user(id: &str) -> User {
    serde_json::from_value(serde_json::json!({ "id": id, "email": "ada@example.test" }))
        .expect("user")
}

fn grant(id: &str, secs: i64) -> AuthGrant {
    AuthGrant {
        user: user(id),
        credential: credential_expiring_in(secs),
    }
}

fn controller(
    backend: MemoryStore,
    grants: Vec<AuthGrant>,
) -> SessionController<ScriptedAuth, MemoryStore> {
    let auth = ScriptedAuth {
        grants: Mutex::new(grants.into()),
    };
    SessionController::new(
        auth,
        SessionStore::new(backend),
        Arc::new(VirtualClock::new(origin())),
        SessionSettings::default(),
    )
}

fn seed(backend: &MemoryStore, credential: &Credential) {
    SessionStore::new(backend.clone())
        .save(&user("7"), credential)
        .expect("seed store");
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_expired_credentials_never_arm_timers() {
    for secs in [-3600, -1, 0] {
        let credential = credential_expiring_in(secs);
        assert!(is_expired(&credential, origin()));

        let backend = MemoryStore::new();
        seed(&backend, &credential);
        let mut ctl = controller(backend.clone(), vec![]);

        assert_eq!(ctl.initialize(), SessionState::Unauthenticated);
        assert!(ctl.armed_timers().is_empty());
        assert!(backend.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_stored_session_expired_one_second_ago_is_silently_cleared() {
    let backend = MemoryStore::new();
    seed(&backend, &credential_expiring_in(-1));
    let mut ctl = controller(backend.clone(), vec![]);
    let status = ctl.subscribe();

    ctl.initialize();

    assert_eq!(ctl.state(), SessionState::Unauthenticated);
    assert!(!ctl.is_authenticated());
    assert!(!ctl.warning_state().is_active());
    assert!(ctl.armed_timers().is_empty());
    assert_eq!(backend.get(USER_KEY).expect("get"), None);
    assert_eq!(backend.get(CREDENTIAL_KEY).expect("get"), None);
    // Nothing was ever shown to the user
    assert!(!status.has_changed().expect("sender alive"));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_stored_credential_is_treated_as_expired() {
    let backend = MemoryStore::new();
    seed(&backend, &Credential::new("definitely-not-a-jwt"));
    let mut ctl = controller(backend.clone(), vec![]);

    assert_eq!(ctl.initialize(), SessionState::Unauthenticated);
    assert!(ctl.armed_timers().is_empty());
    assert!(backend.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_valid_stored_session_is_restored() {
    let backend = MemoryStore::new();
    seed(&backend, &credential_expiring_in(3600));
    let mut ctl = controller(backend, vec![]);

    assert_eq!(ctl.initialize(), SessionState::Authenticated);
    assert!(ctl.is_authenticated());
    assert_eq!(ctl.current_user().map(|u| u.id.as_str()), Some("7"));
    assert_eq!(
        ctl.armed_timers(),
        vec![TimerKey::WarningStart, TimerKey::HardLogout]
    );
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_long_session_arms_warning_and_logout_but_no_countdown() {
    let mut ctl = controller(MemoryStore::new(), vec![grant("1", 3600)]);
    ctl.login("ada@example.test", "pw").await.expect("login");

    assert_eq!(
        ctl.armed_timers(),
        vec![TimerKey::WarningStart, TimerKey::HardLogout]
    );

    // Still no countdown just before the warning is due (3600 - 300 = 3300s)
    ctl.run_for(Duration::from_secs(3299)).await;
    assert_eq!(ctl.state(), SessionState::Authenticated);
    assert_eq!(
        ctl.armed_timers(),
        vec![TimerKey::WarningStart, TimerKey::HardLogout]
    );

    ctl.run_for(Duration::from_millis(1500)).await;
    assert_eq!(
        ctl.state(),
        SessionState::AuthenticatedWarning { seconds_remaining: 300 }
    );
    assert_eq!(
        ctl.armed_timers(),
        vec![TimerKey::CountdownTick, TimerKey::HardLogout]
    );
}

#[tokio::test(start_paused = true)]
async fn test_warning_then_countdown_then_logout() {
    let backend = MemoryStore::new();
    let mut ctl = controller(backend.clone(), vec![grant("1", 301)]);

    ctl.login("ada@example.test", "pw").await.expect("login");
    assert_eq!(ctl.state(), SessionState::Authenticated);
    assert!(!backend.is_empty());

    ctl.run_for(Duration::from_millis(1500)).await;
    assert_eq!(
        ctl.state(),
        SessionState::AuthenticatedWarning { seconds_remaining: 300 }
    );

    // Countdown started at t=1s and ticks every second: at t=150.5s it has ticked 149 times
    ctl.run_for(Duration::from_secs(149)).await;
    assert_eq!(
        ctl.state(),
        SessionState::AuthenticatedWarning { seconds_remaining: 151 }
    );
    assert_eq!(ctl.warning_state().seconds_remaining(), 151);

    // Hard logout lands 300s after the warning started
    ctl.run_for(Duration::from_secs(151)).await;
    assert_eq!(ctl.state(), SessionState::Unauthenticated);
    assert!(!ctl.warning_state().is_active());
    assert!(ctl.armed_timers().is_empty());
    assert!(backend.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dismissed_warning_still_logs_out_at_expiry() {
    let backend = MemoryStore::new();
    let mut ctl = controller(backend.clone(), vec![grant("1", 400)]);
    ctl.login("ada@example.test", "pw").await.expect("login");

    ctl.run_for(Duration::from_secs(110)).await;
    assert!(ctl.warning_state().is_active());

    ctl.cancel_warning();
    assert_eq!(ctl.state(), SessionState::Authenticated);
    assert_eq!(ctl.armed_timers(), vec![TimerKey::HardLogout]);

    ctl.run_for(Duration::from_secs(289)).await;
    assert_eq!(ctl.state(), SessionState::Authenticated);

    ctl.run_for(Duration::from_secs(2)).await;
    assert_eq!(ctl.state(), SessionState::Unauthenticated);
    assert!(backend.is_empty());
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_twice_matches_logout_once() {
    let backend = MemoryStore::new();
    let mut ctl = controller(backend.clone(), vec![grant("1", 3600)]);
    ctl.login("ada@example.test", "pw").await.expect("login");

    ctl.logout();
    let once = (ctl.state(), ctl.warning_state(), ctl.armed_timers(), ctl.status());

    ctl.logout();
    let twice = (ctl.state(), ctl.warning_state(), ctl.armed_timers(), ctl.status());

    assert_eq!(once, twice);
    assert_eq!(ctl.state(), SessionState::Unauthenticated);
    assert!(backend.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_force_logout_during_warning() {
    let backend = MemoryStore::new();
    let mut ctl = controller(backend.clone(), vec![grant("1", 30)]);
    ctl.login("ada@example.test", "pw").await.expect("login");
    assert!(ctl.warning_state().is_active());

    ctl.force_logout();
    assert_eq!(ctl.state(), SessionState::Unauthenticated);
    assert!(ctl.armed_timers().is_empty());
    assert!(backend.is_empty());

    // Nothing left to fire
    ctl.run_for(Duration::from_secs(60)).await;
    assert_eq!(ctl.state(), SessionState::Unauthenticated);
}

// ============================================================================
// Re-login
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_relogin_discards_previous_session_timers() {
    let backend = MemoryStore::new();
    let mut ctl = controller(backend.clone(), vec![grant("a", 10), grant("b", 3600)]);

    ctl.login("a@example.test", "pw").await.expect("login a");
    ctl.login("b@example.test", "pw").await.expect("login b");

    ctl.run_for(Duration::from_secs(11)).await;
    assert!(ctl.is_authenticated());
    assert_eq!(ctl.state(), SessionState::Authenticated);
    assert_eq!(ctl.current_user().map(|u| u.id.as_str()), Some("b"));
    assert!(!backend.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_login_after_expiry_starts_fresh_machine() {
    let mut ctl = controller(MemoryStore::new(), vec![grant("a", 5), grant("b", 3600)]);

    ctl.login("a@example.test", "pw").await.expect("login a");
    ctl.run_for(Duration::from_secs(6)).await;
    assert_eq!(ctl.state(), SessionState::Unauthenticated);

    ctl.login("b@example.test", "pw").await.expect("login b");
    assert_eq!(ctl.state(), SessionState::Authenticated);
    assert!(!ctl.warning_state().is_active());
}
