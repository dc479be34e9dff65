//! Application state management for sessionwatch.
//!
//! This module contains the `App` struct that owns the single
//! `SessionController` for the process, plus the UI state around it:
//! the login form, the current view and status messages.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use sessionwatch_core::{
    ApiClient, Config, KeyValueStore, SessionController, SessionState, SessionStore, SystemClock,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum length for email input.
const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Role required for the account view
pub const ADMIN_ROLE: &str = "admin";

pub type Controller = SessionController<ApiClient, Box<dyn KeyValueStore>>;

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    ShowingHelp,
    LoggingIn,
    ConfirmingQuit,
    Quitting,
}

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginFocus {
    Email,
    Password,
    Button,
}

/// Main content view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Session,
    Account,
}

pub struct App {
    // Core services
    pub config: Config,
    pub api: ApiClient,
    pub session: Controller,

    // UI State
    pub state: AppState,
    pub view: View,
    pub status_message: Option<String>,

    // Login form
    pub login_email: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,
}

impl App {
    /// Create the application and restore any stored session
    pub fn new(config: Config) -> Result<Self> {
        let api = ApiClient::new(&config.api_base_url, config.request_timeout())?;
        let store = SessionStore::new(config.storage_backend()?);
        let mut session = SessionController::new(
            api.clone(),
            store,
            Arc::new(SystemClock),
            config.session_settings(),
        );
        let restored = session.initialize();
        info!(?restored, "Session initialized");

        let login_email = config.last_email.clone().unwrap_or_default();

        Ok(Self {
            config,
            api,
            session,

            state: AppState::Normal,
            view: View::Session,
            status_message: None,

            login_email,
            login_password: String::new(),
            login_focus: LoginFocus::Email,
            login_error: None,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Attempt login with the credentials from the login form
    pub async fn attempt_login(&mut self) -> Result<()> {
        let email = self.login_email.trim().to_string();
        let password = self.login_password.clone();

        if email.is_empty() || password.is_empty() {
            self.login_error = Some("Email and password required".to_string());
            return Err(anyhow::anyhow!("Email and password required"));
        }

        self.login_error = None;

        match self.session.login(&email, &password).await {
            Ok(session) => {
                self.config.last_email = Some(email);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }

                self.login_password.clear();
                self.state = AppState::Normal;
                self.view = View::Session;
                self.status_message = Some(format!("Signed in as {}", session.user.display_name()));
                Ok(())
            }
            Err(e) => {
                self.login_error = Some(e.user_message());
                Err(e.into())
            }
        }
    }

    /// Start the login process (show login overlay)
    pub fn start_login(&mut self) {
        self.state = AppState::LoggingIn;
        self.login_focus = if self.login_email.is_empty() {
            LoginFocus::Email
        } else {
            LoginFocus::Password
        };
        self.login_error = None;
    }

    /// "Sign out now"
    pub fn sign_out(&mut self) {
        self.session.force_logout();
        self.status_message = Some("Signed out".to_string());
        self.start_login();
    }

    /// "Stay signed in"
    pub fn dismiss_warning(&mut self) {
        if self.session.warning_state().is_active() {
            self.session.cancel_warning();
            self.status_message = Some("Warning dismissed - session still ends at expiry".to_string());
        }
    }

    /// Apply elapsed session timers; show the login form once the session ends
    pub fn check_session(&mut self) {
        let was_authenticated = self.session.state().is_authenticated();
        self.session.process_pending_timers();

        if self.session.state() == SessionState::Unauthenticated
            && !matches!(self.state, AppState::LoggingIn | AppState::Quitting)
        {
            if was_authenticated {
                self.status_message = Some("Session expired. Please log in again.".to_string());
            }
            self.start_login();
        }
    }

    /// Re-fetch the user record from the server
    pub async fn refresh_profile(&mut self) {
        let Some(credential) = self.session.credential() else {
            return;
        };
        let client = self.api.with_token(credential);

        match client.fetch_profile().await {
            Ok(user) => {
                self.session.update_user(user);
                self.status_message = Some("Profile refreshed".to_string());
            }
            Err(e) if e.is_unauthorized() => {
                self.session.handle_unauthorized();
                self.status_message = Some("Session expired. Please log in again.".to_string());
                self.start_login();
            }
            Err(e) => {
                warn!(error = %e, "Profile refresh failed");
                self.status_message = Some(format!("Error: {}", e));
            }
        }
    }

    /// Switch views, guarding the account view by role
    pub fn show_view(&mut self, view: View) {
        if view == View::Account && !self.session.has_required_role(ADMIN_ROLE) {
            self.status_message = Some("Admin role required".to_string());
            return;
        }
        self.view = view;
    }

    /// Human-readable time until the credential expires
    pub fn time_remaining_display(&self) -> String {
        match self.session.expires_at() {
            Some(expires_at) => format_remaining(expires_at - Utc::now()),
            None => "-".to_string(),
        }
    }
}

/// Format a remaining duration as "1h 05m", "4m 09s" or "12s"
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Check if a character is valid for text input (not a control character)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

pub fn can_add_email_char(current_len: usize, c: char) -> bool {
    current_len < MAX_EMAIL_LENGTH && is_valid_input_char(c) && !c.is_whitespace()
}

pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================
