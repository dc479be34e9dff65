//! sessionwatch - a terminal client that keeps an eye on your sign-in.
//!
//! Restores the stored session on startup, warns before the credential
//! expires, and returns to the login form once it does.

mod app;
mod ui;

use std::io;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessionwatch_core::auth::{expiry_instant, is_expired};
use sessionwatch_core::store::StoredSession;
use sessionwatch_core::{Config, SessionStore};

use app::{App, AppState};
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

const LOG_FILE: &str = "sessionwatch.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to a file since the terminal belongs to the UI. The returned
/// guard must be held until exit so buffered lines are flushed.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config.log_dir().ok()?;
    std::fs::create_dir_all(&log_dir).ok()?;
    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load config ({}), using defaults", e);
        Config::default()
    });
    let _guard = init_tracing(&config);

    // Check for CLI commands
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "--status" {
        return print_status(&config);
    }
    if args.len() > 1 && args[1] == "--logout" {
        return clear_session(&config);
    }

    info!("sessionwatch starting");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = match App::new(config) {
        Ok(mut app) => {
            if !app.is_authenticated() {
                app.start_login();
            }
            run_app(&mut terminal, &mut app).await
        }
        Err(e) => Err(e),
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!("sessionwatch shutting down");
    Ok(())
}

/// Print the stored session's status without starting the UI.
///
/// Read-only: no timers are armed and an expired session is left in place.
fn print_status(config: &Config) -> Result<()> {
    let store = SessionStore::new(config.storage_backend()?);
    for line in status_lines(store.load(), Utc::now()) {
        println!("{}", line);
    }
    Ok(())
}

fn status_lines(stored: Option<StoredSession>, now: DateTime<Utc>) -> Vec<String> {
    let Some(stored) = stored else {
        return vec!["Not signed in".to_string()];
    };
    let Ok(expires_at) = expiry_instant(&stored.credential) else {
        return vec!["Stored credential is unreadable".to_string()];
    };
    if is_expired(&stored.credential, now) {
        return vec![format!(
            "Stored session for {} has expired",
            stored.user.display_name()
        )];
    }

    let mut lines = vec![format!("Signed in as {}", stored.user.display_name())];
    if let Some(role) = &stored.user.role {
        lines.push(format!("Role:       {}", role));
    }
    lines.push(format!(
        "Expires at: {}",
        expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    ));
    lines.push(format!(
        "Remaining:  {}",
        app::format_remaining(expires_at - now)
    ));
    lines
}

/// Remove the stored session without contacting the server
fn clear_session(config: &Config) -> Result<()> {
    let store = SessionStore::new(config.storage_backend()?);
    if let Err(e) = store.clear() {
        warn!(error = %e, "Failed to clear stored session");
        return Err(e.into());
    }
    println!("Signed out");
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        // Draw UI
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout so timers keep firing while idle
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            if let Event::Key(key) = event::read()? {
                // Ctrl+C to quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                if handle_input(app, key).await? {
                    return Ok(());
                }
            }
        }

        // Apply any session timers that elapsed
        app.check_session();

        // Check if we should quit
        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use sessionwatch_core::{Credential, KeyValueStore, MemoryStore, User};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
    }

    fn stored(exp: i64) -> StoredSession {
        let body = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
        let user: User = serde_json::from_value(serde_json::json!({
            "id": "1",
            "name": "Ada",
            "role": "admin"
        }))
        .expect("user");
        StoredSession {
            user,
            credential: Credential::new(format!("h.{}.s", body)),
        }
    }

    #[test]
    fn test_status_lines_for_live_session() {
        let lines = status_lines(Some(stored(1_700_000_090)), now());
        assert_eq!(lines[0], "Signed in as Ada");
        assert_eq!(lines[1], "Role:       admin");
        assert_eq!(lines[3], "Remaining:  1m 30s");
    }

    #[test]
    fn test_status_lines_leave_expired_session_in_place() {
        let backend = MemoryStore::new();
        let session = stored(1_699_999_999);
        let store = SessionStore::new(backend.clone());
        store.save(&session.user, &session.credential).expect("save");

        let lines = status_lines(store.load(), now());
        assert_eq!(lines, vec!["Stored session for Ada has expired".to_string()]);
        assert!(backend.get("token").expect("get").is_some());
        assert!(!backend.is_empty());
    }

    #[test]
    fn test_status_lines_without_session() {
        assert_eq!(status_lines(None, now()), vec!["Not signed in".to_string()]);
    }
}
