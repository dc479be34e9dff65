use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use sessionwatch_core::{SessionState, WarningState};

use crate::app::{App, AppState, LoginFocus, View};

use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let warning = app.session.warning_state();
    let banner_height = if warning.is_active() { 3 } else { 0 };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),             // Title bar
            Constraint::Length(banner_height), // Expiry warning
            Constraint::Min(8),                // Main content
            Constraint::Length(2),             // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    if warning.is_active() {
        render_warning_banner(frame, app, chunks[1]);
    }
    render_main_content(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    // Render overlays
    match app.state {
        AppState::ShowingHelp => render_help_overlay(frame),
        AppState::LoggingIn => render_login_overlay(frame, app),
        AppState::ConfirmingQuit => render_quit_overlay(frame),
        AppState::Normal | AppState::Quitting => {}
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  sessionwatch";
    let who = match app.session.current_user() {
        Some(user) => format!("{}  [?] Help", user.display_name()),
        None => "[?] Help".to_string(),
    };

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            (area.width as usize).saturating_sub(title.len() + who.len() + 2),
        )),
        Span::styled(who, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_warning_banner(frame: &mut Frame, app: &App, area: Rect) {
    let warning = app.session.warning_state();
    let style = styles::warning_banner_style(warning.seconds_remaining());

    let text = warning_banner_text(&warning);

    let block = Block::default().borders(Borders::ALL).border_style(style);
    frame.render_widget(Paragraph::new(Line::from(text)).style(style).block(block), area);
}

/// Banner text; at zero the hard-logout timer is about to end the session
fn warning_banner_text(warning: &WarningState) -> String {
    if warning.seconds_remaining() == 0 {
        " Signing out...".to_string()
    } else {
        format!(
            " Your session expires in {}   [s] Stay signed in   [l] Sign out now",
            warning.countdown_display()
        )
    }
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    let tabs = Line::from(vec![
        Span::raw(" "),
        Span::styled("[1] Session", styles::tab_style(app.view == View::Session)),
        Span::styled(" | ", styles::muted_style()),
        Span::styled("[2] Account", styles::tab_style(app.view == View::Account)),
    ]);

    let mut lines = vec![tabs, Line::from("")];
    match app.view {
        View::Session => session_lines(app, &mut lines),
        View::Account => account_lines(app, &mut lines),
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn field<'a>(label: &'a str, value: String, style: Style) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("  {:<14}", label), styles::muted_style()),
        Span::styled(value, style),
    ])
}

fn session_lines(app: &App, lines: &mut Vec<Line<'_>>) {
    let Some(session) = app.session.session() else {
        lines.push(Line::from(Span::styled("  Not signed in", styles::muted_style())));
        return;
    };

    let state = match app.session.state() {
        SessionState::Unauthenticated => ("Signed out".to_string(), styles::error_style()),
        SessionState::Authenticated => ("Active".to_string(), styles::success_style()),
        SessionState::AuthenticatedWarning { seconds_remaining } => (
            format!("Expiring ({}s left)", seconds_remaining),
            styles::highlight_style(),
        ),
    };

    lines.push(field("User", session.user.display_name(), styles::list_item_style()));
    lines.push(field(
        "Email",
        session.user.email.clone().unwrap_or_else(|| "-".to_string()),
        styles::list_item_style(),
    ));
    lines.push(field(
        "Role",
        session.user.role.clone().unwrap_or_else(|| "-".to_string()),
        styles::list_item_style(),
    ));
    lines.push(field("Status", state.0, state.1));
    lines.push(field(
        "Expires at",
        session
            .expires_at
            .with_timezone(&Local)
            .format("%b %d, %Y %H:%M:%S")
            .to_string(),
        styles::list_item_style(),
    ));
    lines.push(field("Remaining", app.time_remaining_display(), styles::list_item_style()));
}

fn account_lines(app: &App, lines: &mut Vec<Line<'_>>) {
    let Some(user) = app.session.current_user() else {
        return;
    };

    lines.push(field("Id", user.id.to_string(), styles::list_item_style()));
    let mut extra: Vec<_> = user.extra.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in extra {
        let value = match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<14}", key), styles::muted_style()),
            Span::styled(value, styles::list_item_style()),
        ]));
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = "[r]efresh | [l]ogout | [q]uit";

    let left_text = match app.status_message {
        Some(ref msg) => format!(" {} ", msg),
        None => String::new(),
    };
    let right_text = format!(" {} ", shortcuts);

    let padding_len = (area.width as usize)
        .saturating_sub(left_text.len())
        .saturating_sub(right_text.len());
    let status_line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    frame.render_widget(
        Paragraph::new(status_line).style(styles::status_bar_style()),
        area,
    );
}

fn help_line<'a>(key: &'a str, desc: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), styles::help_key_style()),
        Span::styled(desc, styles::help_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(50, 16, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");
    let help_text = vec![
        Line::from(Span::styled(
            format!("  sessionwatch {}", version),
            styles::title_style(),
        )),
        Line::from(""),
        Line::from(Span::styled(" Session", styles::highlight_style())),
        help_line("s", "Stay signed in (dismiss warning)"),
        help_line("l", "Sign out now"),
        help_line("r", "Refresh profile from server"),
        Line::from(""),
        Line::from(Span::styled(" Views", styles::highlight_style())),
        help_line("1", "Session details"),
        help_line("2", "Account record (admin)"),
        help_line("q", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("       Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

fn render_login_overlay(frame: &mut Frame, app: &App) {
    let height = if app.login_error.is_some() { 11 } else { 9 };
    let area = centered_rect_fixed(52, height, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled("  Sign in", styles::title_style())),
        Line::from(""),
    ];

    let field_style = |focused: bool| {
        if focused {
            styles::selected_style()
        } else {
            styles::list_item_style()
        }
    };

    let email_focused = app.login_focus == LoginFocus::Email;
    let email_tail: String = app
        .login_email
        .chars()
        .rev()
        .take(24)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    lines.push(Line::from(vec![
        Span::styled("  Email:    [", styles::muted_style()),
        Span::styled(
            format!("{:<24}{}", email_tail, if email_focused { "▌" } else { "" }),
            field_style(email_focused),
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    let password_focused = app.login_focus == LoginFocus::Password;
    let password_masked = "*".repeat(app.login_password.chars().count().min(24));
    lines.push(Line::from(vec![
        Span::styled("  Password: [", styles::muted_style()),
        Span::styled(
            format!("{:<24}{}", password_masked, if password_focused { "▌" } else { "" }),
            field_style(password_focused),
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    lines.push(Line::from(""));
    let button_focused = app.login_focus == LoginFocus::Button;
    let button_label = if button_focused { " ▶ Login ◀ " } else { "   Login   " };
    lines.push(Line::from(vec![
        Span::raw("                 ["),
        Span::styled(button_label, field_style(button_focused)),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(" {}", error),
            styles::error_style(),
        )));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 6, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Are you sure you want to quit?",
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to quit, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}
