//! Shell views: loading and signed-out screens, header and footer.

use ratatui::Frame;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use super::Focus;
use crate::state::AppState;

/// Spinner frames for the loading screen.
const SPINNER_FRAMES: &[&str] = &["◐", "◓", "◑", "◒"];

pub const LOADING_TEXT: &str = "Loading authentication…";
pub const SIGNED_OUT_TEXT: &str = "User not authenticated";
pub const NO_ROLES_TEXT: &str = "no roles";

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn hint(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::DarkGray),
    ))
}

pub fn render_loading(app: &AppState, frame: &mut Frame, area: Rect) {
    let spinner = SPINNER_FRAMES[app.spinner_frame % SPINNER_FRAMES.len()];
    let mut lines = vec![
        Line::from(Span::styled(
            format!("{spinner} {LOADING_TEXT}"),
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
    ];
    if let Some(url) = &app.session.login_url {
        lines.push(Line::from("Complete the sign-in in your browser. If it did not open, visit:"));
        lines.push(Line::from(Span::styled(
            url.clone(),
            Style::default().fg(Color::Cyan),
        )));
        lines.push(Line::from(""));
    }
    lines.push(hint("q to quit"));

    let popup = centered(area, 76, 12);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Campus ");
    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: false }),
        popup,
    );
}

pub fn render_signed_out(app: &AppState, frame: &mut Frame, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(
            SIGNED_OUT_TEXT,
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    if let Some(message) = &app.signed_out {
        lines.push(Line::from(message.clone()));
        lines.push(Line::from(""));
    } else if let Some(failure) = &app.session.failure {
        lines.push(Line::from(Span::styled(
            failure.clone(),
            Style::default().fg(Color::Yellow),
        )));
        lines.push(Line::from(""));
    }
    lines.push(hint("Run `campus login` to sign in. q to quit."));

    let popup = centered(area, 76, 10);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Campus ");
    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false }),
        popup,
    );
}

pub fn header_lines(app: &AppState) -> Vec<Line<'static>> {
    let name = app
        .session
        .display_name()
        .unwrap_or_else(|| "Signed in".to_string());
    let mut identity = vec![Span::styled(
        name,
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];
    if let Some(email) = app.session.email() {
        identity.push(Span::styled(
            format!(" <{email}>"),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let roles = if app.session.roles.is_empty() {
        NO_ROLES_TEXT.to_string()
    } else {
        app.session
            .roles
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    vec![
        Line::from(identity),
        Line::from(vec![
            Span::styled("Roles: ", Style::default().fg(Color::DarkGray)),
            Span::styled(roles, Style::default().fg(Color::Cyan)),
        ]),
    ]
}

pub fn render_header(app: &AppState, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Campus ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    frame.render_widget(Paragraph::new(header_lines(app)).block(block), area);
}

pub fn render_footer(app: &AppState, frame: &mut Frame, area: Rect) {
    let line = if let Some(notice) = &app.notice {
        Line::from(Span::styled(
            notice.text.clone(),
            Style::default().fg(Color::Green),
        ))
    } else {
        let keys = match app.focus {
            Focus::Courses if app.access().manage_courses => {
                "↑↓ select · r refresh · Tab new course · L logout · q quit"
            }
            Focus::Courses => "↑↓ select · r refresh · L logout · q quit",
            Focus::Form => "Enter submit · Tab/↑↓ switch field · Esc back · Ctrl+C quit",
        };
        hint(keys)
    };
    frame.render_widget(Paragraph::new(line), area);
}
