//! Course creation form view.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use super::FormField;
use crate::features::shell::Focus;
use crate::state::AppState;

pub const ADMIN_ONLY_TEXT: &str = "Course management requires the admin role.";

fn field_line(label: &str, value: &str, active: bool) -> Vec<Line<'static>> {
    let label_style = if active {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let mut value_spans = vec![Span::raw(format!("  {value}"))];
    if active {
        value_spans.push(Span::styled("▏", Style::default().fg(Color::Cyan)));
    }
    vec![
        Line::from(Span::styled(label.to_string(), label_style)),
        Line::from(value_spans),
    ]
}

pub fn render_course_form(app: &AppState, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Form;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray }))
        .title(" New course ");

    if !app.access().manage_courses {
        let para = Paragraph::new(Span::styled(
            ADMIN_ONLY_TEXT,
            Style::default().fg(Color::DarkGray),
        ))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(para, area);
        return;
    }

    let form = &app.form;
    let mut lines = field_line(
        "Title",
        &form.title,
        focused && form.field == FormField::Title,
    );
    lines.push(Line::from(""));
    lines.extend(field_line(
        "Description",
        &form.description,
        focused && form.field == FormField::Description,
    ));
    lines.push(Line::from(""));

    if form.submitting {
        lines.push(Line::from(Span::styled(
            "Submitting…",
            Style::default().fg(Color::Yellow),
        )));
    } else if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    } else if !focused {
        lines.push(Line::from(Span::styled(
            "Tab to add a course",
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}
