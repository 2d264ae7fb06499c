//! Course list view.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use super::{CourseList, EMPTY_MESSAGE};
use crate::common::text::{single_line, truncate_with_ellipsis};
use crate::features::shell::Focus;
use crate::state::AppState;

pub const ACCESS_DENIED_TEXT: &str = "Access denied: the student or admin role is required.";

pub fn render_course_list(app: &AppState, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Courses;
    let title = if app.courses.loading {
        " Courses (loading…) "
    } else {
        " Courses "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray }))
        .title(title);

    if !app.access().courses {
        let para = Paragraph::new(Span::styled(
            ACCESS_DENIED_TEXT,
            Style::default().fg(Color::Yellow),
        ))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(para, area);
        return;
    }

    let message = |text: &str, color: Color| {
        Paragraph::new(Span::styled(text.to_string(), Style::default().fg(color)))
            .wrap(Wrap { trim: true })
    };

    match &app.courses.list {
        CourseList::NotLoaded => {
            frame.render_widget(message("Loading courses…", Color::DarkGray).block(block), area);
        }
        CourseList::Failed(error) => {
            frame.render_widget(message(error, Color::Red).block(block), area);
        }
        CourseList::Loaded(courses) if courses.is_empty() => {
            frame.render_widget(message(EMPTY_MESSAGE, Color::DarkGray).block(block), area);
        }
        CourseList::Loaded(courses) => {
            let width = usize::from(area.width.saturating_sub(4));
            let items: Vec<ListItem> = courses
                .iter()
                .map(|course| {
                    let title = truncate_with_ellipsis(
                        &format!("#{} {}", course.id, single_line(&course.title)),
                        width,
                    );
                    let mut lines = vec![Line::from(Span::styled(
                        title,
                        Style::default().fg(Color::White),
                    ))];
                    if let Some(description) = course.description.as_deref() {
                        lines.push(Line::from(Span::styled(
                            truncate_with_ellipsis(&single_line(description), width),
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                    ListItem::new(lines)
                })
                .collect();

            let list = List::new(items)
                .block(block)
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
                .highlight_symbol("› ");
            let mut state = ListState::default().with_selected(Some(app.courses.selected));
            frame.render_stateful_widget(list, area, &mut state);
        }
    }
}
