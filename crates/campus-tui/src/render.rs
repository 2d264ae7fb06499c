//! Pure view/render functions for the TUI.
//!
//! Functions here take `&AppState`, draw to a ratatui `Frame`, and never
//! mutate state or return effects.

use campus_core::session::Phase;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout};

use crate::features::{course_form, courses, shell};
use crate::state::AppState;

const HEADER_HEIGHT: u16 = 4;
const FOOTER_HEIGHT: u16 = 1;

/// Renders the entire TUI to the frame.
pub fn render(app: &AppState, frame: &mut Frame) {
    let area = frame.area();
    match app.session.phase {
        Phase::Loading => shell::render::render_loading(app, frame, area),
        Phase::Unauthenticated => shell::render::render_signed_out(app, frame, area),
        Phase::Authenticated => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(HEADER_HEIGHT),
                    Constraint::Min(3),
                    Constraint::Length(FOOTER_HEIGHT),
                ])
                .split(area);
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(rows[1]);

            shell::render::render_header(app, frame, rows[0]);
            courses::render::render_course_list(app, frame, columns[0]);
            course_form::render::render_course_form(app, frame, columns[1]);
            shell::render::render_footer(app, frame, rows[2]);
        }
    }
}
