//! Course list reducer.

use campus_core::api::Course;
use crossterm::event::{KeyCode, KeyEvent};

use super::{CourseList, CoursesState};
use crate::effects::UiEffect;
use crate::state::AppState;

/// Emits a fetch if the session allows viewing courses.
pub fn request_fetch(app: &mut AppState) -> Vec<UiEffect> {
    if !app.access().courses {
        return vec![];
    }
    let Some(token) = app.token().map(str::to_string) else {
        return vec![];
    };
    app.courses.loading = true;
    let task = app.task_seq.next_id();
    vec![UiEffect::FetchCourses { task, token }]
}

pub fn handle_loaded(state: &mut CoursesState, courses: Vec<Course>) {
    state.loading = false;
    state.selected = state.selected.min(courses.len().saturating_sub(1));
    state.list = CourseList::Loaded(courses);
}

/// An error replaces whatever was shown before.
pub fn handle_failed(state: &mut CoursesState, message: String) {
    state.loading = false;
    state.selected = 0;
    state.list = CourseList::Failed(message);
}

pub fn handle_key(app: &mut AppState, key: KeyEvent) -> Vec<UiEffect> {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => {
            app.courses.select_prev();
            vec![]
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.courses.select_next();
            vec![]
        }
        KeyCode::Char('r') if !app.courses.loading => request_fetch(app),
        _ => vec![],
    }
}
