//! Course form reducer.

use std::time::Instant;

use campus_core::api::Course;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::REQUIRED_MESSAGE;
use crate::effects::UiEffect;
use crate::features::courses;
use crate::features::shell::Focus;
use crate::state::AppState;

pub fn handle_key(app: &mut AppState, key: KeyEvent) -> Vec<UiEffect> {
    match key.code {
        KeyCode::Esc => {
            app.focus = Focus::Courses;
            vec![]
        }
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            app.form.field = app.form.field.toggle();
            vec![]
        }
        KeyCode::Enter => submit(app),
        KeyCode::Backspace => {
            app.form.backspace();
            vec![]
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.form.insert_char(ch);
            vec![]
        }
        _ => vec![],
    }
}

/// Validates the form and emits the create request.
pub fn submit(app: &mut AppState) -> Vec<UiEffect> {
    if app.form.submitting || !app.access().manage_courses {
        return vec![];
    }
    let Some(course) = app.form.to_new_course() else {
        app.form.error = Some(REQUIRED_MESSAGE.to_string());
        return vec![];
    };
    let Some(token) = app.token().map(str::to_string) else {
        return vec![];
    };

    app.form.submitting = true;
    app.form.error = None;
    let task = app.task_seq.next_id();
    vec![UiEffect::CreateCourse {
        task,
        token,
        course,
    }]
}

/// Clears the form, shows the confirmation and reloads the list.
pub fn handle_created(app: &mut AppState, course: &Course, now: Instant) -> Vec<UiEffect> {
    app.form.submitting = false;
    app.form.clear();
    app.show_notice(
        format!("Course created (id={}): {}", course.id, course.title),
        now,
    );
    courses::update::request_fetch(app)
}

/// Keeps the entered fields so the user can retry.
pub fn handle_create_failed(app: &mut AppState, message: String) {
    app.form.submitting = false;
    app.form.error = Some(message);
}
