//! TUI reducer (update function).
//!
//! All state mutations happen here. The runtime calls `update(app, event)`
//! and executes the returned effects.

use std::time::Instant;

use crate::effects::UiEffect;
use crate::events::{CoursesUiEvent, UiEvent};
use crate::features::{course_form, courses, shell};
use crate::state::AppState;

/// Effects to run once at startup.
pub fn init(app: &mut AppState) -> Vec<UiEffect> {
    let task = app.task_seq.next_id();
    vec![UiEffect::InitSession { task }]
}

/// The main reducer function.
pub fn update(app: &mut AppState, event: UiEvent) -> Vec<UiEffect> {
    update_at(app, event, Instant::now())
}

/// Reducer with an explicit clock, used for notice expiry.
pub fn update_at(app: &mut AppState, event: UiEvent, now: Instant) -> Vec<UiEffect> {
    match event {
        UiEvent::Tick => {
            app.spinner_frame = app.spinner_frame.wrapping_add(1);
            app.expire_notice(now);
            vec![]
        }
        UiEvent::Terminal(term_event) => shell::update::handle_terminal_event(app, term_event),
        UiEvent::Session(session) => shell::update::handle_session(app, *session),
        UiEvent::SessionInitialized(phase) => {
            tracing::debug!(?phase, "session initialization finished");
            vec![]
        }
        UiEvent::Courses(event) => match event {
            CoursesUiEvent::Loaded(list) => {
                courses::update::handle_loaded(&mut app.courses, list);
                vec![]
            }
            CoursesUiEvent::LoadFailed(message) => {
                courses::update::handle_failed(&mut app.courses, message);
                vec![]
            }
            CoursesUiEvent::Created(course) => {
                course_form::update::handle_created(app, &course, now)
            }
            CoursesUiEvent::CreateFailed(message) => {
                course_form::update::handle_create_failed(app, message);
                vec![]
            }
        },
        UiEvent::LoggedOut(result) => {
            shell::update::handle_logged_out(app, result);
            vec![]
        }
        UiEvent::TaskStarted { kind, started } => {
            app.tasks.state_mut(kind).on_started(&started);
            vec![]
        }
        UiEvent::TaskCompleted { kind, completed } => {
            let ok = app.tasks.state_mut(kind).finish_if_active(completed.id);
            if ok {
                update_at(app, *completed.result, now)
            } else {
                vec![]
            }
        }
    }
}
