//! UI event types.
//!
//! All inputs (terminal, session snapshots, async results) are converted to
//! `UiEvent` before reaching the reducer. Async work uses the
//! `TaskStarted`/`TaskCompleted` lifecycle; the reducer drops completions whose
//! task id is no longer the active one for its kind.

use campus_core::api::Course;
use campus_core::session::{Phase, Session};
use crossterm::event::Event as CrosstermEvent;

use crate::common::{TaskCompleted, TaskKind, TaskStarted};

/// Results of course backend calls, already mapped to user-facing messages.
#[derive(Debug)]
pub enum CoursesUiEvent {
    Loaded(Vec<Course>),
    LoadFailed(String),
    Created(Course),
    CreateFailed(String),
}

#[derive(Debug)]
pub enum UiEvent {
    Tick,
    Terminal(CrosstermEvent),
    /// New snapshot from the session store.
    Session(Box<Session>),
    /// The identity handshake finished.
    SessionInitialized(Phase),
    Courses(CoursesUiEvent),
    /// Logout finished with the provider's logout URL or an error.
    LoggedOut(Result<String, String>),
    TaskStarted {
        kind: TaskKind,
        started: TaskStarted,
    },
    TaskCompleted {
        kind: TaskKind,
        completed: TaskCompleted<Box<UiEvent>>,
    },
}
