//! UI effect types.
//!
//! Effects are commands returned by the reducer that the runtime executes:
//! I/O, task spawning and the refresh loop lifecycle. The reducer never
//! performs I/O itself.

use campus_core::api::NewCourse;

use crate::common::TaskId;

#[derive(Debug, PartialEq, Eq)]
pub enum UiEffect {
    Quit,
    /// Run the identity handshake.
    InitSession { task: TaskId },
    /// Start the token refresh loop (idempotent).
    StartRefreshLoop,
    /// Drop the refresh loop handle.
    StopRefreshLoop,
    FetchCourses { task: TaskId, token: String },
    CreateCourse {
        task: TaskId,
        token: String,
        course: NewCourse,
    },
    Logout { task: TaskId },
}
