//! Application state.
//!
//! ```text
//! AppState
//! ├── session: Session          (latest snapshot from the session store)
//! ├── courses: CoursesState     (course list view)
//! ├── form: CourseFormState     (course creation form)
//! ├── focus / notice / signed_out
//! ├── task_seq: TaskSeq         (async task id generator)
//! └── tasks: Tasks              (task lifecycle state)
//! ```

use std::time::{Duration, Instant};

use campus_core::session::{Access, Session};

use crate::common::{TaskSeq, Tasks};
use crate::features::course_form::CourseFormState;
use crate::features::courses::CoursesState;
use crate::features::shell::{Focus, Notice};

pub struct AppState {
    pub session: Session,
    pub courses: CoursesState,
    pub form: CourseFormState,
    pub focus: Focus,
    pub notice: Option<Notice>,
    pub notice_ttl: Duration,
    /// Outcome of an explicit logout, shown on the signed-out screen.
    pub signed_out: Option<String>,
    pub task_seq: TaskSeq,
    pub tasks: Tasks,
    pub spinner_frame: usize,
    pub should_quit: bool,
}

impl AppState {
    pub fn new(notice_ttl: Duration) -> Self {
        Self {
            session: Session::default(),
            courses: CoursesState::default(),
            form: CourseFormState::default(),
            focus: Focus::default(),
            notice: None,
            notice_ttl,
            signed_out: None,
            task_seq: TaskSeq::default(),
            tasks: Tasks::default(),
            spinner_frame: 0,
            should_quit: false,
        }
    }

    pub fn access(&self) -> Access {
        self.session.access()
    }

    /// Bearer token, only once the session is established.
    pub fn token(&self) -> Option<&str> {
        if self.session.is_authenticated() {
            self.session.token.as_deref()
        } else {
            None
        }
    }

    pub fn show_notice(&mut self, text: impl Into<String>, now: Instant) {
        self.notice = Some(Notice::new(text, now, self.notice_ttl));
    }

    /// Drops the notice once its display time has passed.
    pub fn expire_notice(&mut self, now: Instant) {
        if self.notice.as_ref().is_some_and(|n| n.is_expired(now)) {
            self.notice = None;
        }
    }
}
