//! Effect handlers for the TUI runtime.
//!
//! Handlers are async functions that perform I/O and return a `UiEvent`.
//! They never touch UI state; the runtime spawns them and forwards the
//! result to the inbox.

use std::sync::Arc;

use campus_core::api::{ApiClient, ApiOperation, NewCourse};
use campus_core::identity::{IdentityProvider, OnLoad};
use campus_core::session::SessionStore;
use tokio_util::sync::CancellationToken;

use crate::events::{CoursesUiEvent, UiEvent};

pub async fn init_session<P: IdentityProvider>(
    store: Arc<SessionStore<P>>,
    on_load: OnLoad,
) -> UiEvent {
    UiEvent::SessionInitialized(store.initialize(on_load).await)
}

pub async fn fetch_courses(
    api: ApiClient,
    token: String,
    cancel: Option<CancellationToken>,
) -> UiEvent {
    let request = api.list_courses(&token);
    let result = match cancel {
        Some(cancel) => tokio::select! {
            () = cancel.cancelled() => {
                return UiEvent::Courses(CoursesUiEvent::LoadFailed("cancelled".to_string()));
            }
            result = request => result,
        },
        None => request.await,
    };

    match result {
        Ok(courses) => {
            tracing::debug!(count = courses.len(), "courses loaded");
            UiEvent::Courses(CoursesUiEvent::Loaded(courses))
        }
        Err(err) => {
            tracing::warn!(kind = %err.kind, status = ?err.status, details = ?err.details, "course list failed");
            UiEvent::Courses(CoursesUiEvent::LoadFailed(
                err.user_message(ApiOperation::ListCourses),
            ))
        }
    }
}

pub async fn create_course(api: ApiClient, token: String, course: NewCourse) -> UiEvent {
    match api.create_course(&token, &course).await {
        Ok(created) => UiEvent::Courses(CoursesUiEvent::Created(created)),
        Err(err) => {
            tracing::warn!(kind = %err.kind, status = ?err.status, details = ?err.details, "course creation failed");
            UiEvent::Courses(CoursesUiEvent::CreateFailed(
                err.user_message(ApiOperation::CreateCourse),
            ))
        }
    }
}

pub async fn logout<P: IdentityProvider>(store: Arc<SessionStore<P>>) -> UiEvent {
    UiEvent::LoggedOut(store.logout().await.map_err(|err| format!("{err:#}")))
}
