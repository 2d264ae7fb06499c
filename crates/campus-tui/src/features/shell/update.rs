//! Shell reducer: session transitions and global keys.

use campus_core::session::Session;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::Focus;
use crate::effects::UiEffect;
use crate::features::{course_form, courses};
use crate::state::AppState;

/// Applies a new session snapshot.
///
/// Starts the refresh loop when the session is established, tears down
/// course state when it ends, and (re)loads courses whenever the token
/// changes while the list is visible.
pub fn handle_session(app: &mut AppState, session: Session) -> Vec<UiEffect> {
    let was_authenticated = app.session.is_authenticated();
    let had_courses = was_authenticated && app.access().courses;
    let old_token = app.session.token.clone();

    app.session = session;
    let authenticated = app.session.is_authenticated();
    let mut effects = Vec::new();

    if authenticated && !was_authenticated {
        app.signed_out = None;
        effects.push(UiEffect::StartRefreshLoop);
    }

    if was_authenticated && !authenticated {
        effects.push(UiEffect::StopRefreshLoop);
        app.tasks.course_list.abandon();
        app.tasks.course_create.abandon();
        app.courses.reset();
        app.form.reset();
        app.focus = Focus::Courses;
        app.notice = None;
        return effects;
    }

    if authenticated {
        if !app.access().manage_courses && app.focus == Focus::Form {
            app.focus = Focus::Courses;
        }
        if app.access().courses && (!had_courses || app.session.token != old_token) {
            effects.extend(courses::update::request_fetch(app));
        }
    }

    effects
}

pub fn handle_logged_out(app: &mut AppState, result: Result<String, String>) {
    app.signed_out = Some(match result {
        Ok(url) => format!("Signed out. To end the browser session as well, open: {url}"),
        Err(err) => format!("Signed out locally; the identity provider could not be reached ({err})."),
    });
}

pub fn handle_terminal_event(app: &mut AppState, event: Event) -> Vec<UiEffect> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
        Event::Paste(text) if app.focus == Focus::Form => {
            app.form.insert_str(&text);
            vec![]
        }
        _ => vec![],
    }
}

fn handle_key(app: &mut AppState, key: KeyEvent) -> Vec<UiEffect> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return quit(app);
    }

    if !app.session.is_authenticated() {
        return match key.code {
            KeyCode::Char('q') | KeyCode::Esc => quit(app),
            _ => vec![],
        };
    }

    if app.focus == Focus::Form && app.access().manage_courses {
        return course_form::update::handle_key(app, key);
    }

    match key.code {
        KeyCode::Char('q') => quit(app),
        KeyCode::Char('L') => logout(app),
        KeyCode::Tab => {
            if app.access().manage_courses {
                app.focus = Focus::Form;
            }
            vec![]
        }
        _ => courses::update::handle_key(app, key),
    }
}

fn quit(app: &mut AppState) -> Vec<UiEffect> {
    app.should_quit = true;
    vec![UiEffect::Quit]
}

fn logout(app: &mut AppState) -> Vec<UiEffect> {
    if app.tasks.logout.is_running() {
        return vec![];
    }
    let task = app.task_seq.next_id();
    vec![UiEffect::Logout { task }]
}
