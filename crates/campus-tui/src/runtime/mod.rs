//! TUI runtime: owns the terminal, runs the event loop and executes effects.
//!
//! All side effects happen here. The reducer stays pure and produces
//! effects; this module executes them.
//!
//! Async results arrive through an inbox channel that the runtime drains
//! every frame. Session changes arrive through the store's watch channel,
//! so both the refresh loop and any handler that touches the session are
//! reflected in the next frame without extra plumbing.

mod handlers;
mod inbox;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use campus_core::identity::{IdentityProvider, OnLoad};
use campus_core::interrupt;
use campus_core::session::{RefreshHandle, Session, SessionStore};
use crossterm::event;
use inbox::{UiEventReceiver, UiEventSender};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::common::{TaskCompleted, TaskId, TaskKind, TaskStarted};
use crate::effects::UiEffect;
use crate::events::UiEvent;
use crate::state::AppState;
use crate::terminal::{self, Tui};
use crate::{render, update};

/// Tick interval while tasks are running or input is arriving.
pub const FRAME_DURATION: Duration = Duration::from_millis(16);

/// Tick interval when idle.
pub const IDLE_POLL_DURATION: Duration = Duration::from_millis(100);

/// Full-screen TUI runtime.
///
/// Terminal state is restored on drop, panic or Ctrl+C.
pub struct TuiRuntime<P: IdentityProvider> {
    terminal: Tui,
    pub state: AppState,
    store: Arc<SessionStore<P>>,
    on_load: OnLoad,
    session_rx: watch::Receiver<Session>,
    /// Present while the refresh loop runs; dropping it stops the loop.
    refresh: Option<RefreshHandle>,
    inbox_tx: UiEventSender,
    inbox_rx: UiEventReceiver,
    last_tick: Instant,
    last_terminal_event: Instant,
}

impl<P: IdentityProvider> TuiRuntime<P> {
    /// Creates the runtime and takes over the terminal.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be set up.
    pub fn new(store: Arc<SessionStore<P>>, on_load: OnLoad, notice_ttl: Duration) -> Result<Self> {
        // Hooks first, then the alternate screen.
        terminal::install_panic_hook();
        interrupt::set_restore_hook(|| {
            let _ = terminal::leave();
        });
        interrupt::reset();

        let terminal = terminal::enter().context("start full-screen mode")?;
        let session_rx = store.subscribe();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let now = Instant::now();

        Ok(Self {
            terminal,
            state: AppState::new(notice_ttl),
            store,
            on_load,
            session_rx,
            refresh: None,
            inbox_tx,
            inbox_rx,
            last_tick: now,
            last_terminal_event: now,
        })
    }

    /// Runs the main event loop until the user quits.
    ///
    /// # Errors
    /// Returns an error if terminal I/O fails.
    pub fn run(&mut self) -> Result<()> {
        let effects = update::init(&mut self.state);
        self.execute_effects(effects);
        let result = self.event_loop();
        self.refresh = None;
        result
    }

    fn event_loop(&mut self) -> Result<()> {
        let mut dirty = true;

        while !self.state.should_quit {
            if interrupt::is_interrupted() {
                self.state.should_quit = true;
                break;
            }

            let events = self.collect_events()?;
            for event in events {
                if matches!(&event, UiEvent::Terminal(_)) {
                    self.last_terminal_event = Instant::now();
                }
                // Only Tick triggers a render, capping redraws at tick cadence.
                if matches!(&event, UiEvent::Tick) {
                    dirty = true;
                }
                let effects = update::update(&mut self.state, event);
                self.execute_effects(effects);
            }

            if dirty {
                self.terminal.draw(|frame| render::render(&self.state, frame))?;
                dirty = false;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Event Collection
    // ========================================================================

    fn collect_events(&mut self) -> Result<Vec<UiEvent>> {
        let mut events = Vec::new();

        let recent_terminal_activity = self.last_terminal_event.elapsed() < IDLE_POLL_DURATION;
        let needs_fast_poll = self.state.tasks.is_any_running() || recent_terminal_activity;
        let tick_interval = if needs_fast_poll {
            FRAME_DURATION
        } else {
            IDLE_POLL_DURATION
        };

        self.collect_session_events(&mut events);
        self.collect_inbox_events(&mut events);

        // Block until the next tick is due unless there is already work queued.
        let poll_duration = if events.is_empty() {
            tick_interval.saturating_sub(self.last_tick.elapsed())
        } else {
            Duration::ZERO
        };

        if event::poll(poll_duration)? {
            events.push(UiEvent::Terminal(event::read()?));
            while event::poll(Duration::ZERO)? {
                events.push(UiEvent::Terminal(event::read()?));
            }
        }

        if self.last_tick.elapsed() >= tick_interval {
            events.push(UiEvent::Tick);
            self.last_tick = Instant::now();
        }

        Ok(events)
    }

    /// Forwards the latest session snapshot if it changed since the last frame.
    fn collect_session_events(&mut self, events: &mut Vec<UiEvent>) {
        if self.session_rx.has_changed().unwrap_or(false) {
            let session = self.session_rx.borrow_and_update().clone();
            events.push(UiEvent::Session(Box::new(session)));
        }
    }

    fn collect_inbox_events(&mut self, events: &mut Vec<UiEvent>) {
        while let Ok(ev) = self.inbox_rx.try_recv() {
            events.push(ev);
        }
    }

    // ========================================================================
    // Effect Dispatch
    // ========================================================================

    fn execute_effects(&mut self, effects: Vec<UiEffect>) {
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    /// Spawns an async task with a uniform TaskStarted/TaskCompleted lifecycle.
    fn spawn_task<F, Fut>(&self, kind: TaskKind, id: TaskId, cancelable: bool, f: F)
    where
        F: FnOnce(Option<CancellationToken>) -> Fut + Send + 'static,
        Fut: Future<Output = UiEvent> + Send + 'static,
    {
        let tx = self.inbox_tx.clone();
        let cancel = cancelable.then(CancellationToken::new);
        let started = TaskStarted {
            id,
            cancel: cancel.clone(),
        };
        let _ = tx.send(UiEvent::TaskStarted { kind, started });

        tokio::spawn(async move {
            let inner = f(cancel).await;
            let completed = TaskCompleted {
                id,
                result: Box::new(inner),
            };
            let _ = tx.send(UiEvent::TaskCompleted { kind, completed });
        });
    }

    fn execute_effect(&mut self, effect: UiEffect) {
        match effect {
            UiEffect::Quit => {
                self.state.should_quit = true;
                // Unblocks a browser login that is still waiting for its callback.
                interrupt::request();
            }
            UiEffect::InitSession { task } => {
                let store = Arc::clone(&self.store);
                let on_load = self.on_load;
                self.spawn_task(TaskKind::SessionInit, task, false, move |_| {
                    handlers::init_session(store, on_load)
                });
            }
            UiEffect::StartRefreshLoop => {
                if self.refresh.is_none() {
                    self.refresh = Some(self.store.start_refresh_loop());
                }
            }
            UiEffect::StopRefreshLoop => {
                self.refresh = None;
            }
            UiEffect::FetchCourses { task, token } => {
                let api = self.store.api().clone();
                self.spawn_task(TaskKind::CourseList, task, true, move |cancel| {
                    handlers::fetch_courses(api, token, cancel)
                });
            }
            UiEffect::CreateCourse {
                task,
                token,
                course,
            } => {
                let api = self.store.api().clone();
                self.spawn_task(TaskKind::CourseCreate, task, false, move |_| {
                    handlers::create_course(api, token, course)
                });
            }
            UiEffect::Logout { task } => {
                self.refresh = None;
                let store = Arc::clone(&self.store);
                self.spawn_task(TaskKind::Logout, task, false, move |_| {
                    handlers::logout(store)
                });
            }
        }
    }
}

impl<P: IdentityProvider> Drop for TuiRuntime<P> {
    fn drop(&mut self) {
        let _ = terminal::leave();
    }
}
