//! Event bus for marginalia.
//!
//! Terminal input, timer ticks, and the answers of background store calls are
//! normalised into a single `AppEvent` enum and sent over a tokio unbounded
//! MPSC channel. The main loop receives from this channel and dispatches.
//!
//! Two independent intervals drive the render and logic cycles:
//! - **Render interval** (33 ms) triggers a `terminal.draw()` call.
//! - **Tick interval** (250 ms) triggers application-state updates.
//!
//! Store results carry the [`Ticket`] (or [`Submission`]) taken when the work
//! started, so the page session can drop answers for a page the reader has
//! already left.

use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind, MouseEvent};
use futures::{FutureExt, StreamExt};
use marginalia_core::{Comment, Permissions, Result, Submission, Ticket};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// All events the application can receive from any source.
#[derive(Debug)]
#[non_exhaustive]
pub enum AppEvent {
    /// A key press from the terminal (`KeyEventKind::Press` only).
    Key(KeyEvent),
    /// A mouse event from the terminal (click, drag, scroll, move).
    Mouse(MouseEvent),
    /// Terminal was resized to (columns, rows).
    Resize(u16, u16),
    /// Logic tick for state updates (4 Hz / 250 ms).
    Tick,
    /// Render tick, triggers a `terminal.draw()` call.
    Render,
    /// Answer to `list(page)`.
    Loaded(Ticket, Result<Vec<Comment>>),
    /// Answer to `create(draft)`.
    Created(Submission, Result<String>),
    /// Answer to `resolve(id)`.
    Resolved(Ticket, String, Result<()>),
    /// What the reader may do on the page the ticket names.
    Permissions(Ticket, Permissions),
}

/// Holds the sender and receiver ends of the unified event channel.
///
/// The sender (`tx`) is cloned and handed to background tasks;
/// the receiver (`rx`) is owned by the main event loop.
pub struct EventHandler {
    pub tx: mpsc::UnboundedSender<AppEvent>,
    pub rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the background tokio task that feeds terminal input and timers
/// into the channel.
///
/// `reader.next().fuse()` keeps `select!` from polling a finished stream.
/// Only `KeyEventKind::Press` is forwarded, since some platforms report
/// both press and release for every keystroke. Send errors mean the
/// receiver is gone and are ignored.
pub fn spawn_event_task(tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut tick_interval = interval(Duration::from_millis(250));
        let mut render_interval = interval(Duration::from_millis(33));
        let mut reader = EventStream::new();

        loop {
            let tick_tick = tick_interval.tick();
            let render_tick = render_interval.tick();
            let crossterm_event = reader.next().fuse();

            tokio::select! {
                _ = tick_tick => {
                    let _ = tx.send(AppEvent::Tick);
                }
                _ = render_tick => {
                    let _ = tx.send(AppEvent::Render);
                }
                maybe_event = crossterm_event => {
                    match maybe_event {
                        Some(Ok(Event::Key(key))) => {
                            if key.kind == KeyEventKind::Press {
                                let _ = tx.send(AppEvent::Key(key));
                            }
                        }
                        Some(Ok(Event::Resize(w, h))) => {
                            let _ = tx.send(AppEvent::Resize(w, h));
                        }
                        Some(Ok(Event::Mouse(mouse))) => {
                            let _ = tx.send(AppEvent::Mouse(mouse));
                        }
                        None => break,
                        _ => {}
                    }
                }
            }
        }
    });
}
