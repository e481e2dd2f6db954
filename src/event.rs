//! # Event Loop
//!
//! Background work (saving a transaction, running a print job, running the
//! diagnostic suite) never touches interactive state directly. Each worker
//! captures its result in an [`Outcome`] and posts an [`Event`] to a single
//! consumer, the [`EventLoop`], which is drained by whoever owns the
//! interactive state.
//!
//! ```text
//!   spawn_worker ──► spawn_blocking(work) ──► Outcome ──► EventSender::post
//!                                                              │
//!   interactive owner ◄── EventLoop::next ◄────────────────────┘
//! ```
//!
//! If the interactive side has gone away, posts are dropped and logged.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::diagnostics::{StressReport, TestResults};
use crate::error::ScrapPosError;

/// Result of a background operation as seen by the interactive side.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(String),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The failure reason, if any.
    pub fn failure(&self) -> Option<&str> {
        match self {
            Outcome::Failure(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::Failure(reason) => Outcome::Failure(reason),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

impl<T> From<Result<T, ScrapPosError>> for Outcome<T> {
    fn from(result: Result<T, ScrapPosError>) -> Self {
        match result {
            Ok(v) => Outcome::Success(v),
            Err(e) => Outcome::Failure(e.to_string()),
        }
    }
}

/// Messages delivered to the interactive side.
#[derive(Debug)]
pub enum Event {
    /// A transaction save finished. Success carries the row id.
    TransactionSaved {
        submission: u64,
        outcome: Outcome<i64>,
    },
    /// A print job finished.
    PrintFinished {
        cycle: u64,
        attempt: u32,
        outcome: Outcome<()>,
    },
    DiagnosticsFinished(Outcome<TestResults>),
    StressTestFinished(Outcome<StressReport>),
}

/// Cloneable handle workers use to post results.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Post an event. Returns false when the receiving side is gone.
    pub fn post(&self, event: Event) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!("Interactive context gone, dropping {:?}", event);
                false
            }
        }
    }
}

/// Single consumer of worker results.
#[derive(Debug)]
pub struct EventLoop {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventLoop {
    /// Wait for the next event. `None` once every sender is dropped.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sender / loop pair.
pub fn channel() -> (EventSender, EventLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventLoop { rx })
}

/// Run blocking `work` off the interactive side and post its outcome.
///
/// A panic inside `work` is caught at the task boundary and posted as
/// `Outcome::Failure("Task error: ...")`. Must be called from within a tokio
/// runtime.
pub fn spawn_worker<T, W, E>(
    label: &'static str,
    sender: EventSender,
    work: W,
    into_event: E,
) -> JoinHandle<()>
where
    T: Send + 'static,
    W: FnOnce() -> Outcome<T> + Send + 'static,
    E: FnOnce(Outcome<T>) -> Event + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = match tokio::task::spawn_blocking(work).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("{} worker failed: {}", label, e);
                Outcome::Failure(format!("Task error: {}", e))
            }
        };
        if let Some(reason) = outcome.failure() {
            tracing::warn!("{} failed: {}", label, reason);
        }
        sender.post(into_event(outcome));
    })
}
