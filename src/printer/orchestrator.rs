//! # Print Orchestrator
//!
//! Owns the print cycle for one receipt: attempt counting, the
//! printer-connected check, running the job off the interactive side, and
//! turning results into dialog updates.
//!
//! ## State Machine
//!
//! ```text
//!            request_print / retry
//!   Idle ──────────────────────────► Printing { attempt }
//!    ▲                                  │        │
//!    │ cancel / dismiss       success   │        │ failure
//!    │                                  ▼        ▼
//!    └──────────── dismiss ───── Succeeded    Failed { reason, can_retry }
//!                                                │
//!                                      retry     │ (attempt < max_attempts)
//!                                                ▼
//!                                    Printing { attempt + 1 }
//! ```
//!
//! When the printer is not connected the cycle still enters `Printing` and
//! fails with "Printer not connected" after a short delay.
//!
//! `print_later` does not touch the cycle: it copies the receipt into the
//! [`PendingReceiptStore`]. `dismiss` resets the attempt counter and drops
//! the queued receipt whatever the current state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::PrintSettings;
use crate::error::ScrapPosError;
use crate::event::{Event, EventSender, Outcome, spawn_worker};
use crate::pending::{PendingReceiptStore, ReceiptKey};

use super::strategy::{CancelToken, PrintStrategy};
use super::{PRINTER_NOT_CONNECTED, Printer};

/// Where the current print cycle stands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PrintState {
    #[default]
    Idle,
    Printing {
        attempt: u32,
    },
    Succeeded,
    Failed {
        reason: String,
        can_retry: bool,
    },
}

/// What a finished print job means for the dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum PrintUpdate {
    Succeeded {
        attempt: u32,
    },
    Failed {
        attempt: u32,
        reason: String,
        can_retry: bool,
    },
    Cancelled,
    /// Result for a cycle that is no longer current
    Ignored,
}

pub struct PrintOrchestrator {
    printer: Arc<dyn Printer>,
    strategy: Arc<dyn PrintStrategy>,
    pending: Arc<PendingReceiptStore>,
    sender: EventSender,
    settings: PrintSettings,
    state: PrintState,
    attempts: AtomicU32,
    content: Option<String>,
    cycle: u64,
    cancel: Option<CancelToken>,
}

impl PrintOrchestrator {
    pub fn new(
        printer: Arc<dyn Printer>,
        strategy: Arc<dyn PrintStrategy>,
        pending: Arc<PendingReceiptStore>,
        sender: EventSender,
        settings: PrintSettings,
    ) -> Self {
        Self {
            printer,
            strategy,
            pending,
            sender,
            settings,
            state: PrintState::Idle,
            attempts: AtomicU32::new(0),
            content: None,
            cycle: 0,
            cancel: None,
        }
    }

    pub fn state(&self) -> &PrintState {
        &self.state
    }

    /// Attempts made since the last dismiss.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    pub fn is_printer_connected(&self) -> bool {
        self.printer.is_connected()
    }

    /// The queued receipt text, for "view receipt".
    pub fn view_receipt(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Start printing `content`. Returns the attempt number.
    ///
    /// A request after a finished cycle starts counting from 1 again; only
    /// [`retry`](Self::retry) continues the count.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request_print(&mut self, content: impl Into<String>) -> Result<u32, ScrapPosError> {
        match self.state {
            PrintState::Printing { .. } => {
                return Err(ScrapPosError::AlreadyRunning(
                    "Print already in progress".into(),
                ));
            }
            PrintState::Succeeded | PrintState::Failed { .. } => {
                self.attempts.store(0, Ordering::SeqCst);
            }
            PrintState::Idle => {}
        }
        self.content = Some(content.into());
        Ok(self.start_cycle())
    }

    /// Retry the queued receipt after a retryable failure.
    pub fn retry(&mut self) -> Result<u32, ScrapPosError> {
        let can_retry = match &self.state {
            PrintState::Failed { can_retry, .. } => *can_retry && self.content.is_some(),
            _ => return Err(ScrapPosError::InvalidInput("Nothing to retry".into())),
        };
        if !can_retry {
            return Err(ScrapPosError::InvalidInput(format!(
                "No retries left ({} of {} attempts used)",
                self.attempts(),
                self.settings.max_attempts
            )));
        }
        Ok(self.start_cycle())
    }

    /// Abandon a running cycle. Its late result will be ignored.
    pub fn cancel(&mut self) -> bool {
        if !matches!(self.state, PrintState::Printing { .. }) {
            return false;
        }
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.state = PrintState::Idle;
        tracing::debug!("Print cancelled by user");
        true
    }

    /// Keep the receipt for later printing.
    pub fn print_later(&self, content: &str) -> Result<ReceiptKey, ScrapPosError> {
        self.pending.put(content)
    }

    /// Close the dialog: reset attempts and drop the queued receipt.
    pub fn dismiss(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.attempts.store(0, Ordering::SeqCst);
        self.content = None;
        self.state = PrintState::Idle;
        // Anything still in flight belongs to a finished dialog
        self.cycle += 1;
    }

    /// Apply a `PrintFinished` event.
    pub fn handle(&mut self, cycle: u64, attempt: u32, outcome: Outcome<()>) -> PrintUpdate {
        let printing = matches!(self.state, PrintState::Printing { .. });
        if !printing || cycle != self.cycle {
            tracing::debug!(
                "Ignoring print result for cycle {} in state {:?}",
                cycle,
                self.state
            );
            return PrintUpdate::Ignored;
        }
        self.cancel = None;

        match outcome {
            Outcome::Success(()) => {
                tracing::info!("Print succeeded on attempt {}", attempt);
                self.state = PrintState::Succeeded;
                PrintUpdate::Succeeded { attempt }
            }
            Outcome::Failure(reason) => {
                let can_retry = attempt < self.settings.max_attempts;
                tracing::warn!("Print failed: {} (can retry: {})", reason, can_retry);
                self.state = PrintState::Failed {
                    reason: reason.clone(),
                    can_retry,
                };
                PrintUpdate::Failed {
                    attempt,
                    reason,
                    can_retry,
                }
            }
            Outcome::Cancelled => {
                self.state = PrintState::Idle;
                PrintUpdate::Cancelled
            }
        }
    }

    fn start_cycle(&mut self) -> u32 {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.cycle += 1;
        let cycle = self.cycle;
        self.state = PrintState::Printing { attempt };

        tracing::debug!(
            "Print requested - attempt {}/{}",
            attempt,
            self.settings.max_attempts
        );

        if !self.printer.is_connected() {
            let sender = self.sender.clone();
            let delay = self.settings.not_connected_delay();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sender.post(Event::PrintFinished {
                    cycle,
                    attempt,
                    outcome: Outcome::Failure(PRINTER_NOT_CONNECTED.to_string()),
                });
            });
            return attempt;
        }

        let token = CancelToken::new();
        self.cancel = Some(token.clone());

        let printer = Arc::clone(&self.printer);
        let strategy = Arc::clone(&self.strategy);
        let content = self.content.clone().unwrap_or_default();
        spawn_worker(
            "Print job",
            self.sender.clone(),
            move || strategy.execute(printer.as_ref(), &content, attempt, &token),
            move |outcome| Event::PrintFinished {
                cycle,
                attempt,
                outcome,
            },
        );
        attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, EventLoop};
    use crate::printer::strategy::{ScriptedOutcomes, SimulatedPrint};
    use crate::printer::{DirectPrint, SimulatedPrinter};

    struct Harness {
        _dir: tempfile::TempDir,
        printer: Arc<SimulatedPrinter>,
        pending: Arc<PendingReceiptStore>,
        orchestrator: PrintOrchestrator,
        events: EventLoop,
    }

    fn instant_settings() -> PrintSettings {
        PrintSettings {
            not_connected_delay_ms: 0,
            simulated_base_delay_ms: 0,
            simulated_attempt_step_ms: 0,
            ..Default::default()
        }
    }

    fn harness(connected: bool, strategy: Arc<dyn PrintStrategy>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let pending = Arc::new(PendingReceiptStore::open(dir.path().join("p.json")).unwrap());
        let printer = Arc::new(SimulatedPrinter::new(connected));
        let (sender, events) = event::channel();
        let orchestrator = PrintOrchestrator::new(
            printer.clone(),
            strategy,
            pending.clone(),
            sender,
            instant_settings(),
        );
        Harness {
            _dir: dir,
            printer,
            pending,
            orchestrator,
            events,
        }
    }

    async fn next_update(h: &mut Harness) -> PrintUpdate {
        match h.events.next().await {
            Some(Event::PrintFinished {
                cycle,
                attempt,
                outcome,
            }) => h.orchestrator.handle(cycle, attempt, outcome),
            other => panic!("unexpected event {:?}", other),
        }
    }

    fn scripted(outcomes: &[bool]) -> Arc<dyn PrintStrategy> {
        Arc::new(SimulatedPrint::new(
            &instant_settings(),
            Box::new(ScriptedOutcomes::new(outcomes.to_vec(), false)),
        ))
    }

    #[tokio::test]
    async fn test_not_connected_always_fails() {
        let mut h = harness(false, Arc::new(DirectPrint));
        assert_eq!(h.orchestrator.request_print("R").unwrap(), 1);
        assert_eq!(h.orchestrator.state(), &PrintState::Printing { attempt: 1 });

        match next_update(&mut h).await {
            PrintUpdate::Failed { reason, can_retry, .. } => {
                assert_eq!(reason, "Printer not connected");
                assert!(can_retry);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(h.printer.printed().is_empty());
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let mut h = harness(true, scripted(&[true]));
        h.orchestrator.request_print("R").unwrap();
        assert_eq!(next_update(&mut h).await, PrintUpdate::Succeeded { attempt: 1 });
        assert_eq!(h.orchestrator.state(), &PrintState::Succeeded);
        assert_eq!(h.printer.printed(), vec!["R".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_until_exhausted() {
        let mut h = harness(true, scripted(&[false, false]));
        h.orchestrator.request_print("R").unwrap();
        assert_eq!(
            next_update(&mut h).await,
            PrintUpdate::Failed {
                attempt: 1,
                reason: "Print job failed".into(),
                can_retry: true
            }
        );

        assert_eq!(h.orchestrator.retry().unwrap(), 2);
        assert_eq!(
            next_update(&mut h).await,
            PrintUpdate::Failed {
                attempt: 2,
                reason: "Print job failed".into(),
                can_retry: false
            }
        );
        assert!(h.orchestrator.retry().is_err());
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let mut h = harness(true, scripted(&[false, true]));
        h.orchestrator.request_print("R").unwrap();
        next_update(&mut h).await;
        h.orchestrator.retry().unwrap();
        assert_eq!(next_update(&mut h).await, PrintUpdate::Succeeded { attempt: 2 });
    }

    #[tokio::test]
    async fn test_dismiss_resets_attempts() {
        let mut h = harness(false, Arc::new(DirectPrint));
        h.orchestrator.request_print("R").unwrap();
        next_update(&mut h).await;
        h.orchestrator.retry().unwrap();
        next_update(&mut h).await;
        assert_eq!(h.orchestrator.attempts(), 2);

        h.orchestrator.dismiss();
        assert_eq!(h.orchestrator.attempts(), 0);
        assert!(h.orchestrator.view_receipt().is_none());
        assert_eq!(h.orchestrator.request_print("R2").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_new_request_after_finished_cycle_starts_at_one() {
        let mut h = harness(true, scripted(&[true, false, true]));
        h.orchestrator.request_print("FIRST").unwrap();
        assert_eq!(next_update(&mut h).await, PrintUpdate::Succeeded { attempt: 1 });

        assert_eq!(h.orchestrator.request_print("SECOND").unwrap(), 1);
        match next_update(&mut h).await {
            PrintUpdate::Failed { attempt, can_retry, .. } => {
                assert_eq!(attempt, 1);
                assert!(can_retry);
            }
            other => panic!("expected failure, got {:?}", other),
        }

        assert_eq!(h.orchestrator.request_print("THIRD").unwrap(), 1);
        assert_eq!(next_update(&mut h).await, PrintUpdate::Succeeded { attempt: 1 });
        assert_eq!(h.orchestrator.attempts(), 1);
    }

    #[tokio::test]
    async fn test_result_after_dismiss_is_ignored() {
        let mut h = harness(false, Arc::new(DirectPrint));
        h.orchestrator.request_print("R").unwrap();
        h.orchestrator.dismiss();
        assert_eq!(next_update(&mut h).await, PrintUpdate::Ignored);
        assert_eq!(h.orchestrator.state(), &PrintState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_ignores_late_result() {
        let mut h = harness(false, Arc::new(DirectPrint));
        h.orchestrator.request_print("R").unwrap();
        assert!(h.orchestrator.cancel());
        assert_eq!(next_update(&mut h).await, PrintUpdate::Ignored);
        assert!(!h.orchestrator.cancel());
    }

    #[tokio::test]
    async fn test_concurrent_request_rejected() {
        let mut h = harness(false, Arc::new(DirectPrint));
        h.orchestrator.request_print("R").unwrap();
        let err = h.orchestrator.request_print("R").unwrap_err();
        assert_eq!(err.to_string(), "Print already in progress");
    }

    #[test]
    fn test_print_later_stores_receipt() {
        let h = harness(true, Arc::new(DirectPrint));
        let key = h.orchestrator.print_later("LATER").unwrap();
        assert_eq!(h.pending.get(&key).unwrap().as_deref(), Some("LATER"));
        assert_eq!(h.orchestrator.state(), &PrintState::Idle);
    }

    #[tokio::test]
    async fn test_view_receipt() {
        let mut h = harness(true, scripted(&[true]));
        assert!(h.orchestrator.view_receipt().is_none());
        h.orchestrator.request_print("CONTENT").unwrap();
        assert_eq!(h.orchestrator.view_receipt(), Some("CONTENT"));
    }
}
