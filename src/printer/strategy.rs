//! # Print Strategies
//!
//! How a print job is carried out once the orchestrator decides to run one.
//! Strategies run on a blocking worker and report an [`Outcome`].
//!
//! | Strategy | Behavior |
//! |----------|----------|
//! | [`DirectPrint`] | Send to the printer, report what it says |
//! | [`SimulatedPrint`] | Delay, send, then draw success from an [`OutcomeSource`] |
//!
//! The simulated strategy stands in for a real printer status check. Its
//! delay grows with the attempt number:
//!
//! ```text
//! delay = base + attempt * step      (2000 + attempt * 1000 ms by default)
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::PrintSettings;
use crate::event::Outcome;

use super::Printer;

/// Reported when a simulated job draws a failure
pub const PRINT_JOB_FAILED: &str = "Print job failed";

/// Reported when the printer drops between job start and send
pub const PRINTER_DISCONNECTED: &str = "Printer disconnected during print job";

const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Shared cancellation flag for one print cycle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes one print attempt.
pub trait PrintStrategy: Send + Sync {
    fn execute(
        &self,
        printer: &dyn Printer,
        content: &str,
        attempt: u32,
        cancel: &CancelToken,
    ) -> Outcome<()>;
}

/// Send the receipt and report the printer's answer.
#[derive(Debug, Default)]
pub struct DirectPrint;

impl PrintStrategy for DirectPrint {
    fn execute(
        &self,
        printer: &dyn Printer,
        content: &str,
        attempt: u32,
        cancel: &CancelToken,
    ) -> Outcome<()> {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        tracing::debug!("Printing receipt (attempt {})", attempt);
        match printer.print(content) {
            Ok(()) => Outcome::Success(()),
            Err(e) => Outcome::Failure(format!("Print error: {}", e)),
        }
    }
}

/// Source of simulated success/failure draws.
pub trait OutcomeSource: Send + Sync {
    /// Return true with probability `success_rate`.
    fn draw(&self, success_rate: f64) -> bool;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default)]
pub struct RandomOutcomes;

impl OutcomeSource for RandomOutcomes {
    fn draw(&self, success_rate: f64) -> bool {
        rand::rng().random_bool(success_rate.clamp(0.0, 1.0))
    }
}

/// Replays a fixed sequence of outcomes, then repeats `fallback`.
#[derive(Debug)]
pub struct ScriptedOutcomes {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
}

impl ScriptedOutcomes {
    pub fn new(script: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
        }
    }

    pub fn always(outcome: bool) -> Self {
        Self::new([], outcome)
    }
}

impl OutcomeSource for ScriptedOutcomes {
    fn draw(&self, _success_rate: f64) -> bool {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(self.fallback)
    }
}

/// Simulated print job with attempt-scaled delay and probabilistic outcome.
pub struct SimulatedPrint {
    base_delay: Duration,
    attempt_step: Duration,
    first_success_rate: f64,
    retry_success_rate: f64,
    outcomes: Box<dyn OutcomeSource>,
}

impl SimulatedPrint {
    pub fn new(settings: &PrintSettings, outcomes: Box<dyn OutcomeSource>) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.simulated_base_delay_ms),
            attempt_step: Duration::from_millis(settings.simulated_attempt_step_ms),
            first_success_rate: settings.simulated_first_success_rate,
            retry_success_rate: settings.simulated_retry_success_rate,
            outcomes,
        }
    }

    /// Random outcomes at the configured rates.
    pub fn random(settings: &PrintSettings) -> Self {
        Self::new(settings, Box::new(RandomOutcomes))
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay + self.attempt_step * attempt
    }

    pub fn success_rate_for(&self, attempt: u32) -> f64 {
        if attempt <= 1 {
            self.first_success_rate
        } else {
            self.retry_success_rate
        }
    }
}

impl PrintStrategy for SimulatedPrint {
    fn execute(
        &self,
        printer: &dyn Printer,
        content: &str,
        attempt: u32,
        cancel: &CancelToken,
    ) -> Outcome<()> {
        let delay = self.delay_for(attempt);
        tracing::debug!("Simulated print job, attempt {} ({:?})", attempt, delay);

        if !sleep_unless_cancelled(delay, cancel) {
            return Outcome::Cancelled;
        }
        if !printer.is_connected() {
            tracing::warn!("{}", PRINTER_DISCONNECTED);
            return Outcome::Failure(PRINTER_DISCONNECTED.to_string());
        }
        if let Err(e) = printer.print(content) {
            return Outcome::Failure(format!("Print error: {}", e));
        }

        if self.outcomes.draw(self.success_rate_for(attempt)) {
            Outcome::Success(())
        } else {
            Outcome::Failure(PRINT_JOB_FAILED.to_string())
        }
    }
}

/// Sleep for `total`, waking early on cancel. Returns false if cancelled.
fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::SimulatedPrinter;

    fn instant_settings() -> PrintSettings {
        PrintSettings {
            simulated_base_delay_ms: 0,
            simulated_attempt_step_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_delay_grows_with_attempt() {
        let strategy = SimulatedPrint::random(&PrintSettings::default());
        assert_eq!(strategy.delay_for(1), Duration::from_millis(3000));
        assert_eq!(strategy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(strategy.success_rate_for(1), 0.9);
        assert_eq!(strategy.success_rate_for(2), 0.7);
    }

    #[test]
    fn test_scripted_outcomes_drive_result() {
        let strategy =
            SimulatedPrint::new(&instant_settings(), Box::new(ScriptedOutcomes::new([false], true)));
        let printer = SimulatedPrinter::default();
        let token = CancelToken::new();

        assert_eq!(
            strategy.execute(&printer, "r", 1, &token),
            Outcome::Failure(PRINT_JOB_FAILED.to_string())
        );
        assert_eq!(strategy.execute(&printer, "r", 2, &token), Outcome::Success(()));
    }

    #[test]
    fn test_disconnected_mid_job() {
        let strategy = SimulatedPrint::new(&instant_settings(), Box::new(ScriptedOutcomes::always(true)));
        let printer = SimulatedPrinter::new(false);
        let outcome = strategy.execute(&printer, "r", 1, &CancelToken::new());
        assert_eq!(outcome.failure(), Some(PRINTER_DISCONNECTED));
    }

    #[test]
    fn test_cancelled_before_send() {
        let strategy = SimulatedPrint::new(&PrintSettings::default(), Box::new(ScriptedOutcomes::always(true)));
        let printer = SimulatedPrinter::default();
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(strategy.execute(&printer, "r", 1, &token), Outcome::Cancelled);
        assert!(printer.printed().is_empty());
    }

    #[test]
    fn test_direct_print_reports_printer_error() {
        let printer = SimulatedPrinter::new(false);
        let outcome = DirectPrint.execute(&printer, "r", 1, &CancelToken::new());
        assert_eq!(
            outcome.failure(),
            Some("Print error: Transport error: Printer not connected")
        );
    }
}
