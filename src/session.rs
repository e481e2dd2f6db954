//! # POS Session
//!
//! Owns every collaborator for one operator session and is the single
//! consumer of background results. Dropping the session drops the
//! collaborators; late worker results are then discarded by the event
//! channel.

use std::sync::Arc;

use crate::checkout::{Checkout, Completion};
use crate::config::PosConfig;
use crate::diagnostics::{
    Collaborators, DiagnosticRunner, HealthMonitor, StressReport, TestResults,
};
use crate::error::ScrapPosError;
use crate::event::{self, Event, EventLoop, Outcome};
use crate::pending::PendingReceiptStore;
use crate::persistence::{JsonTransactionRepository, SaveAdapter, TransactionRepository};
use crate::printer::strategy::PRINTER_DISCONNECTED;
use crate::printer::{
    self, PRINTER_NOT_CONNECTED, PrintOrchestrator, PrintStrategy, PrintUpdate, Printer,
};

/// A routed background result.
#[derive(Debug)]
pub enum SessionUpdate {
    Checkout(Completion),
    Print(PrintUpdate),
    Diagnostics(Outcome<TestResults>),
    StressTest(Outcome<StressReport>),
}

pub struct PosSession {
    config: PosConfig,
    events: EventLoop,
    printer: Arc<dyn Printer>,
    pending: Arc<PendingReceiptStore>,
    health: Arc<dyn HealthMonitor>,
    checkout: Checkout,
    print: PrintOrchestrator,
    diagnostics: DiagnosticRunner,
}

impl PosSession {
    /// Open a session with file-backed stores under `config.data_dir`.
    pub fn open(config: PosConfig) -> Result<Self, ScrapPosError> {
        let repository = Arc::new(JsonTransactionRepository::open(config.transactions_path())?);
        let (printer, strategy) = printer::from_settings(&config.printer, &config.print);
        let collaborators = Collaborators::host(
            printer.clone(),
            &config.printer.device.display().to_string(),
            &config.health_metrics_path(),
            &config.diagnostics,
        )?;
        Self::with_parts(config, repository, printer, strategy, collaborators)
    }

    /// Assemble a session from explicit collaborators.
    pub fn with_parts(
        config: PosConfig,
        repository: Arc<dyn TransactionRepository>,
        printer: Arc<dyn Printer>,
        strategy: Arc<dyn PrintStrategy>,
        collaborators: Collaborators,
    ) -> Result<Self, ScrapPosError> {
        let (sender, events) = event::channel();
        let pending = Arc::new(PendingReceiptStore::open(config.pending_receipts_path())?);

        let health = collaborators.health.clone();
        let checkout = Checkout::new(
            SaveAdapter::new(repository, sender.clone()),
            config.shop.clone(),
        )
        .with_health_monitor(health.clone());
        let print = PrintOrchestrator::new(
            printer.clone(),
            strategy,
            pending.clone(),
            sender.clone(),
            config.print.clone(),
        );
        let diagnostics = DiagnosticRunner::new(collaborators, config.diagnostics.clone(), sender);

        tracing::debug!("Session opened with data in {}", config.data_dir.display());
        Ok(Self {
            config,
            events,
            printer,
            pending,
            health,
            checkout,
            print,
            diagnostics,
        })
    }

    pub fn config(&self) -> &PosConfig {
        &self.config
    }

    pub fn printer(&self) -> &Arc<dyn Printer> {
        &self.printer
    }

    pub fn pending(&self) -> &PendingReceiptStore {
        &self.pending
    }

    pub fn repository(&self) -> &Arc<dyn TransactionRepository> {
        self.checkout.adapter().repository()
    }

    pub fn checkout(&mut self) -> &mut Checkout {
        &mut self.checkout
    }

    pub fn print(&mut self) -> &mut PrintOrchestrator {
        &mut self.print
    }

    pub fn diagnostics(&self) -> &DiagnosticRunner {
        &self.diagnostics
    }

    pub fn health(&self) -> &Arc<dyn HealthMonitor> {
        &self.health
    }

    /// Wait for the next meaningful background result.
    ///
    /// Stale saves and stale print results are consumed silently.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            let update = match self.events.next().await? {
                Event::TransactionSaved {
                    submission,
                    outcome,
                } => self
                    .checkout
                    .on_saved(submission, outcome)
                    .map(SessionUpdate::Checkout),
                Event::PrintFinished {
                    cycle,
                    attempt,
                    outcome,
                } => match self.print.handle(cycle, attempt, outcome) {
                    PrintUpdate::Ignored => None,
                    update => {
                        self.record_print(&update);
                        Some(SessionUpdate::Print(update))
                    }
                },
                Event::DiagnosticsFinished(outcome) => Some(SessionUpdate::Diagnostics(outcome)),
                Event::StressTestFinished(outcome) => Some(SessionUpdate::StressTest(outcome)),
            };
            if update.is_some() {
                return update;
            }
        }
    }

    /// Feed a print result into the health counters.
    fn record_print(&self, update: &PrintUpdate) {
        let recorded = match update {
            PrintUpdate::Succeeded { .. } => self.health.record_connection(true),
            PrintUpdate::Failed { reason, .. } if reason == PRINTER_NOT_CONNECTED => {
                self.health.record_connection(false)
            }
            PrintUpdate::Failed { reason, .. } if reason == PRINTER_DISCONNECTED => {
                self.health.record_disconnection()
            }
            PrintUpdate::Failed { .. } => self.health.record_error(),
            PrintUpdate::Cancelled | PrintUpdate::Ignored => Ok(()),
        };
        if let Err(e) = recorded {
            tracing::warn!("Failed to record print result: {}", e);
        }
    }
}
