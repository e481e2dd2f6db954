//! # Checkout
//!
//! Confirming a draft: build the transaction and its receipt, save it in
//! the background, and turn the save result into what the completion
//! dialog shows.
//!
//! ```text
//!   confirm(draft) ──► SaveAdapter::submit ──► Event::TransactionSaved
//!                                                     │
//!   Completion::Saved / SaveFailed ◄── on_saved ◄─────┘
//! ```
//!
//! A failed save still carries the receipt, so it can be printed anyway.

use chrono::{DateTime, Local};

use std::sync::Arc;

use crate::config::ShopProfile;
use crate::diagnostics::HealthMonitor;
use crate::error::ScrapPosError;
use crate::event::Outcome;
use crate::format;
use crate::persistence::SaveAdapter;
use crate::receipt::{ReceiptData, format_receipt};
use crate::transaction::model::millis;
use crate::transaction::{
    MaterialSummary, Transaction, TransactionDraft, TransactionMaterial, WeightSource,
    confirmation_notes,
};

/// Reason used when the repository hands back no usable row id
pub const SAVE_FAILED: &str = "Failed to save transaction";

/// Next steps offered after a failed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFailureOption {
    PrintAnyway,
    RetrySave,
    Continue,
}

impl SaveFailureOption {
    pub const ALL: [SaveFailureOption; 3] = [
        SaveFailureOption::PrintAnyway,
        SaveFailureOption::RetrySave,
        SaveFailureOption::Continue,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SaveFailureOption::PrintAnyway => "Print Receipt Anyway",
            SaveFailureOption::RetrySave => "Retry Save",
            SaveFailureOption::Continue => "Continue",
        }
    }
}

/// Result of a confirmed checkout, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Saved {
        row_id: i64,
        transaction: Transaction,
        /// e.g. `KSH 2,500.00 saved successfully`
        summary: String,
        /// e.g. `2 materials • 12.50 kg • KSH 2,500.00`
        detail: String,
        receipt: String,
    },
    SaveFailed {
        error: String,
        transaction: Transaction,
        receipt: String,
        options: Vec<SaveFailureOption>,
    },
}

impl Completion {
    pub fn receipt(&self) -> &str {
        match self {
            Completion::Saved { receipt, .. } | Completion::SaveFailed { receipt, .. } => receipt,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        match self {
            Completion::Saved { transaction, .. } | Completion::SaveFailed { transaction, .. } => {
                transaction
            }
        }
    }
}

/// Everything needed to report on, or resubmit, one save.
#[derive(Debug, Clone)]
struct Submitted {
    submission: u64,
    transaction: Transaction,
    materials: Vec<TransactionMaterial>,
    receipt: String,
}

pub struct Checkout {
    adapter: SaveAdapter,
    shop: ShopProfile,
    health: Option<Arc<dyn HealthMonitor>>,
    submitted: Option<Submitted>,
    last_failed: Option<Submitted>,
}

impl Checkout {
    pub fn new(adapter: SaveAdapter, shop: ShopProfile) -> Self {
        Self {
            adapter,
            shop,
            health: None,
            submitted: None,
            last_failed: None,
        }
    }

    /// Count scale-sourced weights as readings on `health`.
    pub fn with_health_monitor(mut self, health: Arc<dyn HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn adapter(&self) -> &SaveAdapter {
        &self.adapter
    }

    /// Confirm `draft` and start saving it. Returns the submission id.
    ///
    /// `extra_notes` are appended to the standard confirmation note.
    pub fn confirm(
        &mut self,
        draft: &TransactionDraft,
        source: WeightSource,
        extra_notes: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<u64, ScrapPosError> {
        if draft.is_empty() {
            return Err(ScrapPosError::InvalidInput("No materials to complete".into()));
        }

        let summaries: Vec<MaterialSummary> = draft.summaries();
        let mut notes = confirmation_notes(source);
        if let Some(extra) = extra_notes.map(str::trim).filter(|n| !n.is_empty()) {
            notes = format!("{}; {}", notes, extra);
        }
        let transaction = Transaction::from_summaries(&summaries, millis(&now)).with_notes(notes);
        let receipt = format_receipt(
            &self.shop,
            &ReceiptData::for_transaction(&transaction, &summaries, now.naive_local()),
        );

        let submission = self.submit(transaction, draft.materials().to_vec(), receipt)?;
        if source == WeightSource::BleScale {
            self.record_readings(draft.len());
        }
        Ok(submission)
    }

    /// Resubmit the transaction whose save last failed.
    ///
    /// If the resubmit is refused (another save still in flight) the failed
    /// save stays available for a later retry.
    pub fn retry_save(&mut self) -> Result<u64, ScrapPosError> {
        let failed = self
            .last_failed
            .as_ref()
            .ok_or_else(|| ScrapPosError::InvalidInput("No failed save to retry".into()))?;
        tracing::info!("Retrying save of {}", failed.transaction.transaction_id);
        let (transaction, materials, receipt) = (
            failed.transaction.clone(),
            failed.materials.clone(),
            failed.receipt.clone(),
        );
        let submission = self.submit(transaction, materials, receipt)?;
        self.last_failed = None;
        Ok(submission)
    }

    /// Drop a failed save without retrying.
    pub fn discard_failed(&mut self) -> Option<Transaction> {
        self.last_failed.take().map(|f| f.transaction)
    }

    /// Interpret a save result. `None` for a stale submission.
    pub fn on_saved(&mut self, submission: u64, outcome: Outcome<i64>) -> Option<Completion> {
        if !self.adapter.complete(submission) {
            return None;
        }
        let submitted = match self.submitted.take() {
            Some(s) if s.submission == submission => s,
            other => {
                self.submitted = other;
                return None;
            }
        };

        let error = match outcome {
            Outcome::Success(row_id) if row_id > 0 => {
                let t = &submitted.transaction;
                let value = t.formatted_total_value(&self.shop.currency);
                tracing::info!("Saved {} as row {}", t.transaction_id, row_id);
                return Some(Completion::Saved {
                    row_id,
                    summary: format!("{} saved successfully", value),
                    detail: format!(
                        "{} materials • {} • {}",
                        t.material_count,
                        t.formatted_total_weight(),
                        value
                    ),
                    transaction: submitted.transaction,
                    receipt: submitted.receipt,
                });
            }
            Outcome::Success(_) => SAVE_FAILED.to_string(),
            Outcome::Failure(reason) => reason,
            Outcome::Cancelled => "Save cancelled".to_string(),
        };

        tracing::error!(
            "Save of {} failed: {}",
            submitted.transaction.transaction_id,
            error
        );
        let completion = Completion::SaveFailed {
            error,
            transaction: submitted.transaction.clone(),
            receipt: submitted.receipt.clone(),
            options: SaveFailureOption::ALL.to_vec(),
        };
        self.last_failed = Some(submitted);
        Some(completion)
    }

    fn record_readings(&self, count: usize) {
        let Some(health) = &self.health else { return };
        for _ in 0..count {
            if let Err(e) = health.record_weight_reading() {
                tracing::warn!("Failed to record weight reading: {}", e);
                return;
            }
        }
    }

    fn submit(
        &mut self,
        transaction: Transaction,
        materials: Vec<TransactionMaterial>,
        receipt: String,
    ) -> Result<u64, ScrapPosError> {
        let submission = self.adapter.submit(transaction.clone(), materials.clone())?;
        self.submitted = Some(Submitted {
            submission,
            transaction,
            materials,
            receipt,
        });
        Ok(submission)
    }
}

/// Multi-line description of a failed save.
pub fn save_failure_message(error: &str, transaction: &Transaction, currency: &str) -> String {
    format!(
        "Transaction Save Failed\nError: {}\nTransaction ID: {}\n\nTotal Weight: {} kg\nTotal Value: {}",
        error,
        transaction.transaction_id,
        format::weight(transaction.total_weight),
        transaction.formatted_total_value(currency)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, Event, EventLoop};
    use crate::persistence::{StoredTransaction, TransactionRepository, TransactionStats};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` saves, then succeeds.
    struct FlakyRepository {
        failures: AtomicU32,
        saved: AtomicU32,
    }

    impl TransactionRepository for FlakyRepository {
        fn save(&self, _: &Transaction, _: &[TransactionMaterial]) -> Result<i64, ScrapPosError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ScrapPosError::Persistence("database is locked".into()));
            }
            Ok(i64::from(self.saved.fetch_add(1, Ordering::SeqCst)) + 1)
        }

        fn list(&self) -> Result<Vec<StoredTransaction>, ScrapPosError> {
            Ok(Vec::new())
        }

        fn stats(&self) -> Result<TransactionStats, ScrapPosError> {
            Ok(TransactionStats::default())
        }
    }

    fn checkout(failures: u32) -> (Checkout, EventLoop) {
        let (sender, events) = event::channel();
        let repo = Arc::new(FlakyRepository {
            failures: AtomicU32::new(failures),
            saved: AtomicU32::new(0),
        });
        let adapter = SaveAdapter::new(repo, sender);
        (Checkout::new(adapter, ShopProfile::default()), events)
    }

    fn steel_and_copper() -> TransactionDraft {
        let mut draft = TransactionDraft::new();
        draft.add("Steel", 10.0, 50.0, 0).unwrap();
        draft.add("Copper", 2.5, 800.0, 0).unwrap();
        draft
    }

    fn now() -> DateTime<Local> {
        Local.timestamp_millis_opt(1_768_910_400_000).unwrap()
    }

    async fn completion(checkout: &mut Checkout, events: &mut EventLoop) -> Completion {
        match events.next().await {
            Some(Event::TransactionSaved {
                submission,
                outcome,
            }) => checkout.on_saved(submission, outcome).unwrap(),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_empty_draft_rejected() {
        let (mut checkout, _events) = checkout(0);
        let err = checkout
            .confirm(&TransactionDraft::new(), WeightSource::Manual, None, now())
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: No materials to complete");
    }

    #[tokio::test]
    async fn test_saved_summary() {
        let (mut checkout, mut events) = checkout(0);
        checkout
            .confirm(&steel_and_copper(), WeightSource::BleScale, None, now())
            .unwrap();

        match completion(&mut checkout, &mut events).await {
            Completion::Saved {
                row_id,
                transaction,
                summary,
                detail,
                receipt,
            } => {
                assert_eq!(row_id, 1);
                assert_eq!(transaction.transaction_id, "TXN_1768910400000");
                assert_eq!(transaction.total_weight, 12.5);
                assert_eq!(transaction.total_value, 2500.0);
                assert_eq!(
                    transaction.notes.as_deref(),
                    Some("Completed via BLE Scale - User Confirmed")
                );
                assert_eq!(summary, "KSH 2,500.00 saved successfully");
                assert_eq!(detail, "2 materials • 12.50 kg • KSH 2,500.00");
                assert!(receipt.contains("Transaction: 1768910400000"));
                assert!(receipt.contains("TOTAL VALUE:  KSH 2,500.00"));
            }
            other => panic!("expected save, got {:?}", other),
        }
        assert_eq!(checkout.adapter().in_flight(), None);
    }

    #[tokio::test]
    async fn test_failure_keeps_receipt_and_retries() {
        let (mut checkout, mut events) = checkout(1);
        checkout
            .confirm(&steel_and_copper(), WeightSource::Manual, Some("walk-in"), now())
            .unwrap();

        let failed = completion(&mut checkout, &mut events).await;
        match &failed {
            Completion::SaveFailed { error, options, .. } => {
                assert_eq!(error, "Persistence error: database is locked");
                assert_eq!(options, &SaveFailureOption::ALL.to_vec());
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(failed.receipt().contains("Copper"));
        assert_eq!(
            failed.transaction().notes.as_deref(),
            Some("Completed via Manual Entry - User Confirmed; walk-in")
        );

        checkout.retry_save().unwrap();
        match completion(&mut checkout, &mut events).await {
            Completion::Saved { transaction, .. } => {
                assert_eq!(transaction, *failed.transaction())
            }
            other => panic!("expected save, got {:?}", other),
        }
        assert!(checkout.retry_save().is_err());
    }

    #[tokio::test]
    async fn test_retry_refused_while_saving_keeps_failed_save() {
        let (mut checkout, mut events) = checkout(1);
        checkout
            .confirm(&steel_and_copper(), WeightSource::Manual, None, now())
            .unwrap();
        let failed = completion(&mut checkout, &mut events).await;
        assert!(matches!(failed, Completion::SaveFailed { .. }));

        let mut other = TransactionDraft::new();
        other.add("Brass", 4.0, 300.0, 0).unwrap();
        let later = now() + chrono::Duration::seconds(5);
        checkout.confirm(&other, WeightSource::Manual, None, later).unwrap();

        let err = checkout.retry_save().unwrap_err();
        assert!(matches!(err, ScrapPosError::AlreadyRunning(_)));

        match completion(&mut checkout, &mut events).await {
            Completion::Saved { transaction, .. } => {
                assert_eq!(transaction.total_value, 1200.0)
            }
            other => panic!("expected save, got {:?}", other),
        }

        checkout.retry_save().unwrap();
        match completion(&mut checkout, &mut events).await {
            Completion::Saved { transaction, .. } => {
                assert_eq!(transaction, *failed.transaction())
            }
            other => panic!("expected save, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_continue_without_saving() {
        let (mut checkout, mut events) = checkout(1);
        checkout
            .confirm(&steel_and_copper(), WeightSource::Manual, None, now())
            .unwrap();
        completion(&mut checkout, &mut events).await;

        let dropped = checkout.discard_failed().unwrap();
        assert_eq!(dropped.transaction_id, "TXN_1768910400000");
        assert!(checkout.retry_save().is_err());
    }

    #[tokio::test]
    async fn test_second_confirm_while_saving_rejected() {
        let (mut checkout, mut events) = checkout(0);
        let draft = steel_and_copper();
        checkout.confirm(&draft, WeightSource::Manual, None, now()).unwrap();
        let err = checkout
            .confirm(&draft, WeightSource::Manual, None, now())
            .unwrap_err();
        assert!(matches!(err, ScrapPosError::AlreadyRunning(_)));
        completion(&mut checkout, &mut events).await;
    }

    #[test]
    fn test_stale_result_ignored() {
        let (mut checkout, _events) = checkout(0);
        assert_eq!(checkout.on_saved(42, Outcome::Success(1)), None);
    }

    #[test]
    fn test_failure_message() {
        let mut draft = TransactionDraft::new();
        draft.add("Steel", 10.0, 50.0, 0).unwrap();
        let transaction = Transaction::from_summaries(&draft.summaries(), 5);
        let message = save_failure_message("disk full", &transaction, "KSH");
        assert!(message.starts_with("Transaction Save Failed\nError: disk full\nTransaction ID: TXN_5"));
        assert!(message.ends_with("Total Weight: 10.00 kg\nTotal Value: KSH 500.00"));
    }
}
