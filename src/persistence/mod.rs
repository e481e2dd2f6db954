//! # Transaction Persistence
//!
//! Saving a confirmed transaction is a blocking call into a
//! [`TransactionRepository`]. The [`SaveAdapter`] runs it on a blocking
//! worker and posts the result back as [`Event::TransactionSaved`], so the
//! confirming caller never waits on storage.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`TransactionRepository`] | Blocking storage collaborator |
//! | [`JsonTransactionRepository`] | File-backed implementation |
//! | [`SaveAdapter`] | Off-thread save, one in flight at a time |

pub mod json_repo;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ScrapPosError;
use crate::event::{Event, EventSender, Outcome, spawn_worker};
use crate::format;
use crate::transaction::{Transaction, TransactionMaterial};

pub use json_repo::JsonTransactionRepository;

/// Aggregates over completed transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub total_transactions: usize,
    pub total_weight: f64,
    pub total_value: f64,
}

impl TransactionStats {
    pub fn formatted_total_weight(&self) -> String {
        format::weight_kg(self.total_weight)
    }

    pub fn formatted_total_value(&self, currency: &str) -> String {
        format::currency(currency, self.total_value)
    }
}

/// A saved transaction with its row id and line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub row_id: i64,
    #[serde(flatten)]
    pub transaction: Transaction,
    pub items: Vec<TransactionMaterial>,
}

/// Blocking storage for confirmed transactions.
///
/// Implementations are called from worker threads only.
pub trait TransactionRepository: Send + Sync {
    /// Persist a transaction and its materials, returning the new row id.
    fn save(
        &self,
        transaction: &Transaction,
        materials: &[TransactionMaterial],
    ) -> Result<i64, ScrapPosError>;

    /// All saved transactions, newest first.
    fn list(&self) -> Result<Vec<StoredTransaction>, ScrapPosError>;

    /// One saved transaction by row id.
    fn get(&self, row_id: i64) -> Result<Option<StoredTransaction>, ScrapPosError> {
        Ok(self.list()?.into_iter().find(|t| t.row_id == row_id))
    }

    /// Totals over transactions with status `COMPLETED`.
    fn stats(&self) -> Result<TransactionStats, ScrapPosError>;
}

/// Runs repository saves off the interactive side.
///
/// Each submission gets an id; the interactive side calls [`complete`]
/// when the matching [`Event::TransactionSaved`] arrives. A second
/// submission while one is outstanding is rejected.
///
/// [`complete`]: SaveAdapter::complete
pub struct SaveAdapter {
    repository: Arc<dyn TransactionRepository>,
    sender: EventSender,
    next_submission: u64,
    in_flight: Option<u64>,
}

impl SaveAdapter {
    pub fn new(repository: Arc<dyn TransactionRepository>, sender: EventSender) -> Self {
        Self {
            repository,
            sender,
            next_submission: 1,
            in_flight: None,
        }
    }

    /// Start saving `transaction`. Returns the submission id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &mut self,
        transaction: Transaction,
        materials: Vec<TransactionMaterial>,
    ) -> Result<u64, ScrapPosError> {
        if let Some(pending) = self.in_flight {
            return Err(ScrapPosError::AlreadyRunning(format!(
                "Save {} still in progress",
                pending
            )));
        }

        let submission = self.next_submission;
        self.next_submission += 1;
        self.in_flight = Some(submission);

        tracing::info!(
            "Saving {} ({} materials, {})",
            transaction.transaction_id,
            materials.len(),
            transaction.formatted_total_weight()
        );

        let repository = Arc::clone(&self.repository);
        spawn_worker(
            "Transaction save",
            self.sender.clone(),
            move || Outcome::from(repository.save(&transaction, &materials)),
            move |outcome| Event::TransactionSaved {
                submission,
                outcome,
            },
        );

        Ok(submission)
    }

    /// Mark `submission` finished. Returns false for an unknown or stale id.
    pub fn complete(&mut self, submission: u64) -> bool {
        if self.in_flight == Some(submission) {
            self.in_flight = None;
            true
        } else {
            tracing::debug!("Ignoring result for stale save {}", submission);
            false
        }
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn repository(&self) -> &Arc<dyn TransactionRepository> {
        &self.repository
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use crate::transaction::{MaterialSummary, TransactionDraft};

    struct FailingRepository;

    impl TransactionRepository for FailingRepository {
        fn save(&self, _: &Transaction, _: &[TransactionMaterial]) -> Result<i64, ScrapPosError> {
            Err(ScrapPosError::Persistence("database is locked".into()))
        }

        fn list(&self) -> Result<Vec<StoredTransaction>, ScrapPosError> {
            Ok(Vec::new())
        }

        fn stats(&self) -> Result<TransactionStats, ScrapPosError> {
            Ok(TransactionStats::default())
        }
    }

    fn sample() -> (Transaction, Vec<TransactionMaterial>) {
        let mut draft = TransactionDraft::new();
        draft.add("Steel", 10.0, 50.0, 1).unwrap();
        let summaries: Vec<MaterialSummary> = draft.summaries();
        (
            Transaction::from_summaries(&summaries, 1000),
            draft.materials().to_vec(),
        )
    }

    #[tokio::test]
    async fn test_save_posts_row_id() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(JsonTransactionRepository::open(dir.path().join("t.json")).unwrap());
        let (sender, mut events) = event::channel();
        let mut adapter = SaveAdapter::new(repo, sender);

        let (txn, materials) = sample();
        let submission = adapter.submit(txn, materials).unwrap();

        match events.next().await {
            Some(Event::TransactionSaved { submission: s, outcome }) => {
                assert_eq!(s, submission);
                assert_eq!(outcome, Outcome::Success(1));
                assert!(adapter.complete(s));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(adapter.in_flight(), None);
    }

    #[tokio::test]
    async fn test_second_submit_rejected_while_in_flight() {
        let (sender, mut events) = event::channel();
        let mut adapter = SaveAdapter::new(Arc::new(FailingRepository), sender);

        let (txn, materials) = sample();
        adapter.submit(txn.clone(), materials.clone()).unwrap();
        let err = adapter.submit(txn.clone(), materials.clone()).unwrap_err();
        assert!(matches!(err, ScrapPosError::AlreadyRunning(_)));

        // Once the first completes a new save may start
        if let Some(Event::TransactionSaved { submission, .. }) = events.next().await {
            adapter.complete(submission);
        }
        assert!(adapter.submit(txn, materials).is_ok());
    }

    #[tokio::test]
    async fn test_failure_becomes_outcome() {
        let (sender, mut events) = event::channel();
        let mut adapter = SaveAdapter::new(Arc::new(FailingRepository), sender);
        let (txn, materials) = sample();
        adapter.submit(txn, materials).unwrap();

        match events.next().await {
            Some(Event::TransactionSaved { outcome, .. }) => {
                assert_eq!(
                    outcome.failure(),
                    Some("Persistence error: database is locked")
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_stale_completion_ignored() {
        let (sender, _events) = event::channel();
        let mut adapter = SaveAdapter::new(Arc::new(FailingRepository), sender);
        assert!(!adapter.complete(9));
    }
}
