//! File-backed transaction repository.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::ScrapPosError;
use crate::storage;
use crate::transaction::{Transaction, TransactionMaterial, TransactionStatus};

use super::{StoredTransaction, TransactionRepository, TransactionStats};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TransactionFile {
    last_row_id: i64,
    transactions: Vec<StoredTransaction>,
}

/// Transactions kept in a single JSON document.
///
/// Row ids start at 1 and are never reused, even if the file is edited
/// to remove rows.
pub struct JsonTransactionRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonTransactionRepository {
    /// Open (or lazily create) the repository at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScrapPosError> {
        let path = path.as_ref().to_path_buf();
        // Surface a corrupt file at startup rather than on the first save
        let existing: TransactionFile = storage::load_or_default(&path)?;
        tracing::debug!(
            "Opened {} ({} transactions)",
            path.display(),
            existing.transactions.len()
        );
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, ScrapPosError> {
        self.lock
            .lock()
            .map_err(|_| ScrapPosError::Persistence("Repository lock poisoned".into()))
    }
}

impl TransactionRepository for JsonTransactionRepository {
    fn save(
        &self,
        transaction: &Transaction,
        materials: &[TransactionMaterial],
    ) -> Result<i64, ScrapPosError> {
        let _guard = self.guard()?;
        let mut file: TransactionFile = storage::load_or_default(&self.path)?;

        let row_id = file.last_row_id + 1;
        file.last_row_id = row_id;
        file.transactions.push(StoredTransaction {
            row_id,
            transaction: transaction.clone(),
            items: materials.to_vec(),
        });

        storage::save_atomic(&self.path, &file)
            .map_err(|e| ScrapPosError::Persistence(format!("Failed to save transaction: {}", e)))?;

        tracing::info!(
            "Saved {} as row {} ({} items)",
            transaction.transaction_id,
            row_id,
            materials.len()
        );
        Ok(row_id)
    }

    fn list(&self) -> Result<Vec<StoredTransaction>, ScrapPosError> {
        let _guard = self.guard()?;
        let file: TransactionFile = storage::load_or_default(&self.path)?;
        let mut transactions = file.transactions;
        transactions.sort_by(|a, b| {
            b.transaction
                .timestamp
                .cmp(&a.transaction.timestamp)
                .then(b.row_id.cmp(&a.row_id))
        });
        Ok(transactions)
    }

    fn get(&self, row_id: i64) -> Result<Option<StoredTransaction>, ScrapPosError> {
        let _guard = self.guard()?;
        let file: TransactionFile = storage::load_or_default(&self.path)?;
        Ok(file.transactions.into_iter().find(|t| t.row_id == row_id))
    }

    fn stats(&self) -> Result<TransactionStats, ScrapPosError> {
        let _guard = self.guard()?;
        let file: TransactionFile = storage::load_or_default(&self.path)?;
        let stats = file
            .transactions
            .iter()
            .filter(|t| t.transaction.status == TransactionStatus::Completed)
            .fold(TransactionStats::default(), |mut acc, t| {
                acc.total_transactions += 1;
                acc.total_weight += t.transaction.total_weight;
                acc.total_value += t.transaction.total_value;
                acc
            });
        Ok(stats)
    }
}
