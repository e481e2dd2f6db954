//! # Transactions
//!
//! Domain types for a scrap-metal sale.
//!
//! - [`draft`]: the transaction being assembled from weighings
//! - [`model`]: confirmed transactions and per-material summaries

pub mod draft;
pub mod model;

pub use draft::{TransactionDraft, WeighingBatch};
pub use model::{
    MaterialSummary, Transaction, TransactionMaterial, TransactionStatus, WeightSource,
    confirmation_notes, transaction_id_for,
};
