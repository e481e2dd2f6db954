//! Transaction records.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::format;

/// One weighed material inside the current transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMaterial {
    pub material_name: String,
    pub weight: f64,
    pub price_per_kg: f64,
    /// Epoch millis of the last weighing folded into this line
    pub timestamp: i64,
}

impl TransactionMaterial {
    pub fn value(&self) -> f64 {
        self.weight * self.price_per_kg
    }
}

/// Aggregated weight and value of one material, built at confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSummary {
    pub material_name: String,
    pub weight: f64,
    pub price_per_kg: f64,
    pub value: f64,
}

impl From<&TransactionMaterial> for MaterialSummary {
    fn from(material: &TransactionMaterial) -> Self {
        Self {
            material_name: material.material_name.clone(),
            weight: material.weight,
            price_per_kg: material.price_per_kg,
            value: material.value(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Pending,
    Cancelled,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Where the weights in a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightSource {
    BleScale,
    Manual,
}

impl WeightSource {
    pub fn label(&self) -> &'static str {
        match self {
            WeightSource::BleScale => "BLE Scale",
            WeightSource::Manual => "Manual Entry",
        }
    }
}

/// A completed sale. Immutable once handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// `TXN_<epoch-millis>`
    pub transaction_id: String,
    /// Epoch millis at confirmation
    pub timestamp: i64,
    pub total_weight: f64,
    pub total_value: f64,
    pub material_count: usize,
    pub status: TransactionStatus,
    pub notes: Option<String>,
}

impl Transaction {
    /// Build a transaction from confirmed material summaries.
    ///
    /// Totals are the sums over `summaries`, so the receipt, the dialog and
    /// the stored record always agree.
    pub fn from_summaries(summaries: &[MaterialSummary], timestamp: i64) -> Self {
        let total_weight = summaries.iter().map(|s| s.weight).sum();
        let total_value = summaries.iter().map(|s| s.value).sum();
        Self {
            transaction_id: transaction_id_for(timestamp),
            timestamp,
            total_weight,
            total_value,
            material_count: summaries.len(),
            status: TransactionStatus::Completed,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// `dd/MM/yyyy HH:mm` in local time
    pub fn formatted_timestamp(&self) -> String {
        match Local.timestamp_millis_opt(self.timestamp).single() {
            Some(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
            None => self.timestamp.to_string(),
        }
    }

    pub fn formatted_total_weight(&self) -> String {
        format::weight_kg(self.total_weight)
    }

    pub fn formatted_total_value(&self, currency: &str) -> String {
        format::currency(currency, self.total_value)
    }
}

/// `TXN_<epoch-millis>`
pub fn transaction_id_for(timestamp_millis: i64) -> String {
    format!("TXN_{}", timestamp_millis)
}

/// Notes recorded with a confirmed transaction.
pub fn confirmation_notes(source: WeightSource) -> String {
    format!("Completed via {} - User Confirmed", source.label())
}

/// Epoch millis for a local timestamp.
pub fn millis(at: &DateTime<Local>) -> i64 {
    at.timestamp_millis()
}
