//! Accumulating materials into the current transaction.
//!
//! Weighings arrive one at a time (single mode) or as a series of partial
//! loads of the same material (batch mode). Either way a material appears
//! at most once in the draft: adding an existing name merges the weight.

use crate::error::ScrapPosError;

use super::model::{MaterialSummary, TransactionMaterial};

/// The transaction being built at the counter.
#[derive(Debug, Clone, Default)]
pub struct TransactionDraft {
    materials: Vec<TransactionMaterial>,
}

impl TransactionDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a weighed material, merging into an existing line of the same name.
    ///
    /// The merged line keeps its position and takes the latest price.
    pub fn add(
        &mut self,
        name: &str,
        weight: f64,
        price_per_kg: f64,
        timestamp: i64,
    ) -> Result<&TransactionMaterial, ScrapPosError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ScrapPosError::InvalidInput("Material name is empty".into()));
        }
        validate_weight(weight)?;
        if !price_per_kg.is_finite() || price_per_kg < 0.0 {
            return Err(ScrapPosError::InvalidInput(format!(
                "Invalid price for {}: {}",
                name, price_per_kg
            )));
        }

        let index = match self.position(name) {
            Some(i) => {
                let existing = &mut self.materials[i];
                existing.weight += weight;
                existing.price_per_kg = price_per_kg;
                existing.timestamp = timestamp;
                tracing::debug!(
                    "Merged {:.2} kg into {} (total {:.2} kg)",
                    weight,
                    name,
                    existing.weight
                );
                i
            }
            None => {
                self.materials.push(TransactionMaterial {
                    material_name: name.to_string(),
                    weight,
                    price_per_kg,
                    timestamp,
                });
                self.materials.len() - 1
            }
        };

        Ok(&self.materials[index])
    }

    /// Fold a finished batch into the draft as one material line.
    pub fn add_batch(
        &mut self,
        batch: &WeighingBatch,
        timestamp: i64,
    ) -> Result<&TransactionMaterial, ScrapPosError> {
        if batch.is_empty() {
            return Err(ScrapPosError::InvalidInput("No batches added".into()));
        }
        self.add(
            &batch.material_name,
            batch.total_weight(),
            batch.price_per_kg,
            timestamp,
        )
    }

    /// Remove a material line by name. Returns the removed line.
    pub fn remove(&mut self, name: &str) -> Option<TransactionMaterial> {
        let i = self.position(name)?;
        Some(self.materials.remove(i))
    }

    pub fn materials(&self) -> &[TransactionMaterial] {
        &self.materials
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.materials.iter().map(|m| m.weight).sum()
    }

    pub fn total_value(&self) -> f64 {
        self.materials.iter().map(|m| m.value()).sum()
    }

    /// Per-material summaries in insertion order.
    pub fn summaries(&self) -> Vec<MaterialSummary> {
        self.materials.iter().map(MaterialSummary::from).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.material_name == name)
    }
}

/// Partial loads of a single material, summed before joining the draft.
#[derive(Debug, Clone)]
pub struct WeighingBatch {
    pub material_name: String,
    pub price_per_kg: f64,
    weights: Vec<f64>,
}

impl WeighingBatch {
    pub fn new(material_name: impl Into<String>, price_per_kg: f64) -> Self {
        Self {
            material_name: material_name.into(),
            price_per_kg,
            weights: Vec::new(),
        }
    }

    pub fn push(&mut self, weight: f64) -> Result<(), ScrapPosError> {
        validate_weight(weight)?;
        self.weights.push(weight);
        Ok(())
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn total_value(&self) -> f64 {
        self.total_weight() * self.price_per_kg
    }
}

fn validate_weight(weight: f64) -> Result<(), ScrapPosError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(ScrapPosError::InvalidInput(format!("Invalid weight: {}", weight)))
    }
}
