//! # Receipt Formatter
//!
//! Turns a confirmed transaction into the fixed-width text receipt handed to
//! the printer (and stored for later printing).
//!
//! The layout is 32 columns wide, the line width of a 58mm thermal roll:
//!
//! ```text
//! ================================
//!     MERU SCRAP METAL MARKET
//!       Meru County, Kenya
//! ================================
//! Date: 20/01/2026 12:00
//! Transaction: 1768910400000
//! Materials: 2
//! ================================
//! MATERIALS:
//! --------------------------------
//! Steel              10.00 kg
//!   @ 50.00/kg = KSH 500.00
//!
//! Copper              2.50 kg
//!   @ 800.00/kg = KSH 2,000.00
//!
//! --------------------------------
//! TOTAL WEIGHT:      12.50 kg
//! TOTAL VALUE:  KSH 2,500.00
//! ================================
//! Thank you for your business!
//! Come back soon!
//! ================================
//! ```
//!
//! Formatting is pure: the issue time and reference are inputs, so the same
//! input always yields the same bytes.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fmt::Write;

use crate::config::ShopProfile;
use crate::format;
use crate::transaction::{MaterialSummary, Transaction};

/// Receipt line width in characters
pub const RECEIPT_WIDTH: usize = 32;

/// Names longer than this are truncated
pub const NAME_COLUMN: usize = 15;

const ELLIPSIS: &str = "...";

/// One material line on the receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLine {
    pub name: String,
    pub weight: f64,
    pub price_per_kg: f64,
}

impl ReceiptLine {
    pub fn value(&self) -> f64 {
        self.weight * self.price_per_kg
    }
}

/// Everything printed on a receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptData {
    pub lines: Vec<ReceiptLine>,
    pub total_weight: f64,
    pub total_value: f64,
    pub issued_at: NaiveDateTime,
    /// Printed after `Transaction:`
    pub reference: String,
}

impl ReceiptData {
    /// Build receipt data from a name → weight mapping and a price lookup.
    ///
    /// A material missing from `prices` is priced at zero.
    pub fn from_weights(
        weights: &[(String, f64)],
        prices: &HashMap<String, f64>,
        total_weight: f64,
        total_value: f64,
        issued_at: NaiveDateTime,
        reference: impl Into<String>,
    ) -> Self {
        let lines = weights
            .iter()
            .map(|(name, weight)| ReceiptLine {
                name: name.clone(),
                weight: *weight,
                price_per_kg: prices.get(name).copied().unwrap_or(0.0),
            })
            .collect();

        Self {
            lines,
            total_weight,
            total_value,
            issued_at,
            reference: reference.into(),
        }
    }

    /// Build receipt data for a confirmed transaction.
    pub fn for_transaction(
        transaction: &Transaction,
        summaries: &[MaterialSummary],
        issued_at: NaiveDateTime,
    ) -> Self {
        Self {
            lines: summaries
                .iter()
                .map(|s| ReceiptLine {
                    name: s.material_name.clone(),
                    weight: s.weight,
                    price_per_kg: s.price_per_kg,
                })
                .collect(),
            total_weight: transaction.total_weight,
            total_value: transaction.total_value,
            issued_at,
            reference: transaction.timestamp.to_string(),
        }
    }
}

/// Format a receipt as text.
///
/// ## Example
///
/// ```
/// use scrap_pos::config::ShopProfile;
/// use scrap_pos::receipt::{format_receipt, golden_sample};
///
/// let text = format_receipt(&ShopProfile::default(), &golden_sample());
/// assert!(text.contains("TOTAL VALUE:  KSH 2,500.00"));
/// ```
pub fn format_receipt(shop: &ShopProfile, data: &ReceiptData) -> String {
    let double_rule = "=".repeat(RECEIPT_WIDTH);
    let single_rule = "-".repeat(RECEIPT_WIDTH);
    let mut out = String::new();

    // writeln! into a String cannot fail
    let _ = writeln!(out, "{}", double_rule);
    for line in &shop.header_lines {
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out, "{}", double_rule);

    let _ = writeln!(out, "Date: {}", data.issued_at.format("%d/%m/%Y %H:%M"));
    let _ = writeln!(out, "Transaction: {}", data.reference);
    if !data.lines.is_empty() {
        let _ = writeln!(out, "Materials: {}", data.lines.len());
    }
    let _ = writeln!(out, "{}", double_rule);

    let _ = writeln!(out, "MATERIALS:");
    let _ = writeln!(out, "{}", single_rule);
    for line in &data.lines {
        let _ = writeln!(
            out,
            "{:<15} {:>8} kg",
            truncate_name(&line.name),
            format::weight(line.weight)
        );
        let _ = writeln!(
            out,
            "  @ {}/kg = {}",
            format::amount(line.price_per_kg),
            format::currency(&shop.currency, line.value())
        );
        out.push('\n');
    }

    let _ = writeln!(out, "{}", single_rule);
    let _ = writeln!(out, "TOTAL WEIGHT: {:>10} kg", format::weight(data.total_weight));
    let _ = writeln!(
        out,
        "TOTAL VALUE:  {}",
        format::currency(&shop.currency, data.total_value)
    );
    let _ = writeln!(out, "{}", double_rule);
    for line in &shop.footer_lines {
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out, "{}", double_rule);

    // Feed room for the cutter
    out.push_str("\n\n");
    out
}

/// Truncate a material name to the name column.
///
/// Names of up to 15 characters pass through; longer names keep their first
/// 12 characters followed by `...`.
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() <= NAME_COLUMN {
        name.to_string()
    } else {
        let head: String = name.chars().take(NAME_COLUMN - ELLIPSIS.len()).collect();
        format!("{}{}", head, ELLIPSIS)
    }
}

/// Fixed issue time used by golden receipts.
pub fn golden_datetime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 20)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

/// The reference receipt: 10 kg steel at 50 and 2.5 kg copper at 800.
pub fn golden_sample() -> ReceiptData {
    let weights = vec![("Steel".to_string(), 10.0), ("Copper".to_string(), 2.5)];
    let prices = HashMap::from([("Steel".to_string(), 50.0), ("Copper".to_string(), 800.0)]);
    ReceiptData::from_weights(
        &weights,
        &prices,
        12.5,
        2500.0,
        golden_datetime(),
        "1768910400000",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn test_golden_sample_lines() {
        let text = format_receipt(&ShopProfile::default(), &golden_sample());
        let lines = lines_of(&text);

        assert_eq!(lines[0], "================================");
        assert_eq!(lines[1], "    MERU SCRAP METAL MARKET");
        assert_eq!(lines[4], "Date: 20/01/2026 12:00");
        assert_eq!(lines[5], "Transaction: 1768910400000");
        assert_eq!(lines[6], "Materials: 2");
        assert!(lines.contains(&"Steel              10.00 kg"));
        assert!(lines.contains(&"  @ 50.00/kg = KSH 500.00"));
        assert!(lines.contains(&"Copper              2.50 kg"));
        assert!(lines.contains(&"  @ 800.00/kg = KSH 2,000.00"));
        assert!(lines.contains(&"TOTAL WEIGHT:      12.50 kg"));
        assert!(lines.contains(&"TOTAL VALUE:  KSH 2,500.00"));
    }

    #[test]
    fn test_rules_are_32_wide() {
        let text = format_receipt(&ShopProfile::default(), &golden_sample());
        for line in text.lines().filter(|l| l.starts_with('=') || l.starts_with('-')) {
            assert_eq!(line.len(), RECEIPT_WIDTH, "rule {:?}", line);
        }
    }

    #[test]
    fn test_deterministic() {
        let shop = ShopProfile::default();
        let a = format_receipt(&shop, &golden_sample());
        let b = format_receipt(&shop, &golden_sample());
        assert_eq!(a, b);
    }

    #[test]
    fn test_ends_with_cut_feed() {
        let text = format_receipt(&ShopProfile::default(), &golden_sample());
        assert!(text.ends_with("================================\n\n\n"));
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("Copper"), "Copper");
        assert_eq!(truncate_name("Exactly15Chars!"), "Exactly15Chars!");
        assert_eq!(truncate_name("Sixteen chars!!!"), "Sixteen char...");
        assert_eq!(truncate_name("Aluminium Radiators"), "Aluminium Ra...");
        assert_eq!(truncate_name("Aluminium Radiators").chars().count(), 15);
    }

    #[test]
    fn test_truncate_counts_characters() {
        // 16 characters, more bytes
        assert_eq!(truncate_name("Kupfer-Kühler-XL"), "Kupfer-Kühle...");
    }

    #[test]
    fn test_missing_price_is_zero() {
        let weights = vec![("Mystery".to_string(), 3.0)];
        let data = ReceiptData::from_weights(
            &weights,
            &HashMap::new(),
            3.0,
            0.0,
            golden_datetime(),
            "1",
        );
        let text = format_receipt(&ShopProfile::default(), &data);
        assert!(text.contains("  @ 0.00/kg = KSH 0.00"));
    }

    #[test]
    fn test_empty_receipt_omits_material_count() {
        let data = ReceiptData::from_weights(&[], &HashMap::new(), 0.0, 0.0, golden_datetime(), "1");
        let text = format_receipt(&ShopProfile::default(), &data);
        assert!(!text.contains("Materials:"));
        assert!(text.contains("TOTAL WEIGHT:       0.00 kg"));
    }

    #[test]
    fn test_for_transaction_uses_transaction_totals() {
        let summaries = vec![MaterialSummary {
            material_name: "Brass".into(),
            weight: 4.0,
            price_per_kg: 350.0,
            value: 1400.0,
        }];
        let txn = Transaction::from_summaries(&summaries, 42);
        let data = ReceiptData::for_transaction(&txn, &summaries, golden_datetime());
        assert_eq!(data.reference, "42");
        assert_eq!(data.total_value, 1400.0);
        assert_eq!(data.lines[0].value(), 1400.0);
    }
}
