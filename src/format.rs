//! # Number Formatting
//!
//! Weight and currency formatting shared by receipts and completion
//! summaries.
//!
//! | Formatter | Pattern | Example |
//! |-----------|---------|---------|
//! | [`weight`] | `0.00` | `12.50` |
//! | [`amount`] | `#,##0.00` | `2,500.00` |
//! | [`currency`] | `KSH #,##0.00` | `KSH 2,500.00` |

/// Format a weight in kilograms with two decimals, no grouping.
///
/// ```
/// assert_eq!(scrap_pos::format::weight(12.5), "12.50");
/// ```
pub fn weight(kg: f64) -> String {
    format!("{:.2}", kg)
}

/// Format a weight with its unit suffix.
pub fn weight_kg(kg: f64) -> String {
    format!("{} kg", weight(kg))
}

/// Format a money amount with two decimals and comma thousands grouping.
///
/// ```
/// assert_eq!(scrap_pos::format::amount(2500.0), "2,500.00");
/// assert_eq!(scrap_pos::format::amount(-1234567.891), "-1,234,567.89");
/// ```
pub fn amount(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let digits = int_part.as_bytes();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*d as char);
    }

    // "-0.00" reads badly on a receipt
    if sign == "-" && grouped == "0" && frac_part == "00" {
        return format!("{}.{}", grouped, frac_part);
    }

    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Format a money amount with a currency prefix (e.g. `"KSH 2,500.00"`).
pub fn currency(prefix: &str, value: f64) -> String {
    if prefix.is_empty() {
        amount(value)
    } else {
        format!("{} {}", prefix, amount(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_two_decimals() {
        assert_eq!(weight(10.0), "10.00");
        assert_eq!(weight(2.5), "2.50");
        assert_eq!(weight(0.0), "0.00");
        assert_eq!(weight_kg(1.234), "1.23 kg");
    }

    #[test]
    fn test_amount_grouping() {
        assert_eq!(amount(0.0), "0.00");
        assert_eq!(amount(999.99), "999.99");
        assert_eq!(amount(1000.0), "1,000.00");
        assert_eq!(amount(123456.7), "123,456.70");
        assert_eq!(amount(1234567.0), "1,234,567.00");
    }

    #[test]
    fn test_amount_negative() {
        assert_eq!(amount(-1500.0), "-1,500.00");
        assert_eq!(amount(-0.001), "0.00");
    }

    #[test]
    fn test_currency_prefix() {
        assert_eq!(currency("KSH", 2500.0), "KSH 2,500.00");
        assert_eq!(currency("", 12.0), "12.00");
    }
}
