// libs/billing-cell/src/services/numbering.rs
use std::sync::OnceLock;

use regex::Regex;

pub const INVOICE_NUMBER_PREFIX: &str = "INV-";
const MIN_DIGITS: usize = 6;

/// `INV-` followed by the sequence zero-padded to at least six digits.
pub fn format_invoice_number(sequence: u64) -> String {
    format!("{}{:0width$}", INVOICE_NUMBER_PREFIX, sequence, width = MIN_DIGITS)
}

pub fn parse_invoice_number(invoice_number: &str) -> Option<u64> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^INV-(\d{6,})$").ok())
        .as_ref()?;

    pattern
        .captures(invoice_number)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_number_is_padded() {
        assert_eq!(format_invoice_number(1), "INV-000001");
        assert_eq!(format_invoice_number(123_456), "INV-123456");
    }

    #[test]
    fn test_padding_grows_past_six_digits() {
        assert_eq!(format_invoice_number(1_000_000), "INV-1000000");
        assert_eq!(parse_invoice_number("INV-1000000"), Some(1_000_000));
    }

    #[test]
    fn test_parse_rejects_foreign_formats() {
        assert_eq!(parse_invoice_number("INV-000042"), Some(42));
        assert_eq!(parse_invoice_number("INV-42"), None);
        assert_eq!(parse_invoice_number("inv-000042"), None);
        assert_eq!(parse_invoice_number("INV-00004a"), None);
    }

    #[test]
    fn test_numbers_sort_in_sequence_order() {
        let mut numbers: Vec<String> = [10, 2, 999_999, 1].iter().map(|n| format_invoice_number(*n)).collect();
        numbers.sort();
        assert_eq!(numbers, vec!["INV-000001", "INV-000002", "INV-000010", "INV-999999"]);
    }
}
