//! Named extractor functions for the SMS reconciliation pipeline. Each
//! family (amount, reference, identity) is an explicit ordered list tried
//! from most to least specific, with early exit on the first match, so
//! the priority semantics are visible and testable in isolation.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::sms::patterns::SmsPatterns;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAmount {
    pub amount: Decimal,
    /// Byte span of the match in the source text, used to guard the
    /// generic reference marker against picking up the amount digits.
    pub span: (usize, usize),
    pub pattern: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedIdentity {
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub email: Option<String>,
}

impl ExtractedIdentity {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.user_id.is_none() && self.email.is_none()
    }
}

type AmountExtractor = fn(&str) -> Option<ExtractedAmount>;

/// Amount extractors, most specific first. The first match wins.
pub const AMOUNT_EXTRACTORS: &[(&str, AmountExtractor)] = &[
    ("signed_grouped_currency", extract_signed_grouped_amount),
    ("signed_shorthand", extract_signed_shorthand_amount),
    ("unsigned_grouped", extract_unsigned_grouped_amount),
    ("unsigned_shorthand", extract_unsigned_shorthand_amount),
    ("test_format", extract_test_amount),
];

pub fn extract_amount(text: &str) -> Option<ExtractedAmount> {
    for (name, extractor) in AMOUNT_EXTRACTORS {
        if let Some(found) = extractor(text) {
            debug!("Amount {} matched by extractor '{}'", found.amount, name);
            return Some(found);
        }
    }
    None
}

fn parse_grouped(digits: &str) -> Option<Decimal> {
    let cleaned: String = digits.chars().filter(|c| c.is_ascii_digit()).collect();
    Decimal::from_str(&cleaned).ok()
}

fn extract_signed_grouped_amount(text: &str) -> Option<ExtractedAmount> {
    let caps = SmsPatterns::get_instance()
        .signed_grouped_amount
        .captures(text)?;
    let whole = caps.get(0)?;
    let amount = parse_grouped(caps.get(2)?.as_str())?;
    Some(ExtractedAmount {
        amount,
        span: (whole.start(), whole.end()),
        pattern: "signed_grouped_currency",
    })
}

fn shorthand_multiplier(suffix: &str) -> Decimal {
    match suffix {
        "k" | "K" => dec!(1000),
        _ => dec!(1000000),
    }
}

fn extract_signed_shorthand_amount(text: &str) -> Option<ExtractedAmount> {
    let caps = SmsPatterns::get_instance()
        .signed_shorthand_amount
        .captures(text)?;
    let whole = caps.get(0)?;
    let base = Decimal::from_str(caps.get(2)?.as_str()).ok()?;
    let amount = base * shorthand_multiplier(caps.get(3)?.as_str());
    Some(ExtractedAmount {
        amount,
        span: (whole.start(), whole.end()),
        pattern: "signed_shorthand",
    })
}

fn extract_unsigned_grouped_amount(text: &str) -> Option<ExtractedAmount> {
    let caps = SmsPatterns::get_instance()
        .unsigned_grouped_amount
        .captures(text)?;
    let whole = caps.get(0)?;
    let amount = parse_grouped(caps.get(1)?.as_str())?;
    Some(ExtractedAmount {
        amount,
        span: (whole.start(), whole.end()),
        pattern: "unsigned_grouped",
    })
}

fn extract_unsigned_shorthand_amount(text: &str) -> Option<ExtractedAmount> {
    let caps = SmsPatterns::get_instance()
        .unsigned_shorthand_amount
        .captures(text)?;
    let whole = caps.get(0)?;
    let base = Decimal::from_str(caps.get(1)?.as_str()).ok()?;
    let amount = base * shorthand_multiplier(caps.get(2)?.as_str());
    Some(ExtractedAmount {
        amount,
        span: (whole.start(), whole.end()),
        pattern: "unsigned_shorthand",
    })
}

fn extract_test_amount(text: &str) -> Option<ExtractedAmount> {
    let caps = SmsPatterns::get_instance().test_amount.captures(text)?;
    let whole = caps.get(0)?;
    let amount = Decimal::from_str(caps.get(1)?.as_str()).ok()?;
    Some(ExtractedAmount {
        amount,
        span: (whole.start(), whole.end()),
        pattern: "test_format",
    })
}

/// Prefix for references synthesized from the receipt time when the SMS
/// carries none. Synthesized references never take part in dedup.
pub const SYNTHESIZED_PREFIX: &str = "AUTO-";

pub fn is_synthesized_reference(reference: &str) -> bool {
    reference.starts_with(SYNTHESIZED_PREFIX)
}

/// Bank-structured code first, then the generic "GD" marker. A generic
/// candidate overlapping the amount match is discarded so "GD +500,000"
/// never turns the amount digits into a reference.
pub fn extract_reference(text: &str, amount_span: Option<(usize, usize)>) -> Option<String> {
    let patterns = SmsPatterns::get_instance();
    if let Some(caps) = patterns.bank_reference.captures(text) {
        return Some(caps.get(1)?.as_str().to_string());
    }
    for caps in patterns.generic_reference.captures_iter(text) {
        let candidate = caps.get(1)?;
        let overlaps = amount_span
            .map(|(start, end)| candidate.start() < end && candidate.end() > start)
            .unwrap_or(false);
        if !overlaps {
            return Some(candidate.as_str().to_string());
        }
    }
    None
}

pub fn synthesize_reference(received_at: DateTime<Utc>, sms_id: i64) -> String {
    format!(
        "{}{}-{}",
        SYNTHESIZED_PREFIX,
        received_at.timestamp_micros(),
        sms_id
    )
}

/// Identity extractors in priority order: username code in the transfer
/// note, then the `USER123` id pattern, then an embedded email address
/// (legacy; emails contain characters unsafe for bank note fields).
pub fn extract_identity(text: &str) -> ExtractedIdentity {
    ExtractedIdentity {
        username: extract_username(text),
        user_id: extract_user_id(text),
        email: extract_email(text),
    }
}

pub fn extract_username(text: &str) -> Option<String> {
    SmsPatterns::get_instance()
        .username
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_user_id(text: &str) -> Option<i64> {
    SmsPatterns::get_instance()
        .user_id
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

pub fn extract_email(text: &str) -> Option<String> {
    SmsPatterns::get_instance()
        .email
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_grouped_amount_with_currency() {
        let found = extract_amount("TK 0123 +500,000VND GD 123456 USER123").unwrap();
        assert_eq!(found.amount, dec!(500000));
        assert_eq!(found.pattern, "signed_grouped_currency");
    }

    #[test]
    fn dot_separated_amount_with_dong_suffix() {
        let found = extract_amount("So du -1.200.000d luc 10:00").unwrap();
        assert_eq!(found.amount, dec!(1200000));
        assert_eq!(found.pattern, "signed_grouped_currency");
    }

    #[test]
    fn signed_shorthand_beats_unsigned_patterns() {
        let found = extract_amount("Ban vua nhan +500k tu 0123456").unwrap();
        assert_eq!(found.amount, dec!(500000));
        assert_eq!(found.pattern, "signed_shorthand");
    }

    #[test]
    fn millions_shorthand() {
        let found = extract_amount("+1.5m chuyen khoan").unwrap();
        assert_eq!(found.amount, dec!(1500000));
    }

    #[test]
    fn unsigned_grouped_amount() {
        let found = extract_amount("So tien 2,345,000 da duoc ghi nhan").unwrap();
        assert_eq!(found.amount, dec!(2345000));
        assert_eq!(found.pattern, "unsigned_grouped");
    }

    #[test]
    fn test_format_is_last_resort() {
        let found = extract_amount("amount=750000").unwrap();
        assert_eq!(found.amount, dec!(750000));
        assert_eq!(found.pattern, "test_format");
    }

    #[test]
    fn no_amount_found() {
        assert!(extract_amount("Chao mung quy khach").is_none());
    }

    #[test]
    fn bank_reference_preferred() {
        let reference = extract_reference("GD 999999 ma FT2024123456 +500k", None).unwrap();
        assert_eq!(reference, "FT2024123456");
    }

    #[test]
    fn generic_reference_skips_amount_overlap() {
        // The only GD candidate here is the leading digits of the
        // amount itself; the span guard must reject it.
        let text = "GD 123456.5k nap tien USER9";
        let amount = extract_amount(text).unwrap();
        assert_eq!(amount.amount, dec!(123456500));
        assert_eq!(extract_reference(text, Some(amount.span)), None);
    }

    #[test]
    fn generic_reference_found_when_disjoint() {
        let text = "+500,000VND GD 654321 USER77";
        let amount = extract_amount(text).unwrap();
        assert_eq!(
            extract_reference(text, Some(amount.span)).unwrap(),
            "654321"
        );
    }

    #[test]
    fn synthesized_references_are_flagged() {
        let reference = synthesize_reference(Utc::now(), 42);
        assert!(is_synthesized_reference(&reference));
        assert!(!is_synthesized_reference("FT2024123456"));
    }

    #[test]
    fn identity_priority_fields() {
        let identity = extract_identity("NAP khach01 USER123 a@b.com");
        assert_eq!(identity.username.as_deref(), Some("khach01"));
        assert_eq!(identity.user_id, Some(123));
        assert_eq!(identity.email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn user_id_pattern_without_username() {
        let identity = extract_identity("+500,000VND thanh toan USER123");
        assert_eq!(identity.username, None);
        assert_eq!(identity.user_id, Some(123));
    }

    #[test]
    fn empty_identity_when_nothing_matches() {
        assert!(extract_identity("khong co dinh danh").is_empty());
    }
}
