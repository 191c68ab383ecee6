use regex::Regex;
use std::sync::OnceLock;

/// All regexes used by the SMS extractors, compiled once. The extractor
/// functions in `extract` decide the order in which they are tried.
#[derive(Debug)]
pub struct SmsPatterns {
    /// "+500,000VND", "-1.200.000đ": signed, thousands separators,
    /// currency suffix.
    pub signed_grouped_amount: Regex,
    /// "+500k", "-1.5m": signed shorthand.
    pub signed_shorthand_amount: Regex,
    /// "500,000": unsigned comma-grouped amount.
    pub unsigned_grouped_amount: Regex,
    /// "500k": unsigned shorthand.
    pub unsigned_shorthand_amount: Regex,
    /// "amount=500000": minimal format used by test harnesses.
    pub test_amount: Regex,
    /// Bank-specific structured transfer codes (FT/TF/MB prefixed).
    pub bank_reference: Regex,
    /// Generic "GD 123456" / "GD:123456" marker.
    pub generic_reference: Regex,
    /// Deposit-keyword username code in the transfer note.
    pub username: Regex,
    /// "USER123" numeric user id.
    pub user_id: Regex,
    /// Embedded email address (legacy identifier).
    pub email: Regex,
}

impl SmsPatterns {
    pub fn new() -> Self {
        Self {
            signed_grouped_amount: Regex::new(
                r"([+-])\s*(\d{1,3}(?:[.,]\d{3})+)\s*(?:VND|vnd|đ|d)\b",
            )
            .unwrap(),
            signed_shorthand_amount: Regex::new(r"([+-])\s*(\d+(?:\.\d+)?)([kKmM])\b").unwrap(),
            unsigned_grouped_amount: Regex::new(r"\b(\d{1,3}(?:,\d{3})+)\b").unwrap(),
            unsigned_shorthand_amount: Regex::new(r"\b(\d+(?:\.\d+)?)([kKmM])\b").unwrap(),
            test_amount: Regex::new(r"amount=(\d+)\b").unwrap(),
            bank_reference: Regex::new(r"\b((?:FT|TF|MB)\d{8,})\b").unwrap(),
            generic_reference: Regex::new(r"GD[:.\s]*(\d{6,})\b").unwrap(),
            username: Regex::new(r"(?i)\b(?:NAP|NAPTIEN|NT)\s+([A-Za-z][A-Za-z0-9_]{3,19})\b")
                .unwrap(),
            user_id: Regex::new(r"\bUSER(\d+)\b").unwrap(),
            email: Regex::new(r"\b([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})\b").unwrap(),
        }
    }

    pub fn get_instance() -> &'static Self {
        static INSTANCE: OnceLock<SmsPatterns> = OnceLock::new();
        INSTANCE.get_or_init(SmsPatterns::new)
    }
}

impl Default for SmsPatterns {
    fn default() -> Self {
        Self::new()
    }
}
