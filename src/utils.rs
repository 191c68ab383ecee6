use log::{error, info};
use rust_decimal::Decimal;

/// Logging helpers for lifecycle and money-movement events.
pub struct Logger;

impl Logger {
    pub fn log_operation_start(operation: &str, details: &str) {
        info!("🚀 Starting {}: {}", operation, details);
    }

    pub fn log_operation_success(operation: &str, details: &str) {
        info!("✅ {} completed successfully: {}", operation, details);
    }

    pub fn log_operation_failure(operation: &str, error: &str) {
        error!("❌ {} failed: {}", operation, error);
    }

    pub fn log_wallet_transaction(
        wallet_id: i64,
        transaction_type: &str,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
    ) {
        info!(
            "💰 Wallet Transaction: wallet={} | {} {} | {} → {}",
            wallet_id,
            transaction_type,
            Formatter::format_vnd(amount),
            Formatter::format_vnd(balance_before),
            Formatter::format_vnd(balance_after)
        );
    }

    pub fn log_order_transition(order_number: &str, from: &str, to: &str) {
        info!("📦 Order {}: {} → {}", order_number, from, to);
    }
}

/// Display formatting for monetary amounts.
pub struct Formatter;

impl Formatter {
    /// Format a VND amount with thousands separators, e.g. "1,234,000 VND".
    pub fn format_vnd(amount: Decimal) -> String {
        let rounded = amount.round();
        let raw = rounded.abs().to_string();
        let mut grouped = String::with_capacity(raw.len() + raw.len() / 3);
        for (i, c) in raw.chars().enumerate() {
            if i > 0 && (raw.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        if rounded.is_sign_negative() && !rounded.is_zero() {
            format!("-{} VND", grouped)
        } else {
            format!("{} VND", grouped)
        }
    }

}

/// Input validation helpers shared by the request layer.
pub struct Validator;

impl Validator {
    /// Positive and below the ceiling any plausible settlement reaches.
    pub fn is_valid_amount(amount: Decimal) -> bool {
        amount > Decimal::ZERO && amount <= Decimal::from(999_999_999_999i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_vnd() {
        assert_eq!(Formatter::format_vnd(dec!(1234000)), "1,234,000 VND");
        assert_eq!(Formatter::format_vnd(dec!(500)), "500 VND");
        assert_eq!(Formatter::format_vnd(dec!(0)), "0 VND");
        assert_eq!(Formatter::format_vnd(dec!(-50000)), "-50,000 VND");
    }

    #[test]
    fn test_valid_amount() {
        assert!(Validator::is_valid_amount(dec!(0.01)));
        assert!(!Validator::is_valid_amount(dec!(0)));
        assert!(!Validator::is_valid_amount(dec!(-100)));
        assert!(!Validator::is_valid_amount(dec!(10000000000000)));
    }
}
