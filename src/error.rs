use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("Wallet is locked: wallet {wallet_id}")]
    WalletLocked { wallet_id: i64 },

    #[error("Insufficient balance: have {balance}, need {requested}")]
    InsufficientBalance { balance: Decimal, requested: Decimal },

    #[error("Wallet not found for user {user_id}")]
    WalletNotFound { user_id: i64 },

    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: i64 },

    #[error("Order cannot be cancelled in status {status}")]
    OrderNotCancellable { status: String },

    #[error("Order is in status {status}, which does not allow this operation")]
    InvalidOrderState { status: String },

    #[error("Duplicate transaction reference: {reference}")]
    DuplicateReference { reference: String },

    #[error("No user could be resolved from SMS identifiers")]
    UserNotResolved,

    #[error("No amount found in SMS text")]
    AmountNotFound,

    #[error("Exchange rate unavailable: {from} -> {to}")]
    RateUnavailable { from: String, to: String },

    #[error("No active fee configuration")]
    ConfigInconsistent,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Concurrent modification of order {order_id}, retries exhausted")]
    VersionConflict { order_id: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, SettlementError>;

/// Coarse classification used by the request layer to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request: the caller sent something invalid.
    Validation,
    /// The request was well-formed but the current state forbids it.
    Conflict,
    /// The addressed resource does not exist.
    NotFound,
    /// Infrastructure fault, retryable or operator-facing.
    Internal,
}

impl SettlementError {
    pub fn invalid_amount(amount: Decimal) -> Self {
        Self::InvalidAmount { amount }
    }

    pub fn rate_unavailable(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::RateUnavailable {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::InvalidAmount { .. } | SettlementError::EmptyCart => {
                ErrorKind::Validation
            }
            SettlementError::WalletLocked { .. }
            | SettlementError::InsufficientBalance { .. }
            | SettlementError::OrderNotCancellable { .. }
            | SettlementError::InvalidOrderState { .. }
            | SettlementError::DuplicateReference { .. }
            | SettlementError::VersionConflict { .. } => ErrorKind::Conflict,
            SettlementError::WalletNotFound { .. }
            | SettlementError::OrderNotFound { .. }
            | SettlementError::UserNotResolved => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }

    /// Infrastructure failures are worth retrying; business rule violations
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::Database(_)
                | SettlementError::Io(_)
                | SettlementError::RateUnavailable { .. }
                | SettlementError::VersionConflict { .. }
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SettlementError::Config(_) | SettlementError::Env(_) => ErrorSeverity::Critical,
            SettlementError::ConfigInconsistent => ErrorSeverity::Critical,
            SettlementError::Database(_) => ErrorSeverity::High,
            SettlementError::RateUnavailable { .. } => ErrorSeverity::High,
            SettlementError::VersionConflict { .. } => ErrorSeverity::Medium,
            SettlementError::Io(_) => ErrorSeverity::Medium,
            SettlementError::WalletNotFound { .. } | SettlementError::OrderNotFound { .. } => {
                ErrorSeverity::Medium
            }
            _ => ErrorSeverity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn business_errors_map_to_conflict() {
        let err = SettlementError::InsufficientBalance {
            balance: dec!(100),
            requested: dec!(150),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());
    }

    #[test]
    fn validation_errors_map_to_bad_request() {
        assert_eq!(
            SettlementError::invalid_amount(dec!(-5)).kind(),
            ErrorKind::Validation
        );
        assert_eq!(SettlementError::EmptyCart.kind(), ErrorKind::Validation);
    }

    #[test]
    fn missing_fee_config_is_critical() {
        let err = SettlementError::ConfigInconsistent;
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
