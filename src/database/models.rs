use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::Currency;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Per-user prepaid wallet. Balance is only ever changed through the
/// ledger primitives; `locked` blocks future mutations without touching
/// the balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Option<i64>,
    pub user_id: i64,
    pub balance: Decimal,
    pub locked: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    OrderPayment,
    OrderRefund,
    AdminAdjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::OrderPayment => "ORDER_PAYMENT",
            Self::OrderRefund => "ORDER_REFUND",
            Self::AdminAdjustment => "ADMIN_ADJUSTMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPOSIT" => Some(Self::Deposit),
            "WITHDRAWAL" => Some(Self::Withdrawal),
            "ORDER_PAYMENT" => Some(Self::OrderPayment),
            "ORDER_REFUND" => Some(Self::OrderRefund),
            "ADMIN_ADJUSTMENT" => Some(Self::AdminAdjustment),
            _ => None,
        }
    }

    /// Whether this type credits the wallet (true) or debits it (false).
    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Deposit | Self::OrderRefund)
    }
}

/// Append-only ledger entry. `balance_after` always equals
/// `balance_before` plus or minus `amount` depending on the type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Option<i64>,
    pub wallet_id: i64,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub order_id: Option<i64>,
    pub reference_number: Option<String>,
    pub gateway: Option<PaymentGateway>,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentGateway {
    /// Paid straight from the prepaid wallet balance.
    Wallet,
    BankTransfer,
    Momo,
    ZaloPay,
    VnPay,
}

impl PaymentGateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "WALLET",
            Self::BankTransfer => "BANK_TRANSFER",
            Self::Momo => "MOMO",
            Self::ZaloPay => "ZALOPAY",
            Self::VnPay => "VNPAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WALLET" => Some(Self::Wallet),
            "BANK_TRANSFER" => Some(Self::BankTransfer),
            "MOMO" => Some(Self::Momo),
            "ZALOPAY" => Some(Self::ZaloPay),
            "VNPAY" => Some(Self::VnPay),
            _ => None,
        }
    }
}

/// Logistics status, independent of the settlement progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Shipping => "SHIPPING",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "SHIPPING" => Some(Self::Shipping),
            "DELIVERED" => Some(Self::Delivered),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Settlement progression: deposit up front, remaining after the real
/// shipping and service fees are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    PendingDeposit,
    Deposited,
    PendingRemaining,
    WalletPaid,
    FullyCompleted,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingDeposit => "PENDING_DEPOSIT",
            Self::Deposited => "DEPOSITED",
            Self::PendingRemaining => "PENDING_REMAINING",
            Self::WalletPaid => "WALLET_PAID",
            Self::FullyCompleted => "FULLY_COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING_DEPOSIT" => Some(Self::PendingDeposit),
            "DEPOSITED" => Some(Self::Deposited),
            "PENDING_REMAINING" => Some(Self::PendingRemaining),
            "WALLET_PAID" => Some(Self::WalletPaid),
            "FULLY_COMPLETED" => Some(Self::FullyCompleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<i64>,
    pub order_number: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    /// Total in the settlement currency (VND), including fees once known.
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub remaining_amount: Decimal,
    pub domestic_shipping: Decimal,
    pub international_shipping: Decimal,
    pub additional_services_fee: Decimal,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Price/variant snapshot taken at checkout. Later catalog changes never
/// affect a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Option<i64>,
    pub order_id: i64,
    pub product_name: String,
    pub product_url: Option<String>,
    pub variant: Option<String>,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Deposit,
    Remaining,
    Full,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Remaining => "REMAINING",
            Self::Full => "FULL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPOSIT" => Some(Self::Deposit),
            "REMAINING" => Some(Self::Remaining),
            "FULL" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRecordStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayment {
    pub id: Option<i64>,
    pub order_id: i64,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub status: PaymentRecordStatus,
    pub payment_method: PaymentGateway,
    pub transaction_ref: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Immutable audit row written for every order status transition.
/// `changed_by` is None when the system itself made the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: Option<i64>,
    pub order_id: i64,
    pub previous_status: String,
    pub new_status: String,
    pub note: Option<String>,
    pub changed_by: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemFeeConfig {
    pub id: Option<i64>,
    pub name: String,
    pub service_fee_percent: Decimal,
    pub domestic_shipping_rate: Decimal,
    pub international_shipping_rate: Decimal,
    pub vietnam_domestic_shipping_rate: Decimal,
    pub deposit_percent: Decimal,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Raw inbound bank SMS plus everything the reconciler extracted from it.
/// Rows are kept forever for audit; once `processed` is set the row is
/// never touched again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankSms {
    pub id: Option<i64>,
    pub sender: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub parsed_amount: Option<Decimal>,
    pub transaction_reference: Option<String>,
    pub extracted_username: Option<String>,
    pub extracted_user_id: Option<i64>,
    pub extracted_email: Option<String>,
    pub deposit_created: bool,
    pub wallet_transaction_id: Option<i64>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_round_trips() {
        for t in [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::OrderPayment,
            TransactionType::OrderRefund,
            TransactionType::AdminAdjustment,
        ] {
            assert_eq!(TransactionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TransactionType::parse("BOGUS"), None);
    }

    #[test]
    fn credit_and_debit_signs() {
        assert!(TransactionType::Deposit.is_credit());
        assert!(TransactionType::OrderRefund.is_credit());
        assert!(!TransactionType::Withdrawal.is_credit());
        assert!(!TransactionType::OrderPayment.is_credit());
        assert!(!TransactionType::AdminAdjustment.is_credit());
    }

    #[test]
    fn payment_status_parse() {
        assert_eq!(
            OrderPaymentStatus::parse("PENDING_REMAINING"),
            Some(OrderPaymentStatus::PendingRemaining)
        );
        assert_eq!(OrderPaymentStatus::parse("unknown"), None);
    }
}
