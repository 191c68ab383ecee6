// Public module tree, exposed for integration tests
pub mod api;
pub mod config;
pub mod currency;
pub mod database;
pub mod error;
pub mod fees;
pub mod orders;
pub mod retry;
pub mod sms;
pub mod utils;
pub mod wallet;

// Re-export the commonly used types
pub use config::{FeeConfigCache, Settings};
pub use currency::{Currency, CurrencyConverter};
pub use database::{models, Database};
pub use error::{Result, SettlementError};
pub use fees::{AdditionalServices, FeeCalculationEngine};
pub use orders::OrderPaymentWorkflow;
pub use sms::BankSmsReconciler;
pub use wallet::WalletLedger;
