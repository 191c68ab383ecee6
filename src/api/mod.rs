pub mod deposit;
pub mod validation;
pub mod webhook;

pub use deposit::DepositService;
pub use webhook::{SmsWebhookRequest, SmsWebhookResponse};
