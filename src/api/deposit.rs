use chrono::Utc;
use log::info;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::database::models::{PaymentGateway, WalletTransaction};
use crate::database::Database;
use crate::error::{Result, SettlementError};
use crate::wallet::WalletLedger;

/// Gateway-initiated wallet deposits: hand the user a redirect URL with
/// an opaque transaction code, then finalize when the gateway calls
/// back. Gateway calls themselves are stubbed; only the money movement
/// is real.
#[derive(Clone)]
pub struct DepositService {
    db: Database,
    ledger: WalletLedger,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositInitiation {
    pub redirect_url: String,
    pub transaction_code: String,
    pub gateway: PaymentGateway,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositCallback {
    pub amount: Decimal,
    pub gateway: PaymentGateway,
    pub reference_number: String,
}

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^DEP(\d+)T\d+$").unwrap())
}

impl DepositService {
    pub fn new(db: Database, ledger: WalletLedger) -> Self {
        Self { db, ledger }
    }

    /// Start a gateway deposit. The transaction code encodes the user so
    /// the callback can be attributed without extra state.
    pub fn initiate(
        &self,
        user_id: i64,
        amount: Decimal,
        gateway: PaymentGateway,
    ) -> Result<DepositInitiation> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::invalid_amount(amount));
        }
        let transaction_code = format!("DEP{}T{}", user_id, Utc::now().timestamp_millis());
        let redirect_url = match gateway {
            PaymentGateway::Momo => {
                format!("https://payment.momo.vn/pay?ref={transaction_code}&amount={amount}")
            }
            PaymentGateway::ZaloPay => {
                format!("https://sb-openapi.zalopay.vn/order?ref={transaction_code}&amount={amount}")
            }
            PaymentGateway::VnPay => {
                format!("https://pay.vnpay.vn/checkout?ref={transaction_code}&amount={amount}")
            }
            // Bank transfers carry the code in the transfer note and
            // settle through SMS reconciliation.
            PaymentGateway::BankTransfer | PaymentGateway::Wallet => {
                format!("/deposit/instructions?ref={transaction_code}")
            }
        };
        info!(
            "Deposit initiated for user {} via {}: {}",
            user_id,
            gateway.as_str(),
            transaction_code
        );
        Ok(DepositInitiation {
            redirect_url,
            transaction_code,
            gateway,
        })
    }

    /// Finalize a gateway-confirmed deposit. Idempotent on the reference
    /// number: a replayed callback returns the original transaction
    /// instead of crediting twice.
    pub async fn callback(&self, request: DepositCallback) -> Result<WalletTransaction> {
        if request.amount <= Decimal::ZERO {
            return Err(SettlementError::invalid_amount(request.amount));
        }
        if let Some(existing) = self
            .db
            .find_transaction_by_reference(&request.reference_number)
            .await?
        {
            info!(
                "Deposit callback replay for reference {}, returning original transaction",
                request.reference_number
            );
            return Ok(existing);
        }

        let user_id = code_pattern()
            .captures(&request.reference_number)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .ok_or(SettlementError::UserNotResolved)?;

        self.ledger
            .deposit(
                user_id,
                request.amount,
                Some(request.gateway),
                Some(&request.reference_number),
                Some("Gateway deposit"),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_code_embeds_user() {
        let caps = code_pattern().captures("DEP42T1717000000000").unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "42");
        assert!(code_pattern().captures("FT2024123456").is_none());
    }
}
