use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::database::models::{PaymentGateway, TransactionType, Wallet, WalletTransaction};
use crate::database::Database;
use crate::error::{Result, SettlementError};
use crate::utils::Logger;

/// Owns per-user balances and the append-only transaction log. Balances
/// move only through the primitives here; two concurrent operations on
/// the same wallet are serialized by a per-wallet lock, while operations
/// on distinct wallets proceed independently.
#[derive(Clone)]
pub struct WalletLedger {
    db: Database,
    wallet_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl WalletLedger {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            wallet_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_for(&self, wallet_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.wallet_locks.lock().await;
        locks
            .entry(wallet_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Credit a wallet. Fails on a non-positive amount or a locked
    /// wallet; otherwise the balance increment and the DEPOSIT row are
    /// committed atomically.
    pub async fn deposit(
        &self,
        user_id: i64,
        amount: Decimal,
        gateway: Option<PaymentGateway>,
        reference: Option<&str>,
        note: Option<&str>,
    ) -> Result<WalletTransaction> {
        self.mutate(
            user_id,
            TransactionType::Deposit,
            true,
            amount,
            None,
            reference,
            gateway,
            note,
        )
        .await
    }

    /// Debit a wallet. Adds the sufficient-funds check on top of the
    /// deposit rules.
    pub async fn withdraw(
        &self,
        user_id: i64,
        amount: Decimal,
        note: Option<&str>,
    ) -> Result<WalletTransaction> {
        self.mutate(
            user_id,
            TransactionType::Withdrawal,
            false,
            amount,
            None,
            None,
            None,
            note,
        )
        .await
    }

    /// Debit for an order payment (deposit or remaining leg).
    pub async fn debit_for_order(
        &self,
        user_id: i64,
        order_id: i64,
        amount: Decimal,
        note: Option<&str>,
    ) -> Result<WalletTransaction> {
        self.mutate(
            user_id,
            TransactionType::OrderPayment,
            false,
            amount,
            Some(order_id),
            None,
            None,
            note,
        )
        .await
    }

    /// Credit back a refund for a cancelled or adjusted order.
    pub async fn credit_refund(
        &self,
        user_id: i64,
        order_id: i64,
        amount: Decimal,
        note: Option<&str>,
    ) -> Result<WalletTransaction> {
        self.mutate(
            user_id,
            TransactionType::OrderRefund,
            true,
            amount,
            Some(order_id),
            None,
            None,
            note,
        )
        .await
    }

    /// Signed operator correction. Positive credits, negative debits;
    /// recorded as ADMIN_ADJUSTMENT either way.
    pub async fn admin_adjust(
        &self,
        user_id: i64,
        signed_amount: Decimal,
        note: &str,
    ) -> Result<WalletTransaction> {
        let credit = signed_amount > Decimal::ZERO;
        self.mutate(
            user_id,
            TransactionType::AdminAdjustment,
            credit,
            signed_amount.abs(),
            None,
            None,
            None,
            Some(note),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn mutate(
        &self,
        user_id: i64,
        tx_type: TransactionType,
        credit: bool,
        amount: Decimal,
        order_id: Option<i64>,
        reference: Option<&str>,
        gateway: Option<PaymentGateway>,
        note: Option<&str>,
    ) -> Result<WalletTransaction> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::invalid_amount(amount));
        }

        let wallet = self.db.get_or_create_wallet(user_id).await?;
        let wallet_id = wallet.id.expect("stored wallet has an id");

        let lock = self.lock_for(wallet_id).await;
        let _guard = lock.lock().await;
        debug!(
            "Applying {} of {} to wallet {} (user {})",
            tx_type.as_str(),
            amount,
            wallet_id,
            user_id
        );
        let tx = self
            .db
            .apply_wallet_transaction(
                wallet_id, tx_type, credit, amount, order_id, reference, gateway, note,
            )
            .await?;
        Logger::log_wallet_transaction(
            wallet_id,
            tx_type.as_str(),
            amount,
            tx.balance_before,
            tx.balance_after,
        );
        Ok(tx)
    }

    /// Locking blocks future deposits and withdrawals; it never reverses
    /// the balance already on the wallet.
    pub async fn lock(&self, user_id: i64) -> Result<()> {
        self.db.get_or_create_wallet(user_id).await?;
        self.db.set_wallet_locked(user_id, true).await?;
        info!("Locked wallet for user {}", user_id);
        Ok(())
    }

    pub async fn unlock(&self, user_id: i64) -> Result<()> {
        self.db.set_wallet_locked(user_id, false).await?;
        info!("Unlocked wallet for user {}", user_id);
        Ok(())
    }

    pub async fn wallet(&self, user_id: i64) -> Result<Wallet> {
        self.db.get_or_create_wallet(user_id).await
    }

    pub async fn balance(&self, user_id: i64) -> Result<Decimal> {
        Ok(self.db.get_or_create_wallet(user_id).await?.balance)
    }

    pub async fn transactions(&self, user_id: i64, limit: u32) -> Result<Vec<WalletTransaction>> {
        let wallet = self.db.get_or_create_wallet(user_id).await?;
        self.db
            .wallet_transactions(wallet.id.expect("stored wallet has an id"), limit)
            .await
    }
}
