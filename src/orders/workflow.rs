use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::FeeConfigCache;
use crate::currency::converter::round_to_unit;
use crate::currency::{Currency, CurrencyConverter};
use crate::database::models::{
    Order, OrderItem, OrderPayment, OrderPaymentStatus, OrderStatus, OrderStatusHistory,
    PaymentGateway, PaymentRecordStatus, PaymentType,
};
use crate::database::Database;
use crate::error::{Result, SettlementError};
use crate::fees::{AdditionalServices, FeeCalculationEngine, FeeLine};
use crate::utils::Logger;
use crate::wallet::WalletLedger;

/// How many times an optimistic order write is retried against freshly
/// read state before giving up.
const VERSION_RETRY_ATTEMPTS: u32 = 3;

/// Timestamp plus a process-wide sequence number, so checkouts landing
/// in the same millisecond still get distinct order numbers.
fn next_order_number() -> String {
    static ORDER_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = ORDER_SEQ.fetch_add(1, Ordering::Relaxed) % 1000;
    format!("GB{}{:03}", Utc::now().format("%y%m%d%H%M%S%3f"), seq)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_name: String,
    pub product_url: Option<String>,
    pub variant: Option<String>,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub quantity: u32,
}

/// Drives the settlement progression of an order:
/// PENDING_DEPOSIT -> DEPOSITED -> PENDING_REMAINING -> WALLET_PAID ->
/// FULLY_COMPLETED. Logistics status moves independently.
#[derive(Clone)]
pub struct OrderPaymentWorkflow {
    db: Database,
    ledger: WalletLedger,
    engine: FeeCalculationEngine,
    converter: CurrencyConverter,
    fee_config: FeeConfigCache,
    /// Serializes the settlement legs of one order: the completed-payment
    /// check, the wallet debit, and the status transition must not
    /// interleave between two payers of the same order.
    order_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl OrderPaymentWorkflow {
    pub fn new(
        db: Database,
        ledger: WalletLedger,
        engine: FeeCalculationEngine,
        converter: CurrencyConverter,
        fee_config: FeeConfigCache,
    ) -> Self {
        Self {
            db,
            ledger,
            engine,
            converter,
            fee_config,
            order_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_for(&self, order_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.order_locks.lock().await;
        locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create an order from a cart snapshot. Prices and variants are
    /// copied at this moment; later catalog changes never alter the
    /// placed order. The deposit fraction comes from the active fee
    /// config.
    pub async fn checkout(&self, user_id: i64, items: Vec<CheckoutItem>) -> Result<Order> {
        if items.is_empty() {
            return Err(SettlementError::EmptyCart);
        }
        for item in &items {
            if item.unit_price <= Decimal::ZERO || item.quantity == 0 {
                return Err(SettlementError::invalid_amount(item.unit_price));
            }
        }

        let config = self.fee_config.active().await?;

        let mut total = Decimal::ZERO;
        for item in &items {
            let line_total = item.unit_price * Decimal::from(item.quantity);
            let vnd = self
                .converter
                .convert_rounded(line_total, item.currency, Currency::Vnd)
                .await?;
            total += vnd;
        }

        let deposit_amount = round_to_unit(
            total * config.deposit_percent / Decimal::from(100),
            Currency::Vnd,
        );
        let remaining_amount = total - deposit_amount;

        let order_number = next_order_number();
        let order = Order {
            id: None,
            order_number,
            user_id,
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::PendingDeposit,
            total_amount: total,
            deposit_amount,
            remaining_amount,
            domestic_shipping: Decimal::ZERO,
            international_shipping: Decimal::ZERO,
            additional_services_fee: Decimal::ZERO,
            version: 0,
            created_at: None,
            updated_at: None,
        };

        let order_items: Vec<OrderItem> = items
            .into_iter()
            .map(|item| OrderItem {
                id: None,
                order_id: 0,
                product_name: item.product_name,
                product_url: item.product_url,
                variant: item.variant,
                unit_price: item.unit_price,
                currency: item.currency,
                quantity: item.quantity,
            })
            .collect();

        let created = self.db.insert_order(&order, &order_items).await?;
        let order_id = created.id.expect("stored order has an id");
        self.record_transition(order_id, "NEW", OrderPaymentStatus::PendingDeposit.as_str(), None, None)
            .await?;
        info!(
            "Checkout: order {} total {} (deposit {}, remaining {})",
            created.order_number, total, deposit_amount, remaining_amount
        );
        Ok(created)
    }

    /// Charge the upfront deposit to the wallet. On insufficient funds
    /// the order stays PENDING_DEPOSIT and a FAILED payment row records
    /// the attempt.
    pub async fn pay_deposit(&self, order_id: i64) -> Result<Order> {
        let lock = self.lock_for(order_id).await;
        let _guard = lock.lock().await;

        let order = self.load(order_id).await?;
        if order.payment_status != OrderPaymentStatus::PendingDeposit {
            return Err(SettlementError::InvalidOrderState {
                status: order.payment_status.as_str().to_string(),
            });
        }
        if self
            .db
            .completed_payment_exists(order_id, PaymentType::Deposit)
            .await?
        {
            return Err(SettlementError::DuplicateReference {
                reference: format!("deposit for order {order_id}"),
            });
        }

        let debit = self
            .ledger
            .debit_for_order(
                order.user_id,
                order_id,
                order.deposit_amount,
                Some(&format!("Deposit for order {}", order.order_number)),
            )
            .await;

        match debit {
            Ok(tx) => {
                self.db
                    .insert_order_payment(&OrderPayment {
                        id: None,
                        order_id,
                        payment_type: PaymentType::Deposit,
                        amount: order.deposit_amount,
                        status: PaymentRecordStatus::Completed,
                        payment_method: PaymentGateway::Wallet,
                        transaction_ref: tx.id.map(|id| id.to_string()),
                        created_at: None,
                    })
                    .await?;
                self.transition_payment_status(order_id, OrderPaymentStatus::Deposited, None)
                    .await
            }
            Err(err @ SettlementError::InsufficientBalance { .. }) => {
                self.db
                    .insert_order_payment(&OrderPayment {
                        id: None,
                        order_id,
                        payment_type: PaymentType::Deposit,
                        amount: order.deposit_amount,
                        status: PaymentRecordStatus::Failed,
                        payment_method: PaymentGateway::Wallet,
                        transaction_ref: None,
                        created_at: None,
                    })
                    .await?;
                warn!(
                    "Deposit for order {} failed: insufficient balance",
                    order.order_number
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Post-procurement fee update: actual shipping plus any requested
    /// additional services are added to the total, and the remaining
    /// amount becomes the new total minus the deposit already paid.
    /// Requires the deposit leg to be settled (DEPOSITED or a repeat
    /// while PENDING_REMAINING).
    #[allow(clippy::too_many_arguments)]
    pub async fn update_fees(
        &self,
        order_id: i64,
        domestic_shipping: Decimal,
        international_shipping: Decimal,
        weight_kg: Decimal,
        services: AdditionalServices,
        changed_by: Option<i64>,
    ) -> Result<Order> {
        if domestic_shipping < Decimal::ZERO || international_shipping < Decimal::ZERO {
            return Err(SettlementError::invalid_amount(domestic_shipping.min(international_shipping)));
        }

        let lock = self.lock_for(order_id).await;
        let _guard = lock.lock().await;

        for attempt in 1..=VERSION_RETRY_ATTEMPTS {
            let order = self.load(order_id).await?;
            // Fees can only be set between the two payment legs: the
            // deposit must already be charged, and a settled order must
            // never regress. PENDING_REMAINING stays allowed so a
            // corrected update replaces the previous one.
            if !matches!(
                order.payment_status,
                OrderPaymentStatus::Deposited | OrderPaymentStatus::PendingRemaining
            ) {
                return Err(SettlementError::InvalidOrderState {
                    status: order.payment_status.as_str().to_string(),
                });
            }
            let items = self.db.order_items(order_id).await?;
            let lines: Vec<FeeLine> = items
                .iter()
                .map(|item| FeeLine {
                    unit_price: item.unit_price,
                    currency: item.currency,
                    quantity: item.quantity,
                })
                .collect();
            let services_fee = self
                .engine
                .additional_services_fee(&lines, weight_kg, services)
                .await?;

            // The goods subtotal is the current total minus everything
            // previously added on top, so a repeated fee update never
            // double counts.
            let goods_total = order.total_amount
                - order.domestic_shipping
                - order.international_shipping
                - order.additional_services_fee;
            let new_total =
                goods_total + domestic_shipping + international_shipping + services_fee;

            let mut updated = order.clone();
            updated.total_amount = new_total;
            updated.domestic_shipping = domestic_shipping;
            updated.international_shipping = international_shipping;
            updated.additional_services_fee = services_fee;
            updated.remaining_amount = new_total - order.deposit_amount;
            updated.payment_status = OrderPaymentStatus::PendingRemaining;

            if self.db.update_order_versioned(&updated).await? {
                self.record_transition(
                    order_id,
                    order.payment_status.as_str(),
                    OrderPaymentStatus::PendingRemaining.as_str(),
                    Some(&format!(
                        "Fees updated: domestic {domestic_shipping}, international {international_shipping}, services {services_fee}"
                    )),
                    changed_by,
                )
                .await?;
                info!(
                    "Order {} fees updated, new total {}, remaining {}",
                    order.order_number, new_total, updated.remaining_amount
                );
                return self.load(order_id).await;
            }
            warn!(
                "Fee update for order {} lost a version race (attempt {}/{})",
                order_id, attempt, VERSION_RETRY_ATTEMPTS
            );
        }
        Err(SettlementError::VersionConflict { order_id })
    }

    /// Charge the remaining balance once fees are final.
    pub async fn pay_remaining(&self, order_id: i64) -> Result<Order> {
        let lock = self.lock_for(order_id).await;
        let _guard = lock.lock().await;

        let order = self.load(order_id).await?;
        if order.payment_status != OrderPaymentStatus::PendingRemaining {
            return Err(SettlementError::InvalidOrderState {
                status: order.payment_status.as_str().to_string(),
            });
        }
        if self
            .db
            .completed_payment_exists(order_id, PaymentType::Remaining)
            .await?
        {
            return Err(SettlementError::DuplicateReference {
                reference: format!("remaining for order {order_id}"),
            });
        }

        let tx = self
            .ledger
            .debit_for_order(
                order.user_id,
                order_id,
                order.remaining_amount,
                Some(&format!("Remaining payment for order {}", order.order_number)),
            )
            .await?;
        self.db
            .insert_order_payment(&OrderPayment {
                id: None,
                order_id,
                payment_type: PaymentType::Remaining,
                amount: order.remaining_amount,
                status: PaymentRecordStatus::Completed,
                payment_method: PaymentGateway::Wallet,
                transaction_ref: tx.id.map(|id| id.to_string()),
                created_at: None,
            })
            .await?;
        self.transition_payment_status(order_id, OrderPaymentStatus::WalletPaid, None)
            .await
    }

    /// Goods confirmed delivered; settlement is closed out.
    pub async fn complete(&self, order_id: i64) -> Result<Order> {
        let order = self.load(order_id).await?;
        if order.payment_status != OrderPaymentStatus::WalletPaid {
            return Err(SettlementError::InvalidOrderState {
                status: order.payment_status.as_str().to_string(),
            });
        }
        self.transition_payment_status(order_id, OrderPaymentStatus::FullyCompleted, None)
            .await
    }

    /// Cancellation is only possible while logistics is still PENDING;
    /// no funds have moved at that point so the ledger is untouched.
    pub async fn cancel(&self, order_id: i64, changed_by: Option<i64>) -> Result<Order> {
        for attempt in 1..=VERSION_RETRY_ATTEMPTS {
            let order = self.load(order_id).await?;
            if order.status != OrderStatus::Pending {
                return Err(SettlementError::OrderNotCancellable {
                    status: order.status.as_str().to_string(),
                });
            }
            let mut updated = order.clone();
            updated.status = OrderStatus::Cancelled;
            if self.db.update_order_versioned(&updated).await? {
                self.record_transition(
                    order_id,
                    order.status.as_str(),
                    OrderStatus::Cancelled.as_str(),
                    Some("Cancelled by request"),
                    changed_by,
                )
                .await?;
                Logger::log_order_transition(
                    &order.order_number,
                    order.status.as_str(),
                    OrderStatus::Cancelled.as_str(),
                );
                return self.load(order_id).await;
            }
            warn!(
                "Cancel for order {} lost a version race (attempt {}/{})",
                order_id, attempt, VERSION_RETRY_ATTEMPTS
            );
        }
        Err(SettlementError::VersionConflict { order_id })
    }

    /// Logistics progression (confirmed, shipping, delivered). Use
    /// `cancel` for cancellation so its guard always applies.
    pub async fn update_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        note: Option<&str>,
        changed_by: Option<i64>,
    ) -> Result<Order> {
        if new_status == OrderStatus::Cancelled {
            return self.cancel(order_id, changed_by).await;
        }
        for attempt in 1..=VERSION_RETRY_ATTEMPTS {
            let order = self.load(order_id).await?;
            if order.status == OrderStatus::Cancelled {
                return Err(SettlementError::InvalidOrderState {
                    status: order.status.as_str().to_string(),
                });
            }
            if order.status == new_status {
                return Ok(order);
            }
            let mut updated = order.clone();
            updated.status = new_status;
            if self.db.update_order_versioned(&updated).await? {
                self.record_transition(
                    order_id,
                    order.status.as_str(),
                    new_status.as_str(),
                    note,
                    changed_by,
                )
                .await?;
                Logger::log_order_transition(
                    &order.order_number,
                    order.status.as_str(),
                    new_status.as_str(),
                );
                return self.load(order_id).await;
            }
            warn!(
                "Status update for order {} lost a version race (attempt {}/{})",
                order_id, attempt, VERSION_RETRY_ATTEMPTS
            );
        }
        Err(SettlementError::VersionConflict { order_id })
    }

    pub async fn order(&self, order_id: i64) -> Result<Order> {
        self.load(order_id).await
    }

    pub async fn history(&self, order_id: i64) -> Result<Vec<OrderStatusHistory>> {
        self.db.status_history(order_id).await
    }

    async fn load(&self, order_id: i64) -> Result<Order> {
        self.db
            .find_order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound { order_id })
    }

    async fn transition_payment_status(
        &self,
        order_id: i64,
        new_status: OrderPaymentStatus,
        changed_by: Option<i64>,
    ) -> Result<Order> {
        for attempt in 1..=VERSION_RETRY_ATTEMPTS {
            let order = self.load(order_id).await?;
            let mut updated = order.clone();
            updated.payment_status = new_status;
            if self.db.update_order_versioned(&updated).await? {
                self.record_transition(
                    order_id,
                    order.payment_status.as_str(),
                    new_status.as_str(),
                    None,
                    changed_by,
                )
                .await?;
                Logger::log_order_transition(
                    &order.order_number,
                    order.payment_status.as_str(),
                    new_status.as_str(),
                );
                return self.load(order_id).await;
            }
            warn!(
                "Payment status update for order {} lost a version race (attempt {}/{})",
                order_id, attempt, VERSION_RETRY_ATTEMPTS
            );
        }
        Err(SettlementError::VersionConflict { order_id })
    }

    async fn record_transition(
        &self,
        order_id: i64,
        previous: &str,
        new: &str,
        note: Option<&str>,
        changed_by: Option<i64>,
    ) -> Result<()> {
        self.db
            .insert_status_history(&OrderStatusHistory {
                id: None,
                order_id,
                previous_status: previous.to_string(),
                new_status: new.to_string(),
                note: note.map(str::to_string),
                changed_by,
                created_at: None,
            })
            .await
    }
}
