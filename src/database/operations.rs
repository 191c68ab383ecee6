use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::database::models::{
    BankSms, Order, OrderItem, OrderPayment, OrderPaymentStatus, OrderStatus, OrderStatusHistory,
    PaymentGateway, PaymentRecordStatus, PaymentType, SystemFeeConfig, TransactionType, User,
    Wallet, WalletTransaction,
};
use crate::error::{Result, SettlementError};

/// SQLite-backed store. All access goes through one connection behind an
/// async mutex, so every coarse operation below is serialized and each
/// multi-statement method runs inside a single SQL transaction.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn read_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_decimal_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        Some(t) => Decimal::from_str(&t)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn enum_error(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown enum value: {value}").into(),
    )
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS wallets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                balance TEXT NOT NULL DEFAULT '0',
                locked INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS wallet_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_id INTEGER NOT NULL,
                tx_type TEXT NOT NULL,
                amount TEXT NOT NULL,
                balance_before TEXT NOT NULL,
                balance_after TEXT NOT NULL,
                order_id INTEGER,
                reference_number TEXT,
                gateway TEXT,
                note TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (wallet_id) REFERENCES wallets(id)
            );

            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_number TEXT NOT NULL UNIQUE,
                user_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                payment_status TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                deposit_amount TEXT NOT NULL,
                remaining_amount TEXT NOT NULL,
                domestic_shipping TEXT NOT NULL DEFAULT '0',
                international_shipping TEXT NOT NULL DEFAULT '0',
                additional_services_fee TEXT NOT NULL DEFAULT '0',
                version INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                product_name TEXT NOT NULL,
                product_url TEXT,
                variant TEXT,
                unit_price TEXT NOT NULL,
                currency TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            );

            CREATE TABLE IF NOT EXISTS order_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                payment_type TEXT NOT NULL,
                amount TEXT NOT NULL,
                status TEXT NOT NULL,
                payment_method TEXT NOT NULL,
                transaction_ref TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            );

            CREATE TABLE IF NOT EXISTS order_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                previous_status TEXT NOT NULL,
                new_status TEXT NOT NULL,
                note TEXT,
                changed_by INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            );

            CREATE TABLE IF NOT EXISTS fee_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                service_fee_percent TEXT NOT NULL,
                domestic_shipping_rate TEXT NOT NULL,
                international_shipping_rate TEXT NOT NULL,
                vietnam_domestic_shipping_rate TEXT NOT NULL,
                deposit_percent TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS bank_sms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender TEXT NOT NULL,
                message TEXT NOT NULL,
                received_at DATETIME NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                parsed_amount TEXT,
                transaction_reference TEXT,
                extracted_username TEXT,
                extracted_user_id INTEGER,
                extracted_email TEXT,
                deposit_created INTEGER NOT NULL DEFAULT 0,
                wallet_transaction_id INTEGER,
                error_message TEXT,
                FOREIGN KEY (wallet_transaction_id) REFERENCES wallet_transactions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_wallet_tx_wallet ON wallet_transactions(wallet_id);
            CREATE INDEX IF NOT EXISTS idx_sms_reference ON bank_sms(transaction_reference);
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);",
        )?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    // ---- users ----

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<User> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (username, email, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, email, display_name, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created user {} with id {}", username, id);
        Ok(User {
            id: Some(id),
            username: username.to_string(),
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
            created_at: Some(now),
        })
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        Self::query_user(&conn, "username = ?1", params![username])
    }

    pub async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        Self::query_user(&conn, "id = ?1", params![user_id])
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        Self::query_user(&conn, "email = ?1", params![email])
    }

    fn query_user(
        conn: &Connection,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> Result<Option<User>> {
        let sql = format!(
            "SELECT id, username, email, display_name, created_at FROM users WHERE {filter}"
        );
        let user = conn
            .query_row(&sql, args, |row| {
                Ok(User {
                    id: Some(row.get(0)?),
                    username: row.get(1)?,
                    email: row.get(2)?,
                    display_name: row.get(3)?,
                    created_at: row.get(4).ok(),
                })
            })
            .optional()?;
        Ok(user)
    }

    // ---- wallets ----

    /// Wallets are created lazily on first access for a user.
    pub async fn get_or_create_wallet(&self, user_id: i64) -> Result<Wallet> {
        let conn = self.conn.lock().await;
        if let Some(wallet) = Self::query_wallet(&conn, user_id)? {
            return Ok(wallet);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO wallets (user_id, balance, locked, created_at, updated_at)
             VALUES (?1, '0', 0, ?2, ?3)",
            params![user_id, now, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created wallet {} for user {}", id, user_id);
        Ok(Wallet {
            id: Some(id),
            user_id,
            balance: Decimal::ZERO,
            locked: false,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    pub async fn find_wallet(&self, user_id: i64) -> Result<Option<Wallet>> {
        let conn = self.conn.lock().await;
        Self::query_wallet(&conn, user_id)
    }

    fn query_wallet(conn: &Connection, user_id: i64) -> Result<Option<Wallet>> {
        let wallet = conn
            .query_row(
                "SELECT id, user_id, balance, locked, created_at, updated_at
                 FROM wallets WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Wallet {
                        id: Some(row.get(0)?),
                        user_id: row.get(1)?,
                        balance: read_decimal(row, 2)?,
                        locked: row.get(3)?,
                        created_at: row.get(4).ok(),
                        updated_at: row.get(5).ok(),
                    })
                },
            )
            .optional()?;
        Ok(wallet)
    }

    pub async fn set_wallet_locked(&self, user_id: i64, locked: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE wallets SET locked = ?1, updated_at = ?2 WHERE user_id = ?3",
            params![locked, Utc::now(), user_id],
        )?;
        if changed == 0 {
            return Err(SettlementError::WalletNotFound { user_id });
        }
        info!("Wallet for user {} locked={}", user_id, locked);
        Ok(())
    }

    /// Atomic read-modify-write of a wallet balance plus the appended
    /// ledger row. Runs inside one SQL transaction; the business checks
    /// (lock flag, sufficient funds) are re-evaluated on the freshly read
    /// row so two racing callers cannot both pass them.
    pub async fn apply_wallet_transaction(
        &self,
        wallet_id: i64,
        tx_type: TransactionType,
        credit: bool,
        amount: Decimal,
        order_id: Option<i64>,
        reference_number: Option<&str>,
        gateway: Option<PaymentGateway>,
        note: Option<&str>,
    ) -> Result<WalletTransaction> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let (balance_text, locked): (String, bool) = tx.query_row(
            "SELECT balance, locked FROM wallets WHERE id = ?1",
            params![wallet_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let balance_before = Decimal::from_str(&balance_text)
            .map_err(|e| SettlementError::Config(anyhow::anyhow!("corrupt balance: {e}")))?;

        if locked {
            return Err(SettlementError::WalletLocked { wallet_id });
        }
        if !credit && balance_before < amount {
            return Err(SettlementError::InsufficientBalance {
                balance: balance_before,
                requested: amount,
            });
        }

        let balance_after = if credit {
            balance_before + amount
        } else {
            balance_before - amount
        };

        let now = Utc::now();
        tx.execute(
            "UPDATE wallets SET balance = ?1, updated_at = ?2 WHERE id = ?3",
            params![balance_after.to_string(), now, wallet_id],
        )?;
        tx.execute(
            "INSERT INTO wallet_transactions
             (wallet_id, tx_type, amount, balance_before, balance_after,
              order_id, reference_number, gateway, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                wallet_id,
                tx_type.as_str(),
                amount.to_string(),
                balance_before.to_string(),
                balance_after.to_string(),
                order_id,
                reference_number,
                gateway.map(|g| g.as_str()),
                note,
                now
            ],
        )?;
        let tx_id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(WalletTransaction {
            id: Some(tx_id),
            wallet_id,
            tx_type,
            amount,
            balance_before,
            balance_after,
            order_id,
            reference_number: reference_number.map(str::to_string),
            gateway,
            note: note.map(str::to_string),
            created_at: Some(now),
        })
    }

    pub async fn wallet_transactions(
        &self,
        wallet_id: i64,
        limit: u32,
    ) -> Result<Vec<WalletTransaction>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, wallet_id, tx_type, amount, balance_before, balance_after,
                    order_id, reference_number, gateway, note, created_at
             FROM wallet_transactions WHERE wallet_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![wallet_id, limit], Self::map_wallet_transaction)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<WalletTransaction>> {
        let conn = self.conn.lock().await;
        let tx = conn
            .query_row(
                "SELECT id, wallet_id, tx_type, amount, balance_before, balance_after,
                        order_id, reference_number, gateway, note, created_at
                 FROM wallet_transactions WHERE reference_number = ?1",
                params![reference],
                Self::map_wallet_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    fn map_wallet_transaction(row: &Row<'_>) -> rusqlite::Result<WalletTransaction> {
        let tx_type_text: String = row.get(2)?;
        let tx_type =
            TransactionType::parse(&tx_type_text).ok_or_else(|| enum_error(2, &tx_type_text))?;
        let gateway_text: Option<String> = row.get(8)?;
        let gateway = match gateway_text {
            Some(g) => Some(PaymentGateway::parse(&g).ok_or_else(|| enum_error(8, &g))?),
            None => None,
        };
        Ok(WalletTransaction {
            id: Some(row.get(0)?),
            wallet_id: row.get(1)?,
            tx_type,
            amount: read_decimal(row, 3)?,
            balance_before: read_decimal(row, 4)?,
            balance_after: read_decimal(row, 5)?,
            order_id: row.get(6)?,
            reference_number: row.get(7)?,
            gateway,
            note: row.get(9)?,
            created_at: row.get(10).ok(),
        })
    }

    // ---- orders ----

    pub async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<Order> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = Utc::now();
        tx.execute(
            "INSERT INTO orders
             (order_number, user_id, status, payment_status, total_amount, deposit_amount,
              remaining_amount, domestic_shipping, international_shipping,
              additional_services_fee, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12)",
            params![
                order.order_number,
                order.user_id,
                order.status.as_str(),
                order.payment_status.as_str(),
                order.total_amount.to_string(),
                order.deposit_amount.to_string(),
                order.remaining_amount.to_string(),
                order.domestic_shipping.to_string(),
                order.international_shipping.to_string(),
                order.additional_services_fee.to_string(),
                now,
                now
            ],
        )?;
        let order_id = tx.last_insert_rowid();

        for item in items {
            tx.execute(
                "INSERT INTO order_items
                 (order_id, product_name, product_url, variant, unit_price, currency, quantity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    order_id,
                    item.product_name,
                    item.product_url,
                    item.variant,
                    item.unit_price.to_string(),
                    item.currency.code(),
                    item.quantity
                ],
            )?;
        }
        tx.commit()?;

        let mut created = order.clone();
        created.id = Some(order_id);
        created.version = 0;
        created.created_at = Some(now);
        created.updated_at = Some(now);
        info!("Created order {} ({})", order.order_number, order_id);
        Ok(created)
    }

    pub async fn find_order(&self, order_id: i64) -> Result<Option<Order>> {
        let conn = self.conn.lock().await;
        let order = conn
            .query_row(
                "SELECT id, order_number, user_id, status, payment_status, total_amount,
                        deposit_amount, remaining_amount, domestic_shipping,
                        international_shipping, additional_services_fee, version,
                        created_at, updated_at
                 FROM orders WHERE id = ?1",
                params![order_id],
                Self::map_order,
            )
            .optional()?;
        Ok(order)
    }

    fn map_order(row: &Row<'_>) -> rusqlite::Result<Order> {
        let status_text: String = row.get(3)?;
        let status = OrderStatus::parse(&status_text).ok_or_else(|| enum_error(3, &status_text))?;
        let pay_text: String = row.get(4)?;
        let payment_status =
            OrderPaymentStatus::parse(&pay_text).ok_or_else(|| enum_error(4, &pay_text))?;
        Ok(Order {
            id: Some(row.get(0)?),
            order_number: row.get(1)?,
            user_id: row.get(2)?,
            status,
            payment_status,
            total_amount: read_decimal(row, 5)?,
            deposit_amount: read_decimal(row, 6)?,
            remaining_amount: read_decimal(row, 7)?,
            domestic_shipping: read_decimal(row, 8)?,
            international_shipping: read_decimal(row, 9)?,
            additional_services_fee: read_decimal(row, 10)?,
            version: row.get(11)?,
            created_at: row.get(12).ok(),
            updated_at: row.get(13).ok(),
        })
    }

    pub async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, order_id, product_name, product_url, variant, unit_price, currency, quantity
             FROM order_items WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order_id], |row| {
            let currency_text: String = row.get(6)?;
            let currency = crate::currency::Currency::parse(&currency_text)
                .ok_or_else(|| enum_error(6, &currency_text))?;
            Ok(OrderItem {
                id: Some(row.get(0)?),
                order_id: row.get(1)?,
                product_name: row.get(2)?,
                product_url: row.get(3)?,
                variant: row.get(4)?,
                unit_price: read_decimal(row, 5)?,
                currency,
                quantity: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Optimistic write: persists the order's mutable fields only if the
    /// stored version still matches `order.version`, bumping the version.
    /// Returns false when another writer got there first.
    pub async fn update_order_versioned(&self, order: &Order) -> Result<bool> {
        let order_id = order.id.ok_or(SettlementError::OrderNotFound { order_id: 0 })?;
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE orders SET
                status = ?1, payment_status = ?2, total_amount = ?3, deposit_amount = ?4,
                remaining_amount = ?5, domestic_shipping = ?6, international_shipping = ?7,
                additional_services_fee = ?8, version = version + 1, updated_at = ?9
             WHERE id = ?10 AND version = ?11",
            params![
                order.status.as_str(),
                order.payment_status.as_str(),
                order.total_amount.to_string(),
                order.deposit_amount.to_string(),
                order.remaining_amount.to_string(),
                order.domestic_shipping.to_string(),
                order.international_shipping.to_string(),
                order.additional_services_fee.to_string(),
                Utc::now(),
                order_id,
                order.version
            ],
        )?;
        Ok(changed == 1)
    }

    pub async fn insert_order_payment(&self, payment: &OrderPayment) -> Result<OrderPayment> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO order_payments
             (order_id, payment_type, amount, status, payment_method, transaction_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                payment.order_id,
                payment.payment_type.as_str(),
                payment.amount.to_string(),
                payment.status.as_str(),
                payment.payment_method.as_str(),
                payment.transaction_ref,
                now
            ],
        )?;
        let mut created = payment.clone();
        created.id = Some(conn.last_insert_rowid());
        created.created_at = Some(now);
        Ok(created)
    }

    pub async fn order_payments(&self, order_id: i64) -> Result<Vec<OrderPayment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, order_id, payment_type, amount, status, payment_method,
                    transaction_ref, created_at
             FROM order_payments WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order_id], |row| {
            let type_text: String = row.get(2)?;
            let payment_type =
                PaymentType::parse(&type_text).ok_or_else(|| enum_error(2, &type_text))?;
            let status_text: String = row.get(4)?;
            let status = PaymentRecordStatus::parse(&status_text)
                .ok_or_else(|| enum_error(4, &status_text))?;
            let method_text: String = row.get(5)?;
            let payment_method =
                PaymentGateway::parse(&method_text).ok_or_else(|| enum_error(5, &method_text))?;
            Ok(OrderPayment {
                id: Some(row.get(0)?),
                order_id: row.get(1)?,
                payment_type,
                amount: read_decimal(row, 3)?,
                status,
                payment_method,
                transaction_ref: row.get(6)?,
                created_at: row.get(7).ok(),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub async fn completed_payment_exists(
        &self,
        order_id: i64,
        payment_type: PaymentType,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM order_payments
             WHERE order_id = ?1 AND payment_type = ?2 AND status = ?3",
            params![
                order_id,
                payment_type.as_str(),
                PaymentRecordStatus::Completed.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub async fn insert_status_history(&self, entry: &OrderStatusHistory) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO order_status_history
             (order_id, previous_status, new_status, note, changed_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.order_id,
                entry.previous_status,
                entry.new_status,
                entry.note,
                entry.changed_by,
                Utc::now()
            ],
        )?;
        Ok(())
    }

    pub async fn status_history(&self, order_id: i64) -> Result<Vec<OrderStatusHistory>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, order_id, previous_status, new_status, note, changed_by, created_at
             FROM order_status_history WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order_id], |row| {
            Ok(OrderStatusHistory {
                id: Some(row.get(0)?),
                order_id: row.get(1)?,
                previous_status: row.get(2)?,
                new_status: row.get(3)?,
                note: row.get(4)?,
                changed_by: row.get(5)?,
                created_at: row.get(6).ok(),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ---- fee configs ----

    pub async fn insert_fee_config(&self, config: &SystemFeeConfig) -> Result<SystemFeeConfig> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = Utc::now();
        if config.is_active {
            tx.execute("UPDATE fee_configs SET is_active = 0", [])?;
        }
        tx.execute(
            "INSERT INTO fee_configs
             (name, service_fee_percent, domestic_shipping_rate, international_shipping_rate,
              vietnam_domestic_shipping_rate, deposit_percent, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                config.name,
                config.service_fee_percent.to_string(),
                config.domestic_shipping_rate.to_string(),
                config.international_shipping_rate.to_string(),
                config.vietnam_domestic_shipping_rate.to_string(),
                config.deposit_percent.to_string(),
                config.is_active,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let mut created = config.clone();
        created.id = Some(id);
        created.created_at = Some(now);
        info!("Inserted fee config '{}' (active={})", config.name, config.is_active);
        Ok(created)
    }

    /// Activating one config deactivates every other, in one transaction,
    /// so exactly one row is ever active.
    pub async fn activate_fee_config(&self, config_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("UPDATE fee_configs SET is_active = 0", [])?;
        let changed = tx.execute(
            "UPDATE fee_configs SET is_active = 1 WHERE id = ?1",
            params![config_id],
        )?;
        if changed == 0 {
            return Err(SettlementError::ConfigInconsistent);
        }
        tx.commit()?;
        info!("Activated fee config {}", config_id);
        Ok(())
    }

    pub async fn active_fee_config(&self) -> Result<Option<SystemFeeConfig>> {
        let conn = self.conn.lock().await;
        let config = conn
            .query_row(
                "SELECT id, name, service_fee_percent, domestic_shipping_rate,
                        international_shipping_rate, vietnam_domestic_shipping_rate,
                        deposit_percent, is_active, created_at
                 FROM fee_configs WHERE is_active = 1",
                [],
                |row| {
                    Ok(SystemFeeConfig {
                        id: Some(row.get(0)?),
                        name: row.get(1)?,
                        service_fee_percent: read_decimal(row, 2)?,
                        domestic_shipping_rate: read_decimal(row, 3)?,
                        international_shipping_rate: read_decimal(row, 4)?,
                        vietnam_domestic_shipping_rate: read_decimal(row, 5)?,
                        deposit_percent: read_decimal(row, 6)?,
                        is_active: row.get(7)?,
                        created_at: row.get(8).ok(),
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    // ---- bank sms ----

    pub async fn insert_sms(&self, sender: &str, message: &str) -> Result<BankSms> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO bank_sms (sender, message, received_at, processed, deposit_created)
             VALUES (?1, ?2, ?3, 0, 0)",
            params![sender, message, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Stored inbound SMS {} from {}", id, sender);
        Ok(BankSms {
            id: Some(id),
            sender: sender.to_string(),
            message: message.to_string(),
            received_at: now,
            processed: false,
            parsed_amount: None,
            transaction_reference: None,
            extracted_username: None,
            extracted_user_id: None,
            extracted_email: None,
            deposit_created: false,
            wallet_transaction_id: None,
            error_message: None,
        })
    }

    pub async fn find_sms(&self, sms_id: i64) -> Result<Option<BankSms>> {
        let conn = self.conn.lock().await;
        let sms = conn
            .query_row(
                "SELECT id, sender, message, received_at, processed, parsed_amount,
                        transaction_reference, extracted_username, extracted_user_id,
                        extracted_email, deposit_created, wallet_transaction_id, error_message
                 FROM bank_sms WHERE id = ?1",
                params![sms_id],
                Self::map_sms,
            )
            .optional()?;
        Ok(sms)
    }

    pub async fn unprocessed_sms(&self, limit: u32) -> Result<Vec<BankSms>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, sender, message, received_at, processed, parsed_amount,
                    transaction_reference, extracted_username, extracted_user_id,
                    extracted_email, deposit_created, wallet_transaction_id, error_message
             FROM bank_sms WHERE processed = 0 ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::map_sms)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn map_sms(row: &Row<'_>) -> rusqlite::Result<BankSms> {
        Ok(BankSms {
            id: Some(row.get(0)?),
            sender: row.get(1)?,
            message: row.get(2)?,
            received_at: row.get(3)?,
            processed: row.get(4)?,
            parsed_amount: read_decimal_opt(row, 5)?,
            transaction_reference: row.get(6)?,
            extracted_username: row.get(7)?,
            extracted_user_id: row.get(8)?,
            extracted_email: row.get(9)?,
            deposit_created: row.get(10)?,
            wallet_transaction_id: row.get(11)?,
            error_message: row.get(12)?,
        })
    }

    /// True when a different SMS row already carries this reference.
    /// This is the exactly-once guard against re-delivered webhooks.
    pub async fn reference_used_elsewhere(&self, sms_id: i64, reference: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bank_sms WHERE transaction_reference = ?1 AND id != ?2",
            params![reference, sms_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub async fn finish_sms(&self, sms: &BankSms) -> Result<()> {
        let sms_id = sms.id.ok_or(SettlementError::Config(anyhow::anyhow!(
            "cannot finish an unsaved SMS row"
        )))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE bank_sms SET
                processed = ?1, parsed_amount = ?2, transaction_reference = ?3,
                extracted_username = ?4, extracted_user_id = ?5, extracted_email = ?6,
                deposit_created = ?7, wallet_transaction_id = ?8, error_message = ?9
             WHERE id = ?10",
            params![
                sms.processed,
                sms.parsed_amount.map(|a| a.to_string()),
                sms.transaction_reference,
                sms.extracted_username,
                sms.extracted_user_id,
                sms.extracted_email,
                sms.deposit_created,
                sms.wallet_transaction_id,
                sms.error_message,
                sms_id
            ],
        )?;
        Ok(())
    }
}
