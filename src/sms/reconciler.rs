use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::database::models::{BankSms, PaymentGateway};
use crate::database::Database;
use crate::error::{Result, SettlementError};
use crate::sms::extract::{
    extract_amount, extract_identity, extract_reference, is_synthesized_reference,
    synthesize_reference,
};
use crate::wallet::WalletLedger;

/// Turns raw bank SMS text into exactly-once wallet credits. Both the
/// webhook path and the periodic batch job funnel into `process`, so a
/// row handled by one path is never reprocessed by the other. Every row
/// ends either linked to a wallet transaction or processed with an
/// error; nothing is left in limbo.
#[derive(Clone)]
pub struct BankSmsReconciler {
    db: Database,
    ledger: WalletLedger,
    /// Serializes the dedup check, the deposit, and the processed flag
    /// into one unit so a retried webhook cannot double-credit.
    processing: Arc<Mutex<()>>,
}

impl BankSmsReconciler {
    pub fn new(db: Database, ledger: WalletLedger) -> Self {
        Self {
            db,
            ledger,
            processing: Arc::new(Mutex::new(())),
        }
    }

    /// Store an inbound SMS and run the pipeline on it immediately.
    pub async fn ingest(&self, sender: &str, message: &str) -> Result<BankSms> {
        let sms = self.db.insert_sms(sender, message).await?;
        let sms_id = sms.id.expect("stored SMS has an id");
        self.process(sms_id).await
    }

    /// Run the pipeline once for a stored SMS. Parse failures are
    /// recorded on the row rather than returned: the forwarding client
    /// cannot act on them and must not retry forever. Only
    /// infrastructure faults surface as errors.
    pub async fn process(&self, sms_id: i64) -> Result<BankSms> {
        let _guard = self.processing.lock().await;

        let mut sms = self
            .db
            .find_sms(sms_id)
            .await?
            .ok_or(SettlementError::Config(anyhow::anyhow!(
                "SMS {sms_id} does not exist"
            )))?;
        if sms.processed {
            debug!("SMS {} already processed, skipping", sms_id);
            return Ok(sms);
        }

        // 1. Amount, ordered patterns, first match wins.
        let amount = match extract_amount(&sms.message) {
            Some(found) => found,
            None => {
                warn!("SMS {}: no amount found", sms_id);
                return self.finish_failed(sms, "no amount found in message").await;
            }
        };
        sms.parsed_amount = Some(amount.amount);

        // 2. Reference, synthesized from receipt time when absent.
        let reference = extract_reference(&sms.message, Some(amount.span))
            .unwrap_or_else(|| synthesize_reference(sms.received_at, sms_id));
        sms.transaction_reference = Some(reference.clone());

        // 3. User identifiers from the transfer note.
        let identity = extract_identity(&sms.message);
        sms.extracted_username = identity.username.clone();
        sms.extracted_user_id = identity.user_id;
        sms.extracted_email = identity.email.clone();
        if identity.is_empty() {
            warn!("SMS {}: no user identifier found", sms_id);
            return self.finish_failed(sms, "no user identifier in message").await;
        }

        // 4. Dedup on the reference. Synthesized references are unique
        // by construction and never dedup against real ones.
        if !is_synthesized_reference(&reference)
            && self.db.reference_used_elsewhere(sms_id, &reference).await?
        {
            info!("SMS {}: duplicate reference {}", sms_id, reference);
            return self
                .finish_failed(sms, &format!("duplicate reference {reference}"))
                .await;
        }

        // 5. Resolve the user: username, then id, then legacy email.
        let user = self.resolve_user(&identity).await?;
        let user = match user {
            Some(user) => user,
            None => {
                warn!("SMS {}: no user resolved", sms_id);
                return self.finish_failed(sms, "no matching user").await;
            }
        };
        let user_id = user.id.expect("stored user has an id");

        // 6. Credit the wallet and link the transaction.
        let deposit = self
            .ledger
            .deposit(
                user_id,
                amount.amount,
                Some(PaymentGateway::BankTransfer),
                Some(&reference),
                Some(&format!("Bank SMS from {}", sms.sender)),
            )
            .await;
        match deposit {
            Ok(tx) => {
                sms.processed = true;
                sms.deposit_created = true;
                sms.wallet_transaction_id = tx.id;
                sms.error_message = None;
                self.db.finish_sms(&sms).await?;
                info!(
                    "SMS {} credited {} to user {} (reference {})",
                    sms_id, amount.amount, user_id, reference
                );
                Ok(sms)
            }
            Err(err) if !err.is_retryable() => {
                // Business refusal (e.g. locked wallet): terminal for
                // this SMS, recorded on the row.
                let message = err.to_string();
                warn!("SMS {}: deposit refused: {}", sms_id, message);
                self.finish_failed(sms, &message).await
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_user(
        &self,
        identity: &crate::sms::extract::ExtractedIdentity,
    ) -> Result<Option<crate::database::models::User>> {
        if let Some(username) = &identity.username {
            if let Some(user) = self.db.find_user_by_username(username).await? {
                return Ok(Some(user));
            }
        }
        if let Some(user_id) = identity.user_id {
            if let Some(user) = self.db.find_user_by_id(user_id).await? {
                return Ok(Some(user));
            }
        }
        if let Some(email) = &identity.email {
            if let Some(user) = self.db.find_user_by_email(email).await? {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    async fn finish_failed(&self, mut sms: BankSms, error: &str) -> Result<BankSms> {
        sms.processed = true;
        sms.deposit_created = false;
        sms.error_message = Some(error.to_string());
        self.db.finish_sms(&sms).await?;
        Ok(sms)
    }

    /// Batch entry point used by the periodic job. Each row goes through
    /// the same `process` path as the webhook, with the same idempotency
    /// checks.
    pub async fn process_pending(&self, batch_size: u32) -> Result<usize> {
        let pending = self.db.unprocessed_sms(batch_size).await?;
        let count = pending.len();
        for sms in pending {
            let sms_id = sms.id.expect("stored SMS has an id");
            if let Err(err) = self.process(sms_id).await {
                warn!("Scheduled reconciliation failed for SMS {}: {}", sms_id, err);
            }
        }
        if count > 0 {
            info!("Scheduled reconciliation handled {} SMS rows", count);
        }
        Ok(count)
    }

    /// Periodic reconciliation loop; runs until the task is aborted.
    pub async fn run_periodic(&self, interval: Duration, batch_size: u32) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = self.process_pending(batch_size).await {
                warn!("Reconciliation sweep failed: {}", err);
            }
        }
    }
}
