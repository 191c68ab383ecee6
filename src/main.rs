mod api;
mod config;
mod currency;
mod database;
mod error;
mod fees;
mod orders;
mod retry;
mod sms;
mod utils;
mod wallet;

use std::time::Duration;

use anyhow::Result;
use dotenv::dotenv;
use log::info;
use rust_decimal_macros::dec;

use api::DepositService;
use config::{FeeConfigCache, Settings};
use currency::{Currency, CurrencyConverter, StaticRateSource};
use database::Database;
use fees::FeeCalculationEngine;
use orders::OrderPaymentWorkflow;
use sms::BankSmsReconciler;
use utils::Logger;
use wallet::WalletLedger;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    Logger::log_operation_start("Settlement", "Initializing application");

    // Load configuration
    let settings = match Settings::new() {
        Ok(s) => {
            Logger::log_operation_success("Configuration", "Settings loaded successfully");
            s
        }
        Err(e) => {
            Logger::log_operation_failure("Configuration", &e.to_string());
            return Err(e);
        }
    };

    if let Err(e) = settings.validate() {
        Logger::log_operation_failure("Configuration validation", &e.to_string());
        return Err(e);
    }

    // Initialize database
    let db = match Database::new(&settings.database_url).await {
        Ok(db) => {
            Logger::log_operation_success("Database", "Database initialized successfully");
            db
        }
        Err(e) => {
            Logger::log_operation_failure("Database", &e.to_string());
            return Err(e.into());
        }
    };

    // Wire up the settlement components
    let converter = CurrencyConverter::with_default_rates();
    let ledger = WalletLedger::new(db.clone());
    let engine = FeeCalculationEngine::new(converter.clone());
    let fee_config = FeeConfigCache::new(db.clone());
    // The request layer (webhook, checkout, deposits) is driven by the
    // host application; the handlers only need these two services.
    let _workflow = OrderPaymentWorkflow::new(
        db.clone(),
        ledger.clone(),
        engine,
        converter.clone(),
        fee_config,
    );
    let _deposits = DepositService::new(db.clone(), ledger.clone());
    let reconciler = BankSmsReconciler::new(db.clone(), ledger.clone());
    Logger::log_operation_success("Components", "Settlement services wired successfully");

    // Background jobs: SMS reconciliation and exchange rate refresh
    let reconcile_interval = Duration::from_secs(settings.reconcile_interval_secs);
    let sms_batch_size = settings.sms_batch_size;
    let reconciler_job = reconciler.clone();
    tokio::spawn(async move {
        reconciler_job
            .run_periodic(reconcile_interval, sms_batch_size)
            .await;
    });

    let rate_source = StaticRateSource::new(vec![
        (Currency::Cny, Currency::Vnd, dec!(3500)),
        (Currency::Usd, Currency::Vnd, dec!(25000)),
        (Currency::Usd, Currency::Cny, dec!(7.2)),
    ]);
    let refresh_converter = converter.clone();
    let refresh_interval = Duration::from_secs(settings.rate_refresh_interval_secs);
    let lookup_timeout = Duration::from_secs(settings.rate_lookup_timeout_secs);
    tokio::spawn(async move {
        currency::refresh::run_rate_refresh(
            refresh_converter,
            Box::new(rate_source),
            refresh_interval,
            lookup_timeout,
        )
        .await;
    });

    info!("💱 Settlement backend initialized successfully!");
    info!("📊 Configuration:");
    info!("  - Database: {}", settings.database_url);
    info!(
        "  - Reconcile Interval: {}s",
        settings.reconcile_interval_secs
    );
    info!(
        "  - Rate Refresh Interval: {}s",
        settings.rate_refresh_interval_secs
    );
    info!("  - Max Retry Attempts: {}", settings.max_retry_attempts);
    info!("  - SMS Batch Size: {}", settings.sms_batch_size);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping background jobs");

    Ok(())
}
