use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serial_test::serial;
use tempfile::NamedTempFile;
use tokio::sync::Barrier;

use groupbuy_settlement::config::FeeConfigCache;
use groupbuy_settlement::currency::{Currency, CurrencyConverter};
use groupbuy_settlement::database::models::{
    OrderPaymentStatus, OrderStatus, PaymentRecordStatus, PaymentType, SystemFeeConfig,
    TransactionType,
};
use groupbuy_settlement::database::Database;
use groupbuy_settlement::error::SettlementError;
use groupbuy_settlement::fees::{AdditionalServices, FeeCalculationEngine};
use groupbuy_settlement::orders::{CheckoutItem, OrderPaymentWorkflow};
use groupbuy_settlement::sms::BankSmsReconciler;
use groupbuy_settlement::wallet::WalletLedger;

struct TestEnv {
    // Held so the backing SQLite file outlives the services.
    _db_file: NamedTempFile,
    db: Database,
    ledger: WalletLedger,
    workflow: OrderPaymentWorkflow,
    reconciler: BankSmsReconciler,
}

async fn setup() -> Result<TestEnv> {
    let db_file = NamedTempFile::new()?;
    let db = Database::new(db_file.path().to_str().unwrap()).await?;

    let converter = CurrencyConverter::with_default_rates();
    let ledger = WalletLedger::new(db.clone());
    let engine = FeeCalculationEngine::new(converter.clone());
    let fee_config = FeeConfigCache::new(db.clone());
    let workflow = OrderPaymentWorkflow::new(
        db.clone(),
        ledger.clone(),
        engine,
        converter,
        fee_config,
    );
    let reconciler = BankSmsReconciler::new(db.clone(), ledger.clone());

    db.insert_fee_config(&SystemFeeConfig {
        id: None,
        name: "default".to_string(),
        service_fee_percent: dec!(1.5),
        domestic_shipping_rate: dec!(25000),
        international_shipping_rate: dec!(50000),
        vietnam_domestic_shipping_rate: dec!(20000),
        deposit_percent: dec!(70),
        is_active: true,
        created_at: None,
    })
    .await?;

    Ok(TestEnv {
        _db_file: db_file,
        db,
        ledger,
        workflow,
        reconciler,
    })
}

fn vnd_item(name: &str, unit_price: Decimal, quantity: u32) -> CheckoutItem {
    CheckoutItem {
        product_name: name.to_string(),
        product_url: None,
        variant: None,
        unit_price,
        currency: Currency::Vnd,
        quantity,
    }
}

#[tokio::test]
#[serial]
async fn deposits_accumulate_with_full_audit_trail() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    env.ledger.deposit(user_id, dec!(100000), None, None, None).await?;
    env.ledger.deposit(user_id, dec!(50000), None, None, None).await?;

    assert_eq!(env.ledger.balance(user_id).await?, dec!(150000));

    let transactions = env.ledger.transactions(user_id, 10).await?;
    assert_eq!(transactions.len(), 2);
    for tx in &transactions {
        assert_eq!(tx.tx_type, TransactionType::Deposit);
        assert_eq!(tx.balance_after, tx.balance_before + tx.amount);
    }
    Ok(())
}

#[tokio::test]
#[serial]
async fn withdrawal_boundary_is_exact() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    env.ledger.deposit(user_id, dec!(200000), None, None, None).await?;

    // Over by the smallest unit fails and leaves the balance untouched.
    let over = env.ledger.withdraw(user_id, dec!(200000.01), None).await;
    assert!(matches!(
        over,
        Err(SettlementError::InsufficientBalance { .. })
    ));
    assert_eq!(env.ledger.balance(user_id).await?, dec!(200000));

    // Withdrawing exactly the balance succeeds.
    env.ledger.withdraw(user_id, dec!(200000), None).await?;
    assert_eq!(env.ledger.balance(user_id).await?, dec!(0));
    Ok(())
}

#[tokio::test]
#[serial]
async fn rejected_operations_never_move_money() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    env.ledger.deposit(user_id, dec!(80000), None, None, None).await?;

    assert!(env.ledger.deposit(user_id, dec!(0), None, None, None).await.is_err());
    assert!(env.ledger.deposit(user_id, dec!(-5), None, None, None).await.is_err());
    assert!(env.ledger.withdraw(user_id, dec!(999999), None).await.is_err());

    assert_eq!(env.ledger.balance(user_id).await?, dec!(80000));
    assert_eq!(env.ledger.transactions(user_id, 10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
#[serial]
async fn admin_adjustment_is_signed() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    env.ledger.admin_adjust(user_id, dec!(30000), "promo credit").await?;
    env.ledger.admin_adjust(user_id, dec!(-10000), "correction").await?;

    assert_eq!(env.ledger.balance(user_id).await?, dec!(20000));
    let transactions = env.ledger.transactions(user_id, 10).await?;
    assert!(transactions
        .iter()
        .all(|tx| tx.tx_type == TransactionType::AdminAdjustment));
    Ok(())
}

#[tokio::test]
#[serial]
async fn locked_wallet_blocks_mutations_but_keeps_balance() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    env.ledger.deposit(user_id, dec!(50000), None, None, None).await?;
    env.ledger.lock(user_id).await?;

    assert!(matches!(
        env.ledger.deposit(user_id, dec!(10000), None, None, None).await,
        Err(SettlementError::WalletLocked { .. })
    ));
    assert!(matches!(
        env.ledger.withdraw(user_id, dec!(10000), None).await,
        Err(SettlementError::WalletLocked { .. })
    ));
    assert_eq!(env.ledger.balance(user_id).await?, dec!(50000));

    env.ledger.unlock(user_id).await?;
    env.ledger.deposit(user_id, dec!(10000), None, None, None).await?;
    assert_eq!(env.ledger.balance(user_id).await?, dec!(60000));
    Ok(())
}

#[tokio::test]
#[serial]
async fn two_stage_order_payment_flow() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(2000000), None, None, None).await?;

    // 1,000,000 VND order at a 70% deposit.
    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    assert_eq!(order.total_amount, dec!(1000000));
    assert_eq!(order.deposit_amount, dec!(700000));
    assert_eq!(order.remaining_amount, dec!(300000));
    assert_eq!(order.payment_status, OrderPaymentStatus::PendingDeposit);
    let order_id = order.id.unwrap();

    let order = env.workflow.pay_deposit(order_id).await?;
    assert_eq!(order.payment_status, OrderPaymentStatus::Deposited);
    assert_eq!(env.ledger.balance(user_id).await?, dec!(1300000));

    // Actual international shipping comes in at 50,000 VND.
    let order = env
        .workflow
        .update_fees(
            order_id,
            dec!(0),
            dec!(50000),
            dec!(0),
            AdditionalServices::default(),
            None,
        )
        .await?;
    assert_eq!(order.total_amount, dec!(1050000));
    assert_eq!(order.deposit_amount, dec!(700000));
    assert_eq!(order.remaining_amount, dec!(350000));
    assert_eq!(order.payment_status, OrderPaymentStatus::PendingRemaining);

    let order = env.workflow.pay_remaining(order_id).await?;
    assert_eq!(order.payment_status, OrderPaymentStatus::WalletPaid);
    assert_eq!(env.ledger.balance(user_id).await?, dec!(950000));

    let order = env.workflow.complete(order_id).await?;
    assert_eq!(order.payment_status, OrderPaymentStatus::FullyCompleted);

    // The history carries every settlement transition.
    let history = env.workflow.history(order_id).await?;
    let transitions: Vec<&str> = history.iter().map(|h| h.new_status.as_str()).collect();
    assert!(transitions.contains(&"PENDING_DEPOSIT"));
    assert!(transitions.contains(&"DEPOSITED"));
    assert!(transitions.contains(&"PENDING_REMAINING"));
    assert!(transitions.contains(&"WALLET_PAID"));
    assert!(transitions.contains(&"FULLY_COMPLETED"));
    Ok(())
}

#[tokio::test]
#[serial]
async fn repeated_fee_update_never_double_counts() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(2000000), None, None, None).await?;

    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    let order_id = order.id.unwrap();
    env.workflow.pay_deposit(order_id).await?;

    env.workflow
        .update_fees(order_id, dec!(30000), dec!(50000), dec!(0), AdditionalServices::default(), None)
        .await?;
    // The corrected figures replace the first ones entirely.
    let order = env
        .workflow
        .update_fees(order_id, dec!(20000), dec!(60000), dec!(0), AdditionalServices::default(), None)
        .await?;
    assert_eq!(order.total_amount, dec!(1080000));
    assert_eq!(order.remaining_amount, dec!(380000));
    Ok(())
}

#[tokio::test]
#[serial]
async fn insufficient_deposit_leaves_order_pending() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(500000), None, None, None).await?;

    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    let order_id = order.id.unwrap();

    let attempt = env.workflow.pay_deposit(order_id).await;
    assert!(matches!(
        attempt,
        Err(SettlementError::InsufficientBalance { .. })
    ));

    let order = env.workflow.order(order_id).await?;
    assert_eq!(order.payment_status, OrderPaymentStatus::PendingDeposit);
    assert_eq!(env.ledger.balance(user_id).await?, dec!(500000));

    // The failed attempt is recorded, then a top-up makes it succeed.
    env.ledger.deposit(user_id, dec!(300000), None, None, None).await?;
    let order = env.workflow.pay_deposit(order_id).await?;
    assert_eq!(order.payment_status, OrderPaymentStatus::Deposited);
    Ok(())
}

#[tokio::test]
#[serial]
async fn deposit_cannot_be_charged_twice() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(2000000), None, None, None).await?;

    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    let order_id = order.id.unwrap();
    env.workflow.pay_deposit(order_id).await?;

    let replay = env.workflow.pay_deposit(order_id).await;
    assert!(replay.is_err());
    assert_eq!(env.ledger.balance(user_id).await?, dec!(1300000));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn racing_deposit_payments_charge_once() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(10000000), None, None, None).await?;

    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    let order_id = order.id.unwrap();

    // All payers hit pay_deposit at the same instant; exactly one may
    // move money.
    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let workflow = env.workflow.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            workflow.pay_deposit(order_id).await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    let completed_deposits = env
        .db
        .order_payments(order_id)
        .await?
        .into_iter()
        .filter(|p| {
            p.payment_type == PaymentType::Deposit && p.status == PaymentRecordStatus::Completed
        })
        .count();
    assert_eq!(completed_deposits, 1);
    assert_eq!(env.ledger.balance(user_id).await?, dec!(9300000));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn racing_remaining_payments_charge_once() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(10000000), None, None, None).await?;

    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    let order_id = order.id.unwrap();
    env.workflow.pay_deposit(order_id).await?;
    env.workflow
        .update_fees(order_id, dec!(0), dec!(50000), dec!(0), AdditionalServices::default(), None)
        .await?;

    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let workflow = env.workflow.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            workflow.pay_remaining(order_id).await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    let completed_remaining = env
        .db
        .order_payments(order_id)
        .await?
        .into_iter()
        .filter(|p| {
            p.payment_type == PaymentType::Remaining && p.status == PaymentRecordStatus::Completed
        })
        .count();
    assert_eq!(completed_remaining, 1);
    // 10,000,000 - 700,000 deposit - 350,000 remaining.
    assert_eq!(env.ledger.balance(user_id).await?, dec!(8950000));
    Ok(())
}

#[tokio::test]
#[serial]
async fn fee_update_requires_settled_deposit() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(5000000), None, None, None).await?;

    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    let order_id = order.id.unwrap();

    // Before the deposit leg the order must not advance to
    // PENDING_REMAINING.
    let premature = env
        .workflow
        .update_fees(order_id, dec!(0), dec!(50000), dec!(0), AdditionalServices::default(), None)
        .await;
    assert!(matches!(
        premature,
        Err(SettlementError::InvalidOrderState { .. })
    ));
    let order = env.workflow.order(order_id).await?;
    assert_eq!(order.payment_status, OrderPaymentStatus::PendingDeposit);

    // And the deposit leg still works afterwards.
    env.workflow.pay_deposit(order_id).await?;
    env.workflow
        .update_fees(order_id, dec!(0), dec!(50000), dec!(0), AdditionalServices::default(), None)
        .await?;
    env.workflow.pay_remaining(order_id).await?;
    env.workflow.complete(order_id).await?;

    // A settled order never regresses to PENDING_REMAINING.
    let settled = env
        .workflow
        .update_fees(order_id, dec!(0), dec!(99000), dec!(0), AdditionalServices::default(), None)
        .await;
    assert!(matches!(
        settled,
        Err(SettlementError::InvalidOrderState { .. })
    ));
    let order = env.workflow.order(order_id).await?;
    assert_eq!(order.payment_status, OrderPaymentStatus::FullyCompleted);
    Ok(())
}

#[tokio::test]
#[serial]
async fn order_numbers_are_unique_in_quick_succession() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    let mut numbers = std::collections::HashSet::new();
    for _ in 0..5 {
        let order = env
            .workflow
            .checkout(user_id, vec![vnd_item("Kettle", dec!(100000), 1)])
            .await?;
        assert!(numbers.insert(order.order_number));
    }
    Ok(())
}

#[tokio::test]
#[serial]
async fn cancellation_is_pending_only() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(500000), None, None, None).await?;

    // A pending order cancels cleanly with no money movement.
    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(100000), 1)])
        .await?;
    let cancelled = env.workflow.cancel(order.id.unwrap(), None).await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(env.ledger.balance(user_id).await?, dec!(500000));

    // Once confirmed, cancellation is refused.
    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Kettle", dec!(100000), 1)])
        .await?;
    let order_id = order.id.unwrap();
    env.workflow
        .update_status(order_id, OrderStatus::Confirmed, None, None)
        .await?;
    let refused = env.workflow.cancel(order_id, None).await;
    assert!(matches!(
        refused,
        Err(SettlementError::OrderNotCancellable { .. })
    ));

    // A cancelled order never comes back.
    let cancelled_id = cancelled.id.unwrap();
    let revived = env
        .workflow
        .update_status(cancelled_id, OrderStatus::Confirmed, None, None)
        .await;
    assert!(revived.is_err());
    Ok(())
}

#[tokio::test]
#[serial]
async fn item_count_check_flows_into_order_totals() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();
    env.ledger.deposit(user_id, dec!(5000000), None, None, None).await?;

    // 10 regular items at 35 CNY each: tier 6-20, 4,000 VND apiece.
    let order = env
        .workflow
        .checkout(
            user_id,
            vec![CheckoutItem {
                product_name: "Bluetooth speaker".to_string(),
                product_url: None,
                variant: Some("black".to_string()),
                unit_price: dec!(35),
                currency: Currency::Cny,
                quantity: 10,
            }],
        )
        .await?;
    let order_id = order.id.unwrap();
    // 35 CNY * 10 * 3,500 = 1,225,000 VND.
    assert_eq!(order.total_amount, dec!(1225000));
    env.workflow.pay_deposit(order_id).await?;

    let order = env
        .workflow
        .update_fees(
            order_id,
            dec!(0),
            dec!(0),
            dec!(0),
            AdditionalServices {
                item_count_check: true,
                ..Default::default()
            },
            None,
        )
        .await?;
    assert_eq!(order.additional_services_fee, dec!(40000));
    assert_eq!(order.total_amount, dec!(1265000));
    Ok(())
}

#[tokio::test]
#[serial]
async fn sms_deposit_round_trip() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    let message = "TK 19036xxx +500,000 VND luc 10:15. So du 12,500,000. ND: GD:123456789 NAP nguyen_an";
    let sms = env.reconciler.ingest("VCB", message).await?;

    assert!(sms.deposit_created);
    assert_eq!(sms.parsed_amount, Some(dec!(500000)));
    assert_eq!(sms.extracted_username.as_deref(), Some("nguyen_an"));
    assert_eq!(sms.transaction_reference.as_deref(), Some("123456789"));
    assert_eq!(env.ledger.balance(user_id).await?, dec!(500000));

    let transactions = env.ledger.transactions(user_id, 10).await?;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].reference_number.as_deref(), Some("123456789"));
    Ok(())
}

#[tokio::test]
#[serial]
async fn redelivered_sms_credits_exactly_once() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    let message = "+500,000 VND ND: GD:123456789 NAP nguyen_an";
    let first = env.reconciler.ingest("VCB", message).await?;
    assert!(first.deposit_created);

    // The bank resends the same notification.
    let second = env.reconciler.ingest("VCB", message).await?;
    assert!(!second.deposit_created);
    assert!(second.processed);
    assert!(second
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("duplicate reference"));

    assert_eq!(env.ledger.balance(user_id).await?, dec!(500000));
    assert_eq!(env.ledger.transactions(user_id, 10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
#[serial]
async fn sms_without_reference_still_credits() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    let sms = env.reconciler.ingest("VCB", "+200k NAP nguyen_an").await?;
    assert!(sms.deposit_created);
    assert!(sms
        .transaction_reference
        .as_deref()
        .unwrap_or_default()
        .starts_with("AUTO-"));
    assert_eq!(env.ledger.balance(user_id).await?, dec!(200000));
    Ok(())
}

#[tokio::test]
#[serial]
async fn unparseable_sms_is_recorded_not_lost() -> Result<()> {
    let env = setup().await?;
    env.db.create_user("nguyen_an", "an@example.com", None).await?;

    // No amount at all.
    let sms = env.reconciler.ingest("VCB", "So du cua quy khach").await?;
    assert!(sms.processed);
    assert!(!sms.deposit_created);
    assert!(sms.error_message.is_some());

    // Amount but no user identifier.
    let sms = env.reconciler.ingest("VCB", "+500,000 VND GD:987654321").await?;
    assert!(sms.processed);
    assert!(!sms.deposit_created);
    assert_eq!(sms.parsed_amount, Some(dec!(500000)));
    Ok(())
}

#[tokio::test]
#[serial]
async fn batch_job_and_webhook_share_idempotency() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    // Stored rows processed by the batch job.
    env.db.insert_sms("VCB", "+100,000 VND GD:111222333 NAP nguyen_an").await?;
    env.db.insert_sms("VCB", "+50,000 VND GD:444555666 NAP nguyen_an").await?;
    let handled = env.reconciler.process_pending(50).await?;
    assert_eq!(handled, 2);
    assert_eq!(env.ledger.balance(user_id).await?, dec!(150000));

    // A second sweep finds nothing new.
    let handled = env.reconciler.process_pending(50).await?;
    assert_eq!(handled, 0);
    assert_eq!(env.ledger.balance(user_id).await?, dec!(150000));
    Ok(())
}

#[tokio::test]
#[serial]
async fn sms_resolves_user_by_numeric_id() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    let message = format!("+300,000 VND GD:555000111 USER{user_id}");
    let sms = env.reconciler.ingest("TCB", &message).await?;
    assert!(sms.deposit_created);
    assert_eq!(sms.extracted_user_id, Some(user_id));
    assert_eq!(env.ledger.balance(user_id).await?, dec!(300000));
    Ok(())
}

#[tokio::test]
#[serial]
async fn only_one_fee_config_is_active() -> Result<()> {
    let env = setup().await?;

    let second = env
        .db
        .insert_fee_config(&SystemFeeConfig {
            id: None,
            name: "tet-promo".to_string(),
            service_fee_percent: dec!(1.0),
            domestic_shipping_rate: dec!(25000),
            international_shipping_rate: dec!(50000),
            vietnam_domestic_shipping_rate: dec!(20000),
            deposit_percent: dec!(50),
            is_active: true,
            created_at: None,
        })
        .await?;

    let active = env.db.active_fee_config().await?.unwrap();
    assert_eq!(active.id, second.id);
    assert_eq!(active.deposit_percent, dec!(50));
    Ok(())
}

#[tokio::test]
#[serial]
async fn failed_payment_attempt_is_kept_for_audit() -> Result<()> {
    let env = setup().await?;
    let user = env.db.create_user("nguyen_an", "an@example.com", None).await?;
    let user_id = user.id.unwrap();

    let order = env
        .workflow
        .checkout(user_id, vec![vnd_item("Rice cooker", dec!(1000000), 1)])
        .await?;
    let order_id = order.id.unwrap();
    assert!(env.workflow.pay_deposit(order_id).await.is_err());

    env.ledger.deposit(user_id, dec!(700000), None, None, None).await?;
    env.workflow.pay_deposit(order_id).await?;

    let statuses: Vec<PaymentRecordStatus> = env
        .db
        .order_payments(order_id)
        .await?
        .into_iter()
        .map(|p| p.status)
        .collect();
    assert!(statuses.contains(&PaymentRecordStatus::Failed));
    assert!(statuses.contains(&PaymentRecordStatus::Completed));
    Ok(())
}
