mod common;

use chrono::{Duration, Utc};
use common::{
    insert_fresh_pending_order, insert_pending_order, remote_transaction, spawn, webhook,
    PREMIUM_AMOUNT_MINOR,
};
use payment_engine::error::EngineError;
use payment_engine::models::{
    MatchMethod, MatchResult, OrderStatus, PaymentOutcome, ReconcileOutcome,
};
use payment_engine::services::PaymentStore;
use uuid::Uuid;

#[tokio::test]
async fn transaction_ref_tier_matches_and_activates() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;
    let remote = remote_transaction(
        "pay_ref_1",
        PREMIUM_AMOUNT_MINOR,
        Some(&order.transaction_ref),
        Utc::now(),
    );

    let outcome = app
        .engine
        .reconciliation
        .reconcile_transaction(&remote)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Matched {
            method: MatchMethod::TransactionRef,
            activated: true,
        }
    );

    let stored = app.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);

    let logs = app
        .store
        .logs_for_provider_transaction("pay_ref_1")
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].match_method, Some(MatchMethod::TransactionRef));
    assert_eq!(logs[0].match_result, MatchResult::Matched);
    assert_eq!(logs[0].order_id, Some(order.id));
}

#[tokio::test]
async fn provider_id_tier_recognizes_already_recorded_payment() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;

    // Webhook already handled this payment.
    app.engine
        .processor
        .process_payment(
            &webhook(&order.transaction_ref, "pay_dup_1", PREMIUM_AMOUNT_MINOR),
            "razorpay",
            true,
        )
        .await
        .unwrap();

    // History entry arrives later without a usable reference.
    let remote = remote_transaction("pay_dup_1", PREMIUM_AMOUNT_MINOR, None, Utc::now());
    let outcome = app
        .engine
        .reconciliation
        .reconcile_transaction(&remote)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Matched {
            method: MatchMethod::ProviderTransactionId,
            activated: false,
        }
    );
}

#[tokio::test]
async fn fuzzy_tier_matches_by_amount_and_time_window() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;

    let remote = remote_transaction("pay_fuzzy_1", PREMIUM_AMOUNT_MINOR, None, Utc::now());
    let outcome = app
        .engine
        .reconciliation
        .reconcile_transaction(&remote)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Matched {
            method: MatchMethod::Fuzzy,
            activated: true,
        }
    );

    let stored = app.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);

    // Probabilistic matches must stay separately auditable.
    let logs = app
        .store
        .logs_for_provider_transaction("pay_fuzzy_1")
        .await
        .unwrap();
    assert_eq!(logs[0].match_method, Some(MatchMethod::Fuzzy));
}

#[tokio::test]
async fn fuzzy_tier_ignores_orders_outside_the_window() {
    let app = spawn();
    let now = Utc::now();
    insert_pending_order(
        &app.store,
        PREMIUM_AMOUNT_MINOR,
        now - Duration::minutes(10),
        now + Duration::minutes(20),
    )
    .await;

    let remote = remote_transaction("pay_fuzzy_2", PREMIUM_AMOUNT_MINOR, None, now);
    let outcome = app
        .engine
        .reconciliation
        .reconcile_transaction(&remote)
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unmatched);

    let logs = app
        .store
        .logs_for_provider_transaction("pay_fuzzy_2")
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].match_result, MatchResult::NotFound);
    assert_eq!(logs[0].match_method, None);
}

#[tokio::test]
async fn fuzzy_conflict_resolves_to_oldest_pending_order() {
    let app = spawn();
    let now = Utc::now();
    let older = insert_pending_order(
        &app.store,
        PREMIUM_AMOUNT_MINOR,
        now - Duration::minutes(3),
        now + Duration::minutes(27),
    )
    .await;
    let newer = insert_pending_order(
        &app.store,
        PREMIUM_AMOUNT_MINOR,
        now - Duration::minutes(1),
        now + Duration::minutes(29),
    )
    .await;

    let remote = remote_transaction("pay_fuzzy_3", PREMIUM_AMOUNT_MINOR, None, now);
    let outcome = app
        .engine
        .reconciliation
        .reconcile_transaction(&remote)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Matched {
            method: MatchMethod::Fuzzy,
            activated: true,
        }
    );

    let older = app.store.order_by_id(older.id).await.unwrap().unwrap();
    let newer = app.store.order_by_id(newer.id).await.unwrap().unwrap();
    assert_eq!(older.status, OrderStatus::Paid);
    assert_eq!(newer.status, OrderStatus::Pending);

    // The conflict must be durable in the audit log, not just traced.
    let logs = app
        .store
        .logs_for_provider_transaction("pay_fuzzy_3")
        .await
        .unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].match_method, Some(MatchMethod::Fuzzy));
    assert_eq!(logs[0].order_id, Some(older.id));
    assert!(
        logs[0].details.contains("2 pending orders"),
        "conflict entry should record the candidate count, got {:?}",
        logs[0].details
    );
    assert!(logs[1].details.contains("fuzzy"));
}

#[tokio::test]
async fn amount_mismatch_during_reconciliation_is_audited() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;

    let remote = remote_transaction(
        "pay_short",
        9_500,
        Some(&order.transaction_ref),
        Utc::now(),
    );
    let outcome = app
        .engine
        .reconciliation
        .reconcile_transaction(&remote)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Matched {
            method: MatchMethod::TransactionRef,
            activated: false,
        }
    );

    let stored = app.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingReview);

    let logs = app
        .store
        .logs_for_provider_transaction("pay_short")
        .await
        .unwrap();
    assert_eq!(logs[0].match_result, MatchResult::AmountMismatch);
}

#[tokio::test]
async fn sweep_reconciles_expires_and_counts() {
    let app = spawn();
    let now = Utc::now();

    // One order the webhook missed, reachable by reference.
    let missed = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;
    app.provider.push(remote_transaction(
        "pay_sweep_1",
        PREMIUM_AMOUNT_MINOR,
        Some(&missed.transaction_ref),
        now,
    ));
    // One remote transaction nothing matches.
    app.provider.push(remote_transaction(
        "pay_sweep_2",
        123_400,
        None,
        now - Duration::days(2),
    ));
    // One overdue pending order and one still-valid pending order.
    let overdue = insert_pending_order(
        &app.store,
        5_000,
        now - Duration::hours(2),
        now - Duration::hours(1),
    )
    .await;
    let valid = insert_pending_order(
        &app.store,
        7_000,
        now,
        now + Duration::minutes(25),
    )
    .await;

    let summary = app.engine.reconciliation.reconcile_payments().await.unwrap();
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.activated, 1);
    assert_eq!(summary.unmatched, 1);
    assert_eq!(summary.expired, 1);

    let missed = app.store.order_by_id(missed.id).await.unwrap().unwrap();
    assert_eq!(missed.status, OrderStatus::Paid);
    let overdue = app.store.order_by_id(overdue.id).await.unwrap().unwrap();
    assert_eq!(overdue.status, OrderStatus::Expired);
    let valid = app.store.order_by_id(valid.id).await.unwrap().unwrap();
    assert_eq!(valid.status, OrderStatus::Pending);
}

#[tokio::test]
async fn provider_outage_aborts_sweep_without_checkpoint_update() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;
    app.provider.push(remote_transaction(
        "pay_retry_1",
        PREMIUM_AMOUNT_MINOR,
        Some(&order.transaction_ref),
        Utc::now() - Duration::minutes(1),
    ));

    app.provider.set_failing(true);
    let err = app.engine.reconciliation.reconcile_payments().await.unwrap_err();
    assert!(matches!(err, EngineError::Provider(_)));
    assert!(err.is_transient());

    // Same window replays wholesale on the next schedule.
    app.provider.set_failing(false);
    let summary = app.engine.reconciliation.reconcile_payments().await.unwrap();
    assert_eq!(summary.activated, 1);

    let order = app.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn sweep_replays_are_idempotent() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;
    app.provider.push(remote_transaction(
        "pay_replay_1",
        PREMIUM_AMOUNT_MINOR,
        Some(&order.transaction_ref),
        Utc::now() + Duration::minutes(1),
    ));

    let first = app.engine.reconciliation.reconcile_payments().await.unwrap();
    assert_eq!(first.activated, 1);

    let second = app.engine.reconciliation.reconcile_payments().await.unwrap();
    assert_eq!(second.activated, 0);
    assert_eq!(second.matched, 1);
}

#[tokio::test]
async fn webhook_and_sweep_racing_activate_exactly_once() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;
    let remote = remote_transaction(
        "pay_race_2",
        PREMIUM_AMOUNT_MINOR,
        Some(&order.transaction_ref),
        Utc::now(),
    );
    let event = webhook(&order.transaction_ref, "pay_race_2", PREMIUM_AMOUNT_MINOR);

    let (from_webhook, from_sweep) = tokio::join!(
        app.engine.processor.process_payment(&event, "razorpay", true),
        app.engine.reconciliation.reconcile_transaction(&remote),
    );
    let from_webhook = from_webhook.unwrap();
    let from_sweep = from_sweep.unwrap();

    let webhook_activated = from_webhook == PaymentOutcome::Activated;
    let sweep_activated = matches!(
        from_sweep,
        ReconcileOutcome::Matched { activated: true, .. }
    );
    assert!(
        webhook_activated ^ sweep_activated,
        "exactly one path may activate: webhook={:?} sweep={:?}",
        from_webhook,
        from_sweep
    );

    let stored = app.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert!(app
        .store
        .payment_by_provider_transaction_id("pay_race_2")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn manual_reconcile_activates_a_specific_order() {
    let app = spawn();
    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;
    app.provider.push(remote_transaction(
        "pay_manual_1",
        PREMIUM_AMOUNT_MINOR,
        Some(&order.transaction_ref),
        Utc::now(),
    ));

    let outcome = app
        .engine
        .reconciliation
        .manual_reconcile(order.id, "pay_manual_1")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Matched {
            method: MatchMethod::TransactionRef,
            activated: true,
        }
    );

    let stored = app.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
}

#[tokio::test]
async fn manual_reconcile_reports_missing_order_and_transaction() {
    let app = spawn();

    let err = app
        .engine
        .reconciliation
        .manual_reconcile(Uuid::new_v4(), "pay_whatever")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(ref m) if m == "Order not found"));

    let order = insert_fresh_pending_order(&app.store, PREMIUM_AMOUNT_MINOR).await;
    let err = app
        .engine
        .reconciliation
        .manual_reconcile(order.id, "pay_missing")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(ref m) if m == "Transaction not found at provider"));
}

#[tokio::test]
async fn expiry_sweep_only_touches_overdue_pending_orders() {
    let app = spawn();
    let now = Utc::now();
    let overdue = insert_pending_order(
        &app.store,
        5_000,
        now - Duration::hours(1),
        now - Duration::minutes(5),
    )
    .await;
    let valid = insert_pending_order(&app.store, 5_000, now, now + Duration::minutes(30)).await;

    // A paid order past its expiry must not be touched.
    let paid = insert_pending_order(
        &app.store,
        5_000,
        now - Duration::hours(1),
        now - Duration::minutes(5),
    )
    .await;
    app.engine
        .processor
        .process_payment(&webhook(&paid.transaction_ref, "pay_keep", 5_000), "razorpay", true)
        .await
        .unwrap();

    let expired = app.engine.orders.handle_expired_orders().await.unwrap();
    assert_eq!(expired, 1);

    assert_eq!(
        app.store.order_by_id(overdue.id).await.unwrap().unwrap().status,
        OrderStatus::Expired
    );
    assert_eq!(
        app.store.order_by_id(valid.id).await.unwrap().unwrap().status,
        OrderStatus::Pending
    );
    assert_eq!(
        app.store.order_by_id(paid.id).await.unwrap().unwrap().status,
        OrderStatus::Paid
    );
}
