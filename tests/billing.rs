mod common;

use std::sync::Arc;

use botrent::billing::{BillingEngine, DAY_MINUTES};
use botrent::models::{LedgerKind, Product, TenantStatus};
use botrent::store::{AccountStore, LedgerStore, ProductCatalog, TenantStore};
use chrono::Utc;

use common::{harness, harness_with, tenant, FailingAccounts, FlakyCatalog};

// key: billing-tests -> daily charge scenarios against in-memory stores

#[tokio::test]
async fn full_charge_debits_one_day_and_appends_entry() {
    let h = harness();
    h.account_service.top_up(10, 2000, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 1), &[]).await.unwrap();

    let report = h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(report.tenants_seen, 1);
    assert_eq!(report.tenants_charged, 1);
    assert_eq!(report.charged_kop, 1440);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 560);

    let entries = h.ledger.entries_for_owner(10).await.unwrap();
    let charge = entries
        .iter()
        .find(|e| e.kind == LedgerKind::DailyCharge)
        .expect("daily charge entry");
    assert_eq!(charge.amount_kop, -1440);
    assert_eq!(charge.tenant_id.as_deref(), Some("t1"));
    assert_eq!(charge.metadata["minutes"], DAY_MINUTES);
    assert_eq!(charge.metadata["rate_kop_min"], 1);

    let billed = h.tenants.get("t1").await.unwrap().unwrap();
    assert_eq!(billed.status, TenantStatus::Active);
    assert_eq!(billed.last_billed_rate_kop, 1);
    assert!(billed.last_billed_at.is_some());
}

#[tokio::test]
async fn partial_charge_stops_at_floor_and_pauses_tenant() {
    let h = harness();
    h.account_service.top_up(10, 500, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 1), &[]).await.unwrap();

    let report = h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(report.tenants_paused, 1);
    assert_eq!(report.charged_kop, 800);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), -300);

    let entries = h.ledger.entries_for_owner(10).await.unwrap();
    let partial = entries
        .iter()
        .find(|e| e.kind == LedgerKind::DailyChargePartial)
        .expect("partial charge entry");
    assert_eq!(partial.amount_kop, -800);
    assert_eq!(partial.metadata["minutes_paid"], 800);
    assert_eq!(partial.metadata["rate_kop_min"], 1);
    assert_eq!(partial.metadata["floor_kop"], -300);

    let paused = h.tenants.get("t1").await.unwrap().unwrap();
    assert_eq!(paused.status, TenantStatus::Paused);
    assert_eq!(paused.paused_reason.as_deref(), Some("billing"));

    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, 10);
    assert!(messages[0].1.contains("paused"));
}

#[tokio::test]
async fn balance_at_floor_pauses_without_ledger_entry() {
    let h = harness_with(0, false);
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 1), &[]).await.unwrap();

    let report = h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(report.tenants_paused, 1);
    assert_eq!(report.charged_kop, 0);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 0);
    assert!(h.ledger.entries_for_owner(10).await.unwrap().is_empty());

    let paused = h.tenants.get("t1").await.unwrap().unwrap();
    assert_eq!(paused.status, TenantStatus::Paused);
    assert_eq!(paused.paused_reason.as_deref(), Some("billing"));
    assert_eq!(h.notifier.messages().await.len(), 1);
}

#[tokio::test]
async fn tenant_without_resolvable_product_is_free() {
    let h = harness();
    h.account_service.top_up(10, 2000, None).await.unwrap();
    // Product key set but absent from the catalog: billable yet free.
    h.tenants.insert(&tenant("t1", 10, Some("ghost"), 0), &[]).await.unwrap();

    let report = h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(report.tenants_free, 1);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 2000);
    // Only the top-up is in the ledger.
    let entries = h.ledger.entries_for_owner(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, LedgerKind::Topup);

    let billed = h.tenants.get("t1").await.unwrap().unwrap();
    assert!(billed.last_billed_at.is_some());
    assert_eq!(billed.last_billed_rate_kop, 0);
    assert_eq!(billed.status, TenantStatus::Active);
}

#[tokio::test]
async fn catalog_minor_rate_is_used_when_no_override() {
    let h = harness();
    h.catalog.insert(Product {
        key: "shop".into(),
        rate_kop_per_minute: Some(2),
        rate_major_per_minute: None,
    });
    h.account_service.top_up(10, 5000, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 0), &[]).await.unwrap();

    h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 5000 - 2 * 1440);
}

#[tokio::test]
async fn legacy_major_rate_is_converted_to_kop() {
    let h = harness();
    h.catalog.insert(Product {
        key: "legacy".into(),
        rate_kop_per_minute: None,
        rate_major_per_minute: Some(0.02),
    });
    h.account_service.top_up(10, 5000, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("legacy"), 0), &[]).await.unwrap();

    h.engine.run_daily_billing(Utc::now()).await.unwrap();

    // 0.02 major/min = 2 kop/min = 2880 kop/day.
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 5000 - 2880);
    let billed = h.tenants.get("t1").await.unwrap().unwrap();
    assert_eq!(billed.last_billed_rate_kop, 2);
}

#[tokio::test]
async fn tenant_override_beats_catalog_rate() {
    let h = harness();
    h.catalog.insert(Product {
        key: "shop".into(),
        rate_kop_per_minute: Some(2),
        rate_major_per_minute: None,
    });
    h.account_service.top_up(10, 10000, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 3), &[]).await.unwrap();

    h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 10000 - 3 * 1440);
}

#[tokio::test]
async fn second_run_within_the_same_day_is_a_no_op() {
    let h = harness();
    h.account_service.top_up(10, 5000, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 1), &[]).await.unwrap();

    let now = Utc::now();
    h.engine.run_daily_billing(now).await.unwrap();
    let second = h.engine.run_daily_billing(now).await.unwrap();

    assert_eq!(second.tenants_skipped, 1);
    assert_eq!(second.tenants_charged, 0);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 5000 - 1440);
    let charges = h
        .ledger
        .entries_for_owner(10)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.kind == LedgerKind::DailyCharge)
        .count();
    assert_eq!(charges, 1);
}

#[tokio::test]
async fn one_failing_tenant_does_not_abort_the_run() {
    let h = harness();
    let flaky = Arc::new(FlakyCatalog {
        inner: h.catalog.clone(),
        broken_key: "broken".into(),
    });
    let engine = BillingEngine::new(
        h.tenants.clone() as Arc<dyn TenantStore>,
        h.accounts.clone() as Arc<dyn AccountStore>,
        flaky as Arc<dyn ProductCatalog>,
        h.notifier.clone(),
        h.locks.clone(),
    )
    .with_floor(-300)
    .with_digest(false);

    h.account_service.top_up(10, 5000, None).await.unwrap();
    h.tenants.insert(&tenant("a-broken", 10, Some("broken"), 0), &[]).await.unwrap();
    h.tenants.insert(&tenant("b-ok", 10, Some("shop"), 1), &[]).await.unwrap();

    let report = engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(report.tenants_failed, 1);
    assert_eq!(report.tenants_charged, 1);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 5000 - 1440);
    let unbilled = h.tenants.get("a-broken").await.unwrap().unwrap();
    assert!(unbilled.last_billed_at.is_none());
}

#[tokio::test]
async fn failing_notifier_does_not_block_the_charge() {
    let h = harness();
    h.notifier.set_failing(true);
    h.account_service.top_up(10, 500, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 1), &[]).await.unwrap();

    let report = h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(report.tenants_paused, 1);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), -300);
    let paused = h.tenants.get("t1").await.unwrap().unwrap();
    assert_eq!(paused.status, TenantStatus::Paused);
}

#[tokio::test]
async fn digest_summarizes_all_charges_for_one_owner() {
    let h = harness_with(-300, true);
    h.account_service.top_up(7, 10000, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 7, Some("shop"), 1), &[]).await.unwrap();
    h.tenants.insert(&tenant("t2", 7, Some("shop"), 1), &[]).await.unwrap();
    // Free tenant: seen by the run but not debited, so not in the digest.
    h.tenants.insert(&tenant("t3", 7, Some("ghost"), 0), &[]).await.unwrap();

    h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(h.accounts.get_balance(7).await.unwrap(), 10000 - 2880);
    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, 7);
    assert!(messages[0].1.contains("2880 kop"));
    assert!(messages[0].1.contains("2 bot(s)"));
}

#[tokio::test]
async fn failed_balance_commit_leaves_ledger_and_cursor_untouched() {
    let h = harness();
    let accounts = Arc::new(FailingAccounts::new(h.accounts.clone()));
    let engine = BillingEngine::new(
        h.tenants.clone() as Arc<dyn TenantStore>,
        accounts.clone() as Arc<dyn AccountStore>,
        h.catalog.clone() as Arc<dyn ProductCatalog>,
        h.notifier.clone(),
        h.locks.clone(),
    )
    .with_floor(-300)
    .with_digest(false);

    h.account_service.top_up(10, 2000, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 1), &[]).await.unwrap();

    accounts.fail_next_commit();
    let report = engine.run_daily_billing(Utc::now()).await.unwrap();

    // Nothing moved and nothing was double-counted as charged.
    assert_eq!(report.tenants_failed, 1);
    assert_eq!(report.tenants_charged, 0);
    assert_eq!(report.charged_kop, 0);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 2000);
    let charges = h
        .ledger
        .entries_for_owner(10)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.kind == LedgerKind::DailyCharge)
        .count();
    assert_eq!(charges, 0);
    assert!(h.account_service.reconcile(10).await.unwrap().consistent);

    // The cursor never advanced, so the next run repairs itself.
    let unbilled = h.tenants.get("t1").await.unwrap().unwrap();
    assert!(unbilled.last_billed_at.is_none());

    let second = engine.run_daily_billing(Utc::now()).await.unwrap();
    assert_eq!(second.tenants_charged, 1);
    assert_eq!(h.accounts.get_balance(10).await.unwrap(), 560);
    assert!(h.account_service.reconcile(10).await.unwrap().consistent);
}

#[tokio::test]
async fn owners_are_billed_independently() {
    let h = harness();
    h.account_service.top_up(1, 2000, None).await.unwrap();
    h.account_service.top_up(2, 500, None).await.unwrap();
    h.tenants.insert(&tenant("t1", 1, Some("shop"), 1), &[]).await.unwrap();
    h.tenants.insert(&tenant("t2", 2, Some("shop"), 1), &[]).await.unwrap();

    let report = h.engine.run_daily_billing(Utc::now()).await.unwrap();

    assert_eq!(report.tenants_charged, 1);
    assert_eq!(report.tenants_paused, 1);
    assert_eq!(h.accounts.get_balance(1).await.unwrap(), 560);
    assert_eq!(h.accounts.get_balance(2).await.unwrap(), -300);
}

#[tokio::test]
async fn ledger_replay_reproduces_the_balance() {
    let h = harness();
    h.account_service.top_up(10, 1000, None).await.unwrap();
    h.account_service.withdraw(10, 200).await.unwrap();
    h.tenants.insert(&tenant("t1", 10, Some("shop"), 1), &[]).await.unwrap();

    h.engine.run_daily_billing(Utc::now()).await.unwrap();

    // 800 on hand, 1440 needed: partial down to the floor.
    let report = h.account_service.reconcile(10).await.unwrap();
    assert!(report.consistent);
    assert_eq!(report.balance_kop, -300);
    assert_eq!(report.replayed_kop, -300);
    assert_eq!(report.entry_count, 3);
}
