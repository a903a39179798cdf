#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use botrent::accounts::{AccountService, OwnerLocks};
use botrent::billing::BillingEngine;
use botrent::models::{LedgerDraft, Product, Tenant, TenantStatus};
use botrent::notify::Notifier;
use botrent::store::memory::{MemoryAccountStore, MemoryProductCatalog, MemoryTenantStore};
use botrent::store::{AccountStore, LedgerStore, ProductCatalog, TenantStore};

/// Captures every outbound notification; can be flipped into a failing
/// gateway to check that notification errors stay non-fatal.
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<(i64, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, owner_id: i64, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("gateway down");
        }
        self.sent.lock().await.push((owner_id, text.to_string()));
        Ok(())
    }
}

/// Catalog wrapper that errors for one product key, for failure-isolation tests.
pub struct FlakyCatalog {
    pub inner: Arc<MemoryProductCatalog>,
    pub broken_key: String,
}

#[async_trait]
impl ProductCatalog for FlakyCatalog {
    async fn lookup(&self, key: &str) -> Result<Option<Product>> {
        if key == self.broken_key {
            bail!("catalog unavailable");
        }
        self.inner.lookup(key).await
    }
}

/// Account store whose next commit fails, for write-failure atomicity tests.
pub struct FailingAccounts {
    inner: Arc<MemoryAccountStore>,
    fail_next: AtomicBool,
}

impl FailingAccounts {
    pub fn new(inner: Arc<MemoryAccountStore>) -> Self {
        Self {
            inner,
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for FailingAccounts {
    async fn ensure(&self, owner_id: i64) -> Result<()> {
        self.inner.ensure(owner_id).await
    }

    async fn get_balance(&self, owner_id: i64) -> Result<i64> {
        self.inner.get_balance(owner_id).await
    }

    async fn commit(
        &self,
        owner_id: i64,
        balance_kop: i64,
        entries: Vec<LedgerDraft>,
    ) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("connection reset during commit");
        }
        self.inner.commit(owner_id, balance_kop, entries).await
    }
}

pub struct Harness {
    pub tenants: Arc<MemoryTenantStore>,
    pub accounts: Arc<MemoryAccountStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub catalog: Arc<MemoryProductCatalog>,
    pub notifier: Arc<RecordingNotifier>,
    pub locks: Arc<OwnerLocks>,
    pub engine: Arc<BillingEngine>,
    pub account_service: AccountService,
}

pub fn harness() -> Harness {
    harness_with(-300, false)
}

pub fn harness_with(floor_kop: i64, digest: bool) -> Harness {
    let tenants = Arc::new(MemoryTenantStore::new());
    let accounts = Arc::new(MemoryAccountStore::new());
    let ledger = accounts.clone() as Arc<dyn LedgerStore>;
    let catalog = Arc::new(MemoryProductCatalog::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let locks = Arc::new(OwnerLocks::new());
    let engine = Arc::new(
        BillingEngine::new(
            tenants.clone() as Arc<dyn TenantStore>,
            accounts.clone() as Arc<dyn AccountStore>,
            catalog.clone() as Arc<dyn ProductCatalog>,
            notifier.clone(),
            locks.clone(),
        )
        .with_floor(floor_kop)
        .with_digest(digest),
    );
    let account_service = AccountService::new(
        accounts.clone() as Arc<dyn AccountStore>,
        ledger.clone(),
        locks.clone(),
    );
    Harness {
        tenants,
        accounts,
        ledger,
        catalog,
        notifier,
        locks,
        engine,
        account_service,
    }
}

pub fn tenant(id: &str, owner_id: i64, product_key: Option<&str>, rate_kop: i64) -> Tenant {
    Tenant {
        id: id.to_string(),
        owner_id,
        status: TenantStatus::Active,
        paused_reason: None,
        product_key: product_key.map(|k| k.to_string()),
        rate_per_minute_kop: rate_kop,
        last_billed_rate_kop: 0,
        last_billed_at: None,
        created_at: Utc::now(),
    }
}
