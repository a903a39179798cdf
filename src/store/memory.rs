use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::models::{LedgerDraft, LedgerEntry, OwnerAccount, Product, Tenant, TenantStatus};

use super::{AccountStore, LedgerStore, ProductCatalog, TenantStore};

/// In-memory tenant registry. Used by tests and token-less local runs; the
/// Postgres store is the production implementation.
#[derive(Default)]
pub struct MemoryTenantStore {
    tenants: DashMap<String, Tenant>,
    modules: DashMap<String, Vec<String>>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(tenant_id).map(|t| t.value().clone()))
    }

    async fn insert(&self, tenant: &Tenant, modules: &[String]) -> Result<()> {
        self.tenants.insert(tenant.id.clone(), tenant.clone());
        self.modules.insert(tenant.id.clone(), modules.to_vec());
        Ok(())
    }

    async fn list_billable(&self) -> Result<Vec<Tenant>> {
        let mut billable: Vec<Tenant> = self
            .tenants
            .iter()
            .filter(|entry| {
                entry.status == TenantStatus::Active && entry.product_key.is_some()
            })
            .map(|entry| entry.value().clone())
            .collect();
        billable.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(billable)
    }

    async fn active_modules(&self, tenant_id: &str) -> Result<Vec<String>> {
        Ok(self
            .modules
            .get(tenant_id)
            .map(|keys| keys.value().clone())
            .unwrap_or_default())
    }

    async fn advance_billing_cursor(
        &self,
        _owner_id: i64,
        tenant_id: &str,
        rate_per_minute_kop: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tenant = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| anyhow!("tenant {tenant_id} not found"))?;
        tenant.last_billed_at = Some(at);
        tenant.last_billed_rate_kop = rate_per_minute_kop;
        Ok(())
    }

    async fn set_paused(&self, tenant_id: &str, reason: &str) -> Result<()> {
        let mut tenant = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| anyhow!("tenant {tenant_id} not found"))?;
        tenant.status = TenantStatus::Paused;
        tenant.paused_reason = Some(reason.to_string());
        Ok(())
    }
}

/// Balance and ledger live in one struct so a commit can write both under
/// the same lock, mirroring the transactional Postgres store.
pub struct MemoryAccountStore {
    accounts: DashMap<i64, OwnerAccount>,
    entries: Mutex<Vec<LedgerEntry>>,
    next_id: AtomicI64,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            entries: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn ensure(&self, owner_id: i64) -> Result<()> {
        self.accounts.entry(owner_id).or_insert_with(|| OwnerAccount {
            owner_id,
            balance_kop: 0,
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_balance(&self, owner_id: i64) -> Result<i64> {
        Ok(self
            .accounts
            .get(&owner_id)
            .map(|account| account.balance_kop)
            .unwrap_or(0))
    }

    async fn commit(
        &self,
        owner_id: i64,
        balance_kop: i64,
        drafts: Vec<LedgerDraft>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut account = self
            .accounts
            .entry(owner_id)
            .or_insert_with(|| OwnerAccount {
                owner_id,
                balance_kop: 0,
                updated_at: Utc::now(),
            });
        account.balance_kop = balance_kop;
        account.updated_at = Utc::now();
        for draft in drafts {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            entries.push(LedgerEntry {
                id,
                owner_id,
                tenant_id: draft.tenant_id,
                kind: draft.kind,
                amount_kop: draft.amount_kop,
                metadata: draft.metadata,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryAccountStore {
    async fn entries_for_owner(&self, owner_id: i64) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.lock().await;
        let mut owned: Vec<LedgerEntry> = entries
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(owned)
    }
}

#[derive(Default)]
pub struct MemoryProductCatalog {
    products: DashMap<String, Product>,
}

impl MemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: Product) {
        self.products.insert(product.key.clone(), product);
    }
}

#[async_trait]
impl ProductCatalog for MemoryProductCatalog {
    async fn lookup(&self, key: &str) -> Result<Option<Product>> {
        Ok(self.products.get(key).map(|p| p.value().clone()))
    }
}
