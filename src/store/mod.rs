pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{LedgerDraft, LedgerEntry, Product, Tenant};

/// key: tenant-store -> durable tenant registry
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>>;

    /// Insert a tenant together with its ordered active-module chain.
    async fn insert(&self, tenant: &Tenant, modules: &[String]) -> Result<()>;

    /// Tenants eligible for the daily charge: active and carrying a product key.
    async fn list_billable(&self) -> Result<Vec<Tenant>>;

    /// The tenant's configured module chain, insertion order preserved.
    async fn active_modules(&self, tenant_id: &str) -> Result<Vec<String>>;

    /// Stamp the rate applied by a billing pass and move the cursor forward.
    async fn advance_billing_cursor(
        &self,
        owner_id: i64,
        tenant_id: &str,
        rate_per_minute_kop: i64,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_paused(&self, tenant_id: &str, reason: &str) -> Result<()>;
}

/// key: account-store -> one mutable balance per owner, plus its ledger
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create the account with a zero balance if it does not exist yet.
    async fn ensure(&self, owner_id: i64) -> Result<()>;
    async fn get_balance(&self, owner_id: i64) -> Result<i64>;

    /// Persist a new balance together with the ledger entries that explain
    /// it. Atomic: either the balance and every entry land, or nothing does.
    /// This is what keeps ledger replay equal to the stored balance across
    /// write failures.
    async fn commit(
        &self,
        owner_id: i64,
        balance_kop: i64,
        entries: Vec<LedgerDraft>,
    ) -> Result<()>;
}

/// key: ledger-store -> read side of the append-only money movement log
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Entries for one owner in `created_at` order (id as tie-breaker).
    async fn entries_for_owner(&self, owner_id: i64) -> Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn lookup(&self, key: &str) -> Result<Option<Product>>;
}
