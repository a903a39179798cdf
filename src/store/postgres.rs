use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::models::{LedgerDraft, LedgerEntry, LedgerKind, Product, Tenant, TenantStatus};

use super::{AccountStore, LedgerStore, ProductCatalog, TenantStore};

/// key: tenant-store-pg -> tenants + tenant_modules tables
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tenant_from_row(row: &PgRow) -> Result<Tenant> {
    let status: String = row.get("status");
    let status = TenantStatus::parse(&status)
        .ok_or_else(|| anyhow!("unknown tenant status `{status}` in storage"))?;
    Ok(Tenant {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        status,
        paused_reason: row.get("paused_reason"),
        product_key: row.get("product_key"),
        rate_per_minute_kop: row.get("rate_per_minute_kop"),
        last_billed_rate_kop: row.get("last_billed_rate_kop"),
        last_billed_at: row.get("last_billed_at"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn insert(&self, tenant: &Tenant, modules: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, owner_id, status, paused_reason, product_key,
                rate_per_minute_kop, last_billed_rate_kop, last_billed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&tenant.id)
        .bind(tenant.owner_id)
        .bind(tenant.status.as_str())
        .bind(&tenant.paused_reason)
        .bind(&tenant.product_key)
        .bind(tenant.rate_per_minute_kop)
        .bind(tenant.last_billed_rate_kop)
        .bind(tenant.last_billed_at)
        .bind(tenant.created_at)
        .execute(&mut tx)
        .await?;
        for (position, key) in modules.iter().enumerate() {
            sqlx::query(
                "INSERT INTO tenant_modules (tenant_id, module_key, position) VALUES ($1, $2, $3)",
            )
            .bind(&tenant.id)
            .bind(key)
            .bind(position as i32)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_billable(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tenants
            WHERE status = 'active' AND product_key IS NOT NULL
            ORDER BY owner_id, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(tenant_from_row).collect()
    }

    async fn active_modules(&self, tenant_id: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT module_key FROM tenant_modules WHERE tenant_id = $1 ORDER BY position",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn advance_billing_cursor(
        &self,
        owner_id: i64,
        tenant_id: &str,
        rate_per_minute_kop: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET last_billed_at = $3, last_billed_rate_kop = $4
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(owner_id)
        .bind(at)
        .bind(rate_per_minute_kop)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("tenant {tenant_id} not found for owner {owner_id}"));
        }
        Ok(())
    }

    async fn set_paused(&self, tenant_id: &str, reason: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tenants SET status = 'paused', paused_reason = $2 WHERE id = $1",
        )
        .bind(tenant_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("tenant {tenant_id} not found"));
        }
        Ok(())
    }
}

/// key: account-store-pg -> owner_accounts + ledger_entries, written together
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn ensure(&self, owner_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO owner_accounts (owner_id, balance_kop) VALUES ($1, 0) ON CONFLICT (owner_id) DO NOTHING",
        )
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_balance(&self, owner_id: i64) -> Result<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_kop FROM owner_accounts WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }

    async fn commit(
        &self,
        owner_id: i64,
        balance_kop: i64,
        entries: Vec<LedgerDraft>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE owner_accounts SET balance_kop = $2, updated_at = NOW() WHERE owner_id = $1",
        )
        .bind(owner_id)
        .bind(balance_kop)
        .execute(&mut tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(anyhow!("owner account {owner_id} not found"));
        }
        for draft in entries {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (owner_id, tenant_id, kind, amount_kop, metadata)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(owner_id)
            .bind(&draft.tenant_id)
            .bind(draft.kind.as_str())
            .bind(draft.amount_kop)
            .bind(draft.metadata)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn ledger_entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let kind: String = row.get("kind");
    let kind = LedgerKind::parse(&kind)
        .ok_or_else(|| anyhow!("unknown ledger kind `{kind}` in storage"))?;
    Ok(LedgerEntry {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        tenant_id: row.get("tenant_id"),
        kind,
        amount_kop: row.get("amount_kop"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl LedgerStore for PgAccountStore {
    async fn entries_for_owner(&self, owner_id: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries WHERE owner_id = $1 ORDER BY created_at, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }
}

/// key: product-catalog-pg -> products table
#[derive(Clone)]
pub struct PgProductCatalog {
    pool: PgPool,
}

impl PgProductCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn lookup(&self, key: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT key, rate_kop_per_minute, rate_major_per_minute FROM products WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| Product {
            key: row.get("key"),
            rate_kop_per_minute: row.get("rate_kop_per_minute"),
            rate_major_per_minute: row.get("rate_major_per_minute"),
        }))
    }
}
