use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{AppError, AppResult};
use crate::models::{LedgerDraft, LedgerKind};
use crate::store::{AccountStore, LedgerStore};

/// Per-owner mutual exclusion for balance mutation. Every path that changes a
/// balance (daily charges, top-ups, withdrawals, adjustments) takes the
/// owner's lock first, so a top-up cannot race a concurrent charge within the
/// process. Multi-process deployments need an external per-owner mutex on top.
#[derive(Default)]
pub struct OwnerLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, owner_id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(owner_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub owner_id: i64,
    pub balance_kop: i64,
    pub replayed_kop: i64,
    pub entry_count: usize,
    pub consistent: bool,
}

/// key: account-service -> owner-level money movements
///
/// Owner-facing counterpart of the billing engine: top-ups, withdrawals and
/// manual adjustments, each persisted as one store commit carrying both the
/// new balance and the ledger entry that explains it.
#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
    locks: Arc<OwnerLocks>,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        locks: Arc<OwnerLocks>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            locks,
        }
    }

    pub async fn balance(&self, owner_id: i64) -> AppResult<i64> {
        self.accounts.ensure(owner_id).await?;
        Ok(self.accounts.get_balance(owner_id).await?)
    }

    /// Credit the owner's balance. Returns the new balance.
    pub async fn top_up(&self, owner_id: i64, amount_kop: i64, comment: Option<String>) -> AppResult<i64> {
        if amount_kop <= 0 {
            return Err(AppError::BadRequest("top-up amount must be positive".into()));
        }
        let _guard = self.locks.acquire(owner_id).await;
        self.accounts.ensure(owner_id).await?;
        let balance = self.accounts.get_balance(owner_id).await?;
        let new_balance = balance + amount_kop;
        self.accounts
            .commit(
                owner_id,
                new_balance,
                vec![LedgerDraft {
                    kind: LedgerKind::Topup,
                    amount_kop,
                    tenant_id: None,
                    metadata: json!({ "comment": comment }),
                }],
            )
            .await?;
        tracing::info!(owner_id, amount_kop, new_balance, "balance topped up");
        Ok(new_balance)
    }

    /// Debit the owner's balance. Manual withdrawals never dip into the
    /// overdraft allowance; only billing charges may take a balance negative.
    pub async fn withdraw(&self, owner_id: i64, amount_kop: i64) -> AppResult<i64> {
        if amount_kop <= 0 {
            return Err(AppError::BadRequest("withdrawal amount must be positive".into()));
        }
        let _guard = self.locks.acquire(owner_id).await;
        self.accounts.ensure(owner_id).await?;
        let balance = self.accounts.get_balance(owner_id).await?;
        if balance < amount_kop {
            return Err(AppError::BadRequest(format!(
                "insufficient balance: {balance} kop available, {amount_kop} requested"
            )));
        }
        let new_balance = balance - amount_kop;
        self.accounts
            .commit(
                owner_id,
                new_balance,
                vec![LedgerDraft {
                    kind: LedgerKind::Withdrawal,
                    amount_kop: -amount_kop,
                    tenant_id: None,
                    metadata: json!({}),
                }],
            )
            .await?;
        tracing::info!(owner_id, amount_kop, new_balance, "balance withdrawn");
        Ok(new_balance)
    }

    /// Signed manual correction, used by support tooling.
    pub async fn adjust(&self, owner_id: i64, delta_kop: i64, reason: &str) -> AppResult<i64> {
        if delta_kop == 0 {
            return Err(AppError::BadRequest("adjustment delta must be non-zero".into()));
        }
        let _guard = self.locks.acquire(owner_id).await;
        self.accounts.ensure(owner_id).await?;
        let balance = self.accounts.get_balance(owner_id).await?;
        let new_balance = balance + delta_kop;
        self.accounts
            .commit(
                owner_id,
                new_balance,
                vec![LedgerDraft {
                    kind: LedgerKind::Adjustment,
                    amount_kop: delta_kop,
                    tenant_id: None,
                    metadata: json!({ "reason": reason }),
                }],
            )
            .await?;
        tracing::info!(owner_id, delta_kop, new_balance, "balance adjusted");
        Ok(new_balance)
    }

    /// The owner's full ledger in `created_at` order.
    pub async fn ledger(&self, owner_id: i64) -> AppResult<Vec<crate::models::LedgerEntry>> {
        Ok(self.ledger.entries_for_owner(owner_id).await?)
    }

    /// Replay the owner's ledger from zero and compare with the stored
    /// balance. The two must agree for every owner at all times.
    pub async fn reconcile(&self, owner_id: i64) -> AppResult<ReconciliationReport> {
        let _guard = self.locks.acquire(owner_id).await;
        self.accounts.ensure(owner_id).await?;
        let balance_kop = self.accounts.get_balance(owner_id).await?;
        let entries = self.ledger.entries_for_owner(owner_id).await?;
        let entry_count = entries.len();
        let replayed_kop: i64 = entries.iter().map(|entry| entry.amount_kop).sum();
        let consistent = replayed_kop == balance_kop;
        if !consistent {
            tracing::error!(
                owner_id,
                balance_kop,
                replayed_kop,
                "ledger replay does not match stored balance"
            );
        }
        Ok(ReconciliationReport {
            owner_id,
            balance_kop,
            replayed_kop,
            entry_count,
            consistent,
        })
    }
}
