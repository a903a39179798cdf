use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::accounts::OwnerLocks;
use crate::config;
use crate::models::{LedgerDraft, LedgerKind, Tenant};
use crate::notify::Notifier;
use crate::store::{AccountStore, ProductCatalog, TenantStore};

use super::models::{BillingRunReport, ChargeOutcome};
use super::rates::{self, DAY_MINUTES};

/// key: billing-engine -> once-daily usage charges with an overdraft floor
pub struct BillingEngine {
    tenants: Arc<dyn TenantStore>,
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<dyn ProductCatalog>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<OwnerLocks>,
    negative_limit_kop: i64,
    digest_enabled: bool,
}

/// One tenant's charge, decided but not yet persisted.
struct PlannedCharge {
    rate_kop: i64,
    outcome: ChargeOutcome,
}

impl BillingEngine {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        accounts: Arc<dyn AccountStore>,
        catalog: Arc<dyn ProductCatalog>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<OwnerLocks>,
    ) -> Self {
        Self {
            tenants,
            accounts,
            catalog,
            notifier,
            locks,
            negative_limit_kop: *config::NEGATIVE_LIMIT_KOP,
            digest_enabled: *config::BILLING_DIGEST_ENABLED,
        }
    }

    pub fn with_floor(mut self, negative_limit_kop: i64) -> Self {
        self.negative_limit_kop = negative_limit_kop;
        self
    }

    pub fn with_digest(mut self, enabled: bool) -> Self {
        self.digest_enabled = enabled;
        self
    }

    /// Apply one day's charge to every eligible tenant. Idempotent within a
    /// local calendar day: tenants whose cursor already falls on today's date
    /// are skipped, so an on-demand invocation cannot double-charge.
    ///
    /// Tenants of one owner are charged sequentially against a single balance
    /// snapshot under the owner's lock; per-tenant failures are logged and the
    /// run moves on.
    pub async fn run_daily_billing(&self, now: DateTime<Utc>) -> Result<BillingRunReport> {
        let billable = self.tenants.list_billable().await?;
        let mut by_owner: BTreeMap<i64, Vec<Tenant>> = BTreeMap::new();
        for tenant in billable {
            by_owner.entry(tenant.owner_id).or_default().push(tenant);
        }

        let mut report = BillingRunReport::default();
        for (owner_id, mut tenants) in by_owner {
            tenants.sort_by(|a, b| a.id.cmp(&b.id));
            match self.bill_owner(owner_id, &tenants, now, &mut report).await {
                Ok((charged_kop, debited)) => {
                    if self.digest_enabled && charged_kop > 0 {
                        let text = format!(
                            "Daily rental charges: {charged_kop} kop across {debited} bot(s)."
                        );
                        if let Err(err) = self.notifier.send(owner_id, &text).await {
                            warn!(?err, owner_id, "billing digest delivery failed");
                        }
                    }
                }
                Err(err) => {
                    warn!(?err, owner_id, "owner billing pass failed, continuing with next owner");
                    report.tenants_failed += tenants.len();
                }
            }
        }

        info!(
            tenants_seen = report.tenants_seen,
            tenants_charged = report.tenants_charged,
            tenants_paused = report.tenants_paused,
            tenants_failed = report.tenants_failed,
            charged_kop = report.charged_kop,
            "daily billing run completed"
        );
        Ok(report)
    }

    /// Charge all of one owner's tenants against a single balance snapshot.
    /// Charges are planned in memory first; the new balance and every ledger
    /// entry then land in one atomic store commit, and only after that commit
    /// do cursors move, tenants pause, and notifications go out. A failed
    /// commit therefore leaves balance, ledger, and cursors exactly as they
    /// were, and the tenants stay billable for the next run.
    ///
    /// Returns the total kop debited and the number of tenants debited,
    /// for the digest.
    async fn bill_owner(
        &self,
        owner_id: i64,
        tenants: &[Tenant],
        now: DateTime<Utc>,
        report: &mut BillingRunReport,
    ) -> Result<(i64, usize)> {
        let _guard = self.locks.acquire(owner_id).await;
        self.accounts.ensure(owner_id).await?;
        let mut balance = self.accounts.get_balance(owner_id).await?;

        let mut drafts: Vec<LedgerDraft> = Vec::new();
        let mut pending: Vec<(&Tenant, PlannedCharge)> = Vec::new();
        for tenant in tenants {
            report.tenants_seen += 1;
            match self.plan_charge(tenant, &mut balance, now).await {
                Ok(plan) => {
                    match plan.outcome {
                        ChargeOutcome::AlreadyBilled => {
                            report.tenants_skipped += 1;
                            continue;
                        }
                        ChargeOutcome::Free => report.tenants_free += 1,
                        ChargeOutcome::Charged { amount_kop } => drafts.push(LedgerDraft {
                            kind: LedgerKind::DailyCharge,
                            amount_kop: -amount_kop,
                            tenant_id: Some(tenant.id.clone()),
                            metadata: json!({
                                "minutes": DAY_MINUTES,
                                "rate_kop_min": plan.rate_kop,
                            }),
                        }),
                        ChargeOutcome::Partial { amount_kop, minutes_paid } => {
                            if amount_kop > 0 {
                                drafts.push(LedgerDraft {
                                    kind: LedgerKind::DailyChargePartial,
                                    amount_kop: -amount_kop,
                                    tenant_id: Some(tenant.id.clone()),
                                    metadata: json!({
                                        "minutes_paid": minutes_paid,
                                        "rate_kop_min": plan.rate_kop,
                                        "floor_kop": self.negative_limit_kop,
                                    }),
                                });
                            }
                        }
                    }
                    pending.push((tenant, plan));
                }
                Err(err) => {
                    warn!(
                        ?err,
                        tenant = %tenant.id,
                        owner_id,
                        "tenant charge failed, continuing with next tenant"
                    );
                    report.tenants_failed += 1;
                }
            }
        }

        if !drafts.is_empty() {
            if let Err(err) = self.accounts.commit(owner_id, balance, drafts).await {
                warn!(?err, owner_id, "balance commit failed, abandoning this owner's charges");
                // Free tenants carry no money movement; their cursors may
                // still advance. Every planned debit is abandoned untallied.
                pending.retain(|(_, plan)| match plan.outcome {
                    ChargeOutcome::Free => true,
                    _ => {
                        report.tenants_failed += 1;
                        false
                    }
                });
            }
        }

        let mut charged_total = 0i64;
        let mut debited = 0usize;
        for (tenant, plan) in pending {
            match plan.outcome {
                ChargeOutcome::AlreadyBilled => {}
                ChargeOutcome::Free => {
                    if let Err(err) = self
                        .tenants
                        .advance_billing_cursor(owner_id, &tenant.id, 0, now)
                        .await
                    {
                        warn!(?err, tenant = %tenant.id, owner_id, "cursor advance failed");
                    }
                }
                ChargeOutcome::Charged { amount_kop } => {
                    report.tenants_charged += 1;
                    report.charged_kop += amount_kop;
                    charged_total += amount_kop;
                    debited += 1;
                    if let Err(err) = self
                        .tenants
                        .advance_billing_cursor(owner_id, &tenant.id, plan.rate_kop, now)
                        .await
                    {
                        warn!(?err, tenant = %tenant.id, owner_id, "cursor advance failed after charge");
                    }
                    info!(
                        tenant = %tenant.id,
                        owner_id,
                        amount_kop,
                        "daily charge applied"
                    );
                }
                ChargeOutcome::Partial { amount_kop, minutes_paid } => {
                    report.tenants_paused += 1;
                    report.charged_kop += amount_kop;
                    charged_total += amount_kop;
                    if amount_kop > 0 {
                        debited += 1;
                    }
                    if let Err(err) = self
                        .tenants
                        .advance_billing_cursor(owner_id, &tenant.id, plan.rate_kop, now)
                        .await
                    {
                        warn!(?err, tenant = %tenant.id, owner_id, "cursor advance failed after charge");
                    }
                    if let Err(err) = self.tenants.set_paused(&tenant.id, "billing").await {
                        warn!(?err, tenant = %tenant.id, owner_id, "pause failed");
                    }
                    info!(
                        tenant = %tenant.id,
                        owner_id,
                        amount_kop,
                        minutes_paid,
                        "insufficient balance, tenant paused"
                    );
                    let text = format!(
                        "Bot {} is paused: balance is insufficient for a full day of rental. Top up to resume.",
                        tenant.id
                    );
                    if let Err(err) = self.notifier.send(owner_id, &text).await {
                        warn!(?err, owner_id, tenant = %tenant.id, "pause notification failed");
                    }
                }
            }
        }

        Ok((charged_total, debited))
    }

    /// Decide what this tenant costs today, debiting the in-memory balance.
    /// No store writes happen here.
    async fn plan_charge(
        &self,
        tenant: &Tenant,
        balance: &mut i64,
        now: DateTime<Utc>,
    ) -> Result<PlannedCharge> {
        if let Some(last) = tenant.last_billed_at {
            if same_local_day(last, now) {
                return Ok(PlannedCharge {
                    rate_kop: 0,
                    outcome: ChargeOutcome::AlreadyBilled,
                });
            }
        }

        let rate = rates::resolve_rate(tenant, self.catalog.as_ref()).await?;
        if rate <= 0 {
            return Ok(PlannedCharge {
                rate_kop: 0,
                outcome: ChargeOutcome::Free,
            });
        }

        let need = rate * DAY_MINUTES;
        let floor = self.negative_limit_kop;

        if *balance - need >= floor {
            *balance -= need;
            return Ok(PlannedCharge {
                rate_kop: rate,
                outcome: ChargeOutcome::Charged { amount_kop: need },
            });
        }

        // The largest debit that keeps the balance at or above the floor.
        // Fractional minutes are not billed.
        let max_charge = (*balance - floor).max(0);
        let minutes_paid = if max_charge > 0 { max_charge / rate } else { 0 };
        *balance -= max_charge;
        Ok(PlannedCharge {
            rate_kop: rate,
            outcome: ChargeOutcome::Partial {
                amount_kop: max_charge,
                minutes_paid,
            },
        })
    }
}

fn same_local_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.with_timezone(&Local).date_naive() == b.with_timezone(&Local).date_naive()
}
