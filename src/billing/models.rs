use serde::Serialize;

/// What one tenant's daily pass did to the owner balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Full day debited.
    Charged { amount_kop: i64 },
    /// Balance hit the floor; whatever fit was debited and the tenant paused.
    Partial { amount_kop: i64, minutes_paid: i64 },
    /// No positive rate resolved; cursor advanced, nothing debited.
    Free,
    /// Cursor already inside today's calendar date.
    AlreadyBilled,
}

/// key: billing-run-report -> one row per engine invocation
#[derive(Debug, Default, Clone, Serialize)]
pub struct BillingRunReport {
    pub tenants_seen: usize,
    pub tenants_charged: usize,
    pub tenants_paused: usize,
    pub tenants_free: usize,
    pub tenants_skipped: usize,
    pub tenants_failed: usize,
    pub charged_kop: i64,
}
