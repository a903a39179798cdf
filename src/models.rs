use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// key: tenant-model -> rented bot instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub owner_id: i64,
    pub status: TenantStatus,
    pub paused_reason: Option<String>,
    pub product_key: Option<String>,
    /// Per-tenant rate override in kop per minute; 0 means "use the catalog rate".
    pub rate_per_minute_kop: i64,
    /// Rate actually applied by the most recent billing pass.
    pub last_billed_rate_kop: i64,
    pub last_billed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Paused,
    Expired,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Paused => "paused",
            TenantStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(TenantStatus::Active),
            "paused" => Some(TenantStatus::Paused),
            "expired" => Some(TenantStatus::Expired),
            _ => None,
        }
    }
}

/// key: owner-account-model -> one prepaid balance per owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerAccount {
    pub owner_id: i64,
    pub balance_kop: i64,
    pub updated_at: DateTime<Utc>,
}

/// Closed set of balance-affecting event kinds. String-coded in storage so the
/// ledger stays readable from SQL; exhaustive here so tests can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    DailyCharge,
    DailyChargePartial,
    Topup,
    Withdrawal,
    Adjustment,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::DailyCharge => "daily_charge",
            LedgerKind::DailyChargePartial => "daily_charge_partial",
            LedgerKind::Topup => "topup",
            LedgerKind::Withdrawal => "withdrawal",
            LedgerKind::Adjustment => "adjustment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily_charge" => Some(LedgerKind::DailyCharge),
            "daily_charge_partial" => Some(LedgerKind::DailyChargePartial),
            "topup" => Some(LedgerKind::Topup),
            "withdrawal" => Some(LedgerKind::Withdrawal),
            "adjustment" => Some(LedgerKind::Adjustment),
            _ => None,
        }
    }
}

/// key: ledger-model -> append-only money movements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub owner_id: i64,
    /// None for owner-level events such as top-ups.
    pub tenant_id: Option<String>,
    pub kind: LedgerKind,
    /// Signed; negative = debit.
    pub amount_kop: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry not yet written. Drafts are handed to
/// `AccountStore::commit` together with the balance they explain, so an entry
/// can never land without its balance effect or the other way around.
#[derive(Debug, Clone)]
pub struct LedgerDraft {
    pub kind: LedgerKind,
    pub amount_kop: i64,
    pub tenant_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Catalog row for a rentable product. Legacy rows carry the per-minute price
/// as a float in major units instead of an integer kop figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub key: String,
    pub rate_kop_per_minute: Option<i64>,
    pub rate_major_per_minute: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_kind_round_trips_through_storage_codes() {
        let kinds = [
            LedgerKind::DailyCharge,
            LedgerKind::DailyChargePartial,
            LedgerKind::Topup,
            LedgerKind::Withdrawal,
            LedgerKind::Adjustment,
        ];
        for kind in kinds {
            assert_eq!(LedgerKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LedgerKind::parse("refund"), None);
    }

    #[test]
    fn tenant_status_rejects_unknown_codes() {
        assert_eq!(TenantStatus::parse("active"), Some(TenantStatus::Active));
        assert_eq!(TenantStatus::parse("deleted"), None);
    }
}
