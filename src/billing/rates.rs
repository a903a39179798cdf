use anyhow::Result;

use crate::models::Tenant;
use crate::store::ProductCatalog;

/// Minutes in one billable day.
pub const DAY_MINUTES: i64 = 1440;

/// Convert a legacy major-unit-per-minute float rate to kop per minute.
///
/// Rounding is half-up (0.125 major -> 13 kop). Non-finite and non-positive
/// inputs resolve to 0 so malformed catalog rows degrade the tenant to free
/// instead of failing the run.
pub fn major_to_kop(rate_major: f64) -> i64 {
    if !rate_major.is_finite() || rate_major <= 0.0 {
        return 0;
    }
    (rate_major * 100.0 + 0.5).floor() as i64
}

/// Resolve the per-minute rate for a tenant, in kop.
///
/// Priority: explicit per-tenant override, then the catalog's integer kop
/// rate, then the catalog's legacy major-unit rate. Anything else is free.
pub async fn resolve_rate(tenant: &Tenant, catalog: &dyn ProductCatalog) -> Result<i64> {
    if tenant.rate_per_minute_kop > 0 {
        return Ok(tenant.rate_per_minute_kop);
    }
    let Some(key) = tenant.product_key.as_deref() else {
        return Ok(0);
    };
    let Some(product) = catalog.lookup(key).await? else {
        return Ok(0);
    };
    if let Some(kop) = product.rate_kop_per_minute {
        if kop > 0 {
            return Ok(kop);
        }
    }
    if let Some(major) = product.rate_major_per_minute {
        return Ok(major_to_kop(major));
    }
    Ok(0)
}
