use axum::{extract::Extension, Json};
use chrono::Utc;

use crate::api::AppState;
use crate::error::AppResult;

use super::models::BillingRunReport;

/// key: billing-api -> on-demand engine run
///
/// Safe to call at any time: the engine skips tenants already billed within
/// the current local calendar day.
pub async fn run_billing(
    Extension(state): Extension<AppState>,
) -> AppResult<Json<BillingRunReport>> {
    let report = state.engine.run_daily_billing(Utc::now()).await?;
    Ok(Json(report))
}
