use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::accounts::{AccountService, ReconciliationReport};
use crate::billing::BillingEngine;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{AppError, AppResult};
use crate::events::InboundEvent;
use crate::models::{LedgerEntry, TenantStatus};
use crate::modules::ModuleRegistry;
use crate::store::TenantStore;

/// Shared handler state, layered as an axum `Extension` in main and in tests.
#[derive(Clone)]
pub struct AppState {
    pub tenants: Arc<dyn TenantStore>,
    pub accounts: AccountService,
    pub dispatcher: Arc<Dispatcher>,
    pub engine: Arc<BillingEngine>,
    pub registry: Arc<ModuleRegistry>,
}

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub handled: bool,
    pub handled_by: Option<String>,
    pub failures: Vec<String>,
}

impl From<DispatchOutcome> for DispatchResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        Self {
            handled: outcome.handled(),
            handled_by: outcome.handled_by,
            failures: outcome
                .failures
                .into_iter()
                .map(|failure| format!("{}: {}", failure.module, failure.error))
                .collect(),
        }
    }
}

/// key: event-ingest -> webhook entry into the dispatch router
pub async fn ingest_event(
    Extension(state): Extension<AppState>,
    Path(tenant_id): Path<String>,
    Json(event): Json<InboundEvent>,
) -> AppResult<Json<DispatchResponse>> {
    let tenant = state
        .tenants
        .get(&tenant_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if tenant.status != TenantStatus::Active {
        return Err(AppError::BadRequest(format!(
            "tenant {tenant_id} is {}",
            tenant.status.as_str()
        )));
    }
    let outcome = state.dispatcher.dispatch(&tenant, &event).await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub owner_id: i64,
    pub balance_kop: i64,
}

pub async fn get_balance(
    Extension(state): Extension<AppState>,
    Path(owner_id): Path<i64>,
) -> AppResult<Json<BalanceResponse>> {
    let balance_kop = state.accounts.balance(owner_id).await?;
    Ok(Json(BalanceResponse {
        owner_id,
        balance_kop,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount_kop: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn top_up(
    Extension(state): Extension<AppState>,
    Path(owner_id): Path<i64>,
    Json(request): Json<TopUpRequest>,
) -> AppResult<Json<BalanceResponse>> {
    let balance_kop = state
        .accounts
        .top_up(owner_id, request.amount_kop, request.comment)
        .await?;
    Ok(Json(BalanceResponse {
        owner_id,
        balance_kop,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount_kop: i64,
}

pub async fn withdraw(
    Extension(state): Extension<AppState>,
    Path(owner_id): Path<i64>,
    Json(request): Json<WithdrawRequest>,
) -> AppResult<Json<BalanceResponse>> {
    let balance_kop = state.accounts.withdraw(owner_id, request.amount_kop).await?;
    Ok(Json(BalanceResponse {
        owner_id,
        balance_kop,
    }))
}

pub async fn list_ledger(
    Extension(state): Extension<AppState>,
    Path(owner_id): Path<i64>,
) -> AppResult<Json<Vec<LedgerEntry>>> {
    let entries = state.accounts.ledger(owner_id).await?;
    Ok(Json(entries))
}

pub async fn reconcile(
    Extension(state): Extension<AppState>,
    Path(owner_id): Path<i64>,
) -> AppResult<Json<ReconciliationReport>> {
    let report = state.accounts.reconcile(owner_id).await?;
    Ok(Json(report))
}

pub async fn list_modules(
    Extension(state): Extension<AppState>,
) -> Json<Vec<String>> {
    Json(state.registry.list_keys())
}
