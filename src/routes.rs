use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, billing};

pub fn api_routes() -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/tenants/:tenant_id/events", post(api::ingest_event))
        .route("/api/owners/:owner_id/balance", get(api::get_balance))
        .route("/api/owners/:owner_id/topup", post(api::top_up))
        .route("/api/owners/:owner_id/withdraw", post(api::withdraw))
        .route("/api/owners/:owner_id/ledger", get(api::list_ledger))
        .route("/api/owners/:owner_id/reconcile", get(api::reconcile))
        .route("/api/billing/run", post(billing::api::run_billing))
        .route("/api/modules", get(api::list_modules))
}
