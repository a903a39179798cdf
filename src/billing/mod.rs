pub mod api;
pub mod models;
pub mod rates;
pub mod scheduler;
pub mod service;

pub use models::{BillingRunReport, ChargeOutcome};
pub use rates::{major_to_kop, resolve_rate, DAY_MINUTES};
pub use scheduler::{run_daily_scheduler, spawn as spawn_billing_scheduler};
pub use service::BillingEngine;
