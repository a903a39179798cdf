use std::sync::Arc;

use chrono::{DateTime, Days, Local, TimeZone, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info, warn};

use super::service::BillingEngine;

/// key: billing-scheduler -> one engine run per local midnight
pub fn spawn(engine: Arc<BillingEngine>, stop: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(run_daily_scheduler(engine, stop))
}

/// Wait for the next local midnight, run the engine once, repeat. The stop
/// signal is observed inside the wait, not only between runs; an in-flight
/// run is allowed to finish so no tenant is left half-charged.
pub async fn run_daily_scheduler(engine: Arc<BillingEngine>, mut stop: watch::Receiver<bool>) {
    loop {
        let wait_secs = seconds_until_next_midnight(Local::now());
        debug!(wait_secs, "billing scheduler sleeping until next local midnight");
        tokio::select! {
            _ = time::sleep(TokioDuration::from_secs(wait_secs)) => {
                match engine.run_daily_billing(Utc::now()).await {
                    Ok(report) => info!(
                        tenants_seen = report.tenants_seen,
                        charged_kop = report.charged_kop,
                        "scheduled billing run completed"
                    ),
                    // The timer must survive a failed run; it retries at the
                    // next midnight (already-billed tenants are skipped).
                    Err(err) => warn!(?err, "scheduled billing run failed"),
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    info!("billing scheduler stopping");
                    return;
                }
            }
        }
    }
}

/// Seconds from `now` to the next local midnight, never less than 1.
pub fn seconds_until_next_midnight(now: DateTime<Local>) -> u64 {
    let next = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .unwrap_or_else(|| now + chrono::Duration::days(1));
    next.signed_duration_since(now).num_seconds().max(1) as u64
}
