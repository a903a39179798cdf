use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::events::InboundEvent;
use crate::models::Tenant;
use crate::modules::{ModuleRegistry, FALLBACK_MODULE};
use crate::store::TenantStore;

/// A handler that failed while evaluating an event. Dispatch keeps walking
/// the chain; failures are surfaced here so the caller can log or report them.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleFailure {
    pub module: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// Key of the module that claimed the event, if any.
    pub handled_by: Option<String>,
    pub failures: Vec<ModuleFailure>,
}

impl DispatchOutcome {
    pub fn handled(&self) -> bool {
        self.handled_by.is_some()
    }
}

/// key: dispatch-router -> first claiming module wins
pub struct Dispatcher {
    registry: Arc<ModuleRegistry>,
    tenants: Arc<dyn TenantStore>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModuleRegistry>, tenants: Arc<dyn TenantStore>) -> Self {
        Self { registry, tenants }
    }

    /// Walk the tenant's configured module chain in order and stop at the
    /// first handler that claims the event. At most one module handles a
    /// given event; handlers run sequentially, never fanned out.
    pub async fn dispatch(&self, tenant: &Tenant, event: &InboundEvent) -> Result<DispatchOutcome> {
        let keys = self.tenants.active_modules(&tenant.id).await?;
        let keys = order_with_fallback(keys);

        let mut failures = Vec::new();
        for key in keys {
            let Some(handler) = self.registry.resolve(&key) else {
                // Configured but not installed; not a dispatch error.
                debug!(module = %key, tenant = %tenant.id, "module not installed, skipping");
                continue;
            };
            match handler.handle(tenant, event).await {
                Ok(true) => {
                    debug!(module = %key, tenant = %tenant.id, "event handled");
                    return Ok(DispatchOutcome {
                        handled_by: Some(key),
                        failures,
                    });
                }
                Ok(false) => continue,
                Err(err) => {
                    // A throwing handler counts as "did not handle"; it must
                    // not block the rest of the chain for this event.
                    warn!(?err, module = %key, tenant = %tenant.id, "module handler failed");
                    failures.push(ModuleFailure {
                        module: key,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(DispatchOutcome {
            handled_by: None,
            failures,
        })
    }
}

/// The reserved fallback key is always evaluated last, wherever the tenant
/// configuration placed it. It is only appended when configured at all.
fn order_with_fallback(mut keys: Vec<String>) -> Vec<String> {
    let had_fallback = keys.iter().any(|key| key == FALLBACK_MODULE);
    keys.retain(|key| key != FALLBACK_MODULE);
    if had_fallback {
        keys.push(FALLBACK_MODULE.to_string());
    }
    keys
}
