use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::events::InboundEvent;
use crate::models::Tenant;
use crate::notify::Notifier;

/// Reserved key of the last-resort handler. Dispatch always evaluates it
/// after every other configured module.
pub const FALLBACK_MODULE: &str = "core";

/// One installed capability. Returns true when it claims the event; claiming
/// stops the chain. Handlers perform their own side effects (cart, catalog,
/// top-up flows) against their own collaborators.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    async fn handle(&self, tenant: &Tenant, event: &InboundEvent) -> Result<bool>;
}

/// key: module-registry -> register once at startup, resolve many
///
/// Built before the server starts and shared behind an `Arc`; there is no
/// interior mutability, so the installed set is fixed for the process lifetime.
#[derive(Default)]
pub struct ModuleRegistry {
    handlers: HashMap<String, Arc<dyn ModuleHandler>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert; the last registration for a key wins.
    pub fn register(&mut self, key: impl Into<String>, handler: Arc<dyn ModuleHandler>) {
        self.handlers.insert(key.into(), handler);
    }

    pub fn resolve(&self, key: &str) -> Option<Arc<dyn ModuleHandler>> {
        self.handlers.get(key).cloned()
    }

    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Default reply when no installed module claims an event. Registered under
/// [`FALLBACK_MODULE`] in main so every configured chain ends in a response.
pub struct FallbackResponder {
    notifier: Arc<dyn Notifier>,
}

impl FallbackResponder {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl ModuleHandler for FallbackResponder {
    async fn handle(&self, tenant: &Tenant, event: &InboundEvent) -> Result<bool> {
        if let Err(err) = self
            .notifier
            .send(event.chat_id, "Command not recognized. Send /help for the menu.")
            .await
        {
            tracing::warn!(?err, tenant = %tenant.id, chat_id = event.chat_id, "fallback reply failed");
        }
        Ok(true)
    }
}
