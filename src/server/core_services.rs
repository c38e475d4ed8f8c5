//! Wires the store, executor, notification service and scheduler together, and exposes the
//! lifecycle operations a configuration layer calls when it changes hosts and endpoints.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::config::ServerConfig;
use crate::clock::{Clock, SystemClock};
use crate::db::inventory::{Inventory, InventoryError};
use crate::db::memory::InMemoryStore;
use crate::db::MonitorRepository;
use crate::monitoring::executor::{ExecutorError, ExecutorSettings, ProbeExecutor};
use crate::monitoring::scheduler::MonitorScheduler;
use crate::monitoring::script::{ScriptExecutor, UnavailableScriptExecutor};
use crate::notifications::senders::webhook::WebhookSender;
use crate::notifications::service::NotificationService;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

pub struct CoreServices {
    pub store: Arc<InMemoryStore>,
    pub notifications: Arc<NotificationService>,
    pub scheduler: Arc<MonitorScheduler>,
}

impl CoreServices {
    pub fn build(
        config: &ServerConfig,
        store: Arc<InMemoryStore>,
        script_executor: Arc<dyn ScriptExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let executor = Arc::new(ProbeExecutor::new(
            ExecutorSettings {
                default_timeout_ms: config.default_timeout_ms,
                user_agent: config.user_agent.clone(),
            },
            script_executor,
        )?);
        let sender = Arc::new(WebhookSender::new(Duration::from_secs(config.webhook_timeout_secs.max(1))));
        let notifications = Arc::new(NotificationService::new(
            store.clone(),
            store.clone(),
            sender,
            clock.clone(),
        ));
        let scheduler = Arc::new(MonitorScheduler::new(
            store.clone(),
            executor,
            store.clone(),
            notifications.clone(),
            clock,
        ));

        Ok(Self {
            store,
            notifications,
            scheduler,
        })
    }

    /// Seeds a fresh store from the configured inventory file.
    pub fn from_config(config: &ServerConfig) -> Result<Self, CoreError> {
        let store = Arc::new(InMemoryStore::new(config.result_retention));
        Inventory::load(Path::new(&config.inventory_path))?.apply_to(&store);
        Self::build(
            config,
            store,
            Arc::new(UnavailableScriptExecutor),
            Arc::new(SystemClock),
        )
    }

    /// Enables or disables an endpoint and brings its timer in line.
    pub async fn set_endpoint_enabled(&self, endpoint_id: i32, enabled: bool) -> bool {
        if !self.store.set_endpoint_enabled(endpoint_id, enabled) {
            return false;
        }
        if enabled {
            self.scheduler.add_endpoint(endpoint_id, None).await
        } else {
            self.scheduler.remove_endpoint(endpoint_id);
            true
        }
    }

    pub async fn delete_endpoint(&self, endpoint_id: i32) {
        self.scheduler.remove_endpoint(endpoint_id);
        if let Some(endpoint) = self.store.delete_endpoint(endpoint_id) {
            self.notifications
                .clear_endpoint_state(endpoint.host_id, endpoint_id)
                .await;
            info!(endpoint_id, host_id = endpoint.host_id, "Deleted endpoint.");
        }
    }

    pub async fn delete_host(&self, host_id: i32) {
        for endpoint_id in self.store.endpoint_ids_for_host(host_id) {
            self.scheduler.remove_endpoint(endpoint_id);
        }
        self.store.delete_host(host_id);
        self.notifications.clear_host_state(host_id).await;
        info!(host_id, "Deleted host.");
    }

    /// Re-applies a host's configuration to all of its endpoints.
    pub async fn reload_host(&self, host_id: i32) -> usize {
        let host_enabled = matches!(self.store.get_host(host_id).await, Ok(Some(host)) if host.enabled);
        let mut scheduled = 0;
        for endpoint_id in self.store.endpoint_ids_for_host(host_id) {
            if host_enabled && self.scheduler.update_endpoint(endpoint_id).await {
                scheduled += 1;
            } else if !host_enabled {
                self.scheduler.remove_endpoint(endpoint_id);
            }
        }
        scheduled
    }
}
