//! Collaborator interfaces the engine reads configuration from and writes results to.
//!
//! Persistence is owned elsewhere; the engine only sees these traits. [`memory::InMemoryStore`]
//! implements all of them for the standalone binary and for tests.
use async_trait::async_trait;
use thiserror::Error;

use crate::notifications::models::{NotificationChannel, NotificationEvent};

pub mod inventory;
pub mod memory;
pub mod models;

use models::{Endpoint, Host, ProbeOutcome};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Read access to the latest committed monitoring configuration.
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    async fn get_endpoint(&self, endpoint_id: i32) -> Result<Option<Endpoint>, StoreError>;

    async fn get_host(&self, host_id: i32) -> Result<Option<Host>, StoreError>;

    /// Every enabled endpoint joined with its host. Endpoints whose host is missing are left out.
    async fn list_enabled_endpoints(&self) -> Result<Vec<(Endpoint, Host)>, StoreError>;

    async fn get_channel(&self, channel_id: i32) -> Result<Option<NotificationChannel>, StoreError>;
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_probe_outcome(&self, outcome: &ProbeOutcome) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DeliveryLogSink: Send + Sync {
    async fn record_delivery_log(&self, event: &NotificationEvent) -> Result<(), StoreError>;
}
