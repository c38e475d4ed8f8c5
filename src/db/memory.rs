use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;

use super::models::{Endpoint, Host, ProbeOutcome};
use super::{DeliveryLogSink, MonitorRepository, ResultSink, StoreError};
use crate::notifications::models::{NotificationChannel, NotificationEvent};

const DEFAULT_RESULT_RETENTION: usize = 1000;

/// Process-local store backing every collaborator trait.
///
/// Outcomes are kept in a bounded ring (oldest dropped first); delivery logs are unbounded.
pub struct InMemoryStore {
    hosts: DashMap<i32, Host>,
    endpoints: DashMap<i32, Endpoint>,
    channels: DashMap<i32, NotificationChannel>,
    outcomes: Mutex<VecDeque<ProbeOutcome>>,
    delivery_logs: Mutex<Vec<NotificationEvent>>,
    result_retention: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_RETENTION)
    }
}

impl InMemoryStore {
    pub fn new(result_retention: usize) -> Self {
        Self {
            hosts: DashMap::new(),
            endpoints: DashMap::new(),
            channels: DashMap::new(),
            outcomes: Mutex::new(VecDeque::new()),
            delivery_logs: Mutex::new(Vec::new()),
            result_retention: result_retention.max(1),
        }
    }

    pub fn upsert_host(&self, host: Host) {
        self.hosts.insert(host.id, host);
    }

    pub fn upsert_endpoint(&self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.id, endpoint);
    }

    pub fn upsert_channel(&self, channel: NotificationChannel) {
        self.channels.insert(channel.id, channel);
    }

    /// Removes the host and every endpoint under it.
    pub fn delete_host(&self, host_id: i32) -> Option<Host> {
        self.endpoints.retain(|_, endpoint| endpoint.host_id != host_id);
        self.hosts.remove(&host_id).map(|(_, host)| host)
    }

    pub fn delete_endpoint(&self, endpoint_id: i32) -> Option<Endpoint> {
        self.endpoints.remove(&endpoint_id).map(|(_, endpoint)| endpoint)
    }

    pub fn delete_channel(&self, channel_id: i32) -> Option<NotificationChannel> {
        self.channels.remove(&channel_id).map(|(_, channel)| channel)
    }

    /// Toggles an endpoint's enabled flag. Returns false if the endpoint does not exist.
    pub fn set_endpoint_enabled(&self, endpoint_id: i32, enabled: bool) -> bool {
        match self.endpoints.get_mut(&endpoint_id) {
            Some(mut endpoint) => {
                endpoint.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn endpoint_ids_for_host(&self, host_id: i32) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .endpoints
            .iter()
            .filter(|e| e.host_id == host_id)
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Retained outcomes for one endpoint, oldest first.
    pub async fn recent_outcomes(&self, endpoint_id: i32) -> Vec<ProbeOutcome> {
        self.outcomes
            .lock()
            .await
            .iter()
            .filter(|o| o.endpoint_id == endpoint_id)
            .cloned()
            .collect()
    }

    pub async fn outcome_count(&self) -> usize {
        self.outcomes.lock().await.len()
    }

    pub async fn delivery_logs(&self) -> Vec<NotificationEvent> {
        self.delivery_logs.lock().await.clone()
    }
}

#[async_trait]
impl MonitorRepository for InMemoryStore {
    async fn get_endpoint(&self, endpoint_id: i32) -> Result<Option<Endpoint>, StoreError> {
        Ok(self.endpoints.get(&endpoint_id).map(|e| e.value().clone()))
    }

    async fn get_host(&self, host_id: i32) -> Result<Option<Host>, StoreError> {
        Ok(self.hosts.get(&host_id).map(|h| h.value().clone()))
    }

    async fn list_enabled_endpoints(&self) -> Result<Vec<(Endpoint, Host)>, StoreError> {
        let mut joined: Vec<(Endpoint, Host)> = self
            .endpoints
            .iter()
            .filter(|e| e.enabled)
            .filter_map(|e| {
                self.hosts
                    .get(&e.host_id)
                    .map(|h| (e.value().clone(), h.value().clone()))
            })
            .collect();
        joined.sort_by_key(|(endpoint, _)| endpoint.id);
        Ok(joined)
    }

    async fn get_channel(&self, channel_id: i32) -> Result<Option<NotificationChannel>, StoreError> {
        Ok(self.channels.get(&channel_id).map(|c| c.value().clone()))
    }
}

#[async_trait]
impl ResultSink for InMemoryStore {
    async fn record_probe_outcome(&self, outcome: &ProbeOutcome) -> Result<(), StoreError> {
        let mut outcomes = self.outcomes.lock().await;
        while outcomes.len() >= self.result_retention {
            outcomes.pop_front();
        }
        outcomes.push_back(outcome.clone());
        debug!(
            endpoint_id = outcome.endpoint_id,
            success = outcome.success,
            "Recorded probe outcome."
        );
        Ok(())
    }
}

#[async_trait]
impl DeliveryLogSink for InMemoryStore {
    async fn record_delivery_log(&self, event: &NotificationEvent) -> Result<(), StoreError> {
        self.delivery_logs.lock().await.push(event.clone());
        Ok(())
    }
}
