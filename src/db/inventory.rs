//! TOML inventory of hosts, endpoints and channels used to seed the in-memory store.
use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{error, info};

use super::memory::InMemoryStore;
use super::models::{Endpoint, Host};
use crate::notifications::models::NotificationChannel;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Failed to read inventory file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse inventory: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Endpoint {endpoint_id} references unknown host {host_id}")]
    UnknownHost { endpoint_id: i32, host_id: i32 },
}

#[derive(Deserialize, Debug, Default)]
pub struct Inventory {
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
}

impl Inventory {
    pub fn parse(contents: &str) -> Result<Self, InventoryError> {
        let inventory: Inventory = toml::from_str(contents)?;
        inventory.validate()?;
        Ok(inventory)
    }

    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        info!(path = ?path, "Loading inventory.");
        let contents = fs::read_to_string(path).map_err(|e| {
            error!(path = ?path, error = %e, "Failed to read inventory file.");
            InventoryError::Read {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        Self::parse(&contents)
    }

    fn validate(&self) -> Result<(), InventoryError> {
        for endpoint in &self.endpoints {
            if !self.hosts.iter().any(|h| h.id == endpoint.host_id) {
                return Err(InventoryError::UnknownHost {
                    endpoint_id: endpoint.id,
                    host_id: endpoint.host_id,
                });
            }
        }
        Ok(())
    }

    pub fn apply_to(self, store: &InMemoryStore) {
        info!(
            hosts = self.hosts.len(),
            endpoints = self.endpoints.len(),
            channels = self.channels.len(),
            "Seeding store from inventory."
        );
        for host in self.hosts {
            store.upsert_host(host);
        }
        for endpoint in self.endpoints {
            store.upsert_endpoint(endpoint);
        }
        for channel in self.channels {
            store.upsert_channel(channel);
        }
    }
}
