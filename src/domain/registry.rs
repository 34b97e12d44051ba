use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::host::{ConnectionStatus, HostConnectionSpec};
use crate::config::HostRecord;
use crate::error::{BridgeError, Result};
use crate::ports::HostRegistry;

/// Latest status reported for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEntry {
    pub status: ConnectionStatus,
    pub at: DateTime<Utc>,
}

/// Host registry backed by the `hosts` section of the config file.
pub struct ConfigHostRegistry {
    hosts: HashMap<u64, HostRecord>,
    status: Mutex<HashMap<u64, StatusEntry>>,
}

impl ConfigHostRegistry {
    #[must_use]
    pub fn new(hosts: HashMap<u64, HostRecord>) -> Self {
        Self {
            hosts,
            status: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the recorded statuses
    pub async fn statuses(&self) -> HashMap<u64, StatusEntry> {
        self.status.lock().await.clone()
    }
}

#[async_trait]
impl HostRegistry for ConfigHostRegistry {
    async fn resolve(&self, host_id: u64) -> Result<HostConnectionSpec> {
        self.hosts
            .get(&host_id)
            .map(|record| HostConnectionSpec::from_record(host_id, record))
            .ok_or(BridgeError::UnknownHost { host_id })
    }

    async fn record_status(&self, host_id: u64, status: ConnectionStatus) {
        debug!(host_id, ?status, "Recording connection status");
        self.status.lock().await.insert(
            host_id,
            StatusEntry {
                status,
                at: Utc::now(),
            },
        );
    }
}
