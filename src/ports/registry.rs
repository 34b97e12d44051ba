use async_trait::async_trait;

use crate::domain::{ConnectionStatus, HostConnectionSpec};
use crate::error::Result;

/// Source of host connection records.
#[async_trait]
pub trait HostRegistry: Send + Sync {
    /// Look up a host. Unknown ids fail with `UnknownHost`.
    async fn resolve(&self, host_id: u64) -> Result<HostConnectionSpec>;

    /// Record the outcome of a terminal session. Best effort.
    async fn record_status(&self, _host_id: u64, _status: ConnectionStatus) {}
}
