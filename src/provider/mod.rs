//! Resource providers
//!
//! A provider owns the inventory and carries out lifecycle requests on
//! behalf of the controller. Each mutating call returns a [`TaskHandle`]
//! that is resolved by polling [`ResourceProvider::poll_task`].
//!
//! # Module Structure
//!
//! - [`memory`] - In-process inventory, used for simulation and tests
//! - [`rest`] - vCenter-style REST endpoint

pub mod memory;
pub mod rest;

use crate::resource::ManagedResource;
use anyhow::Result;
use async_trait::async_trait;
use std::net::{IpAddr, UdpSocket};

pub use memory::InMemoryProvider;
pub use rest::RestProvider;

/// Token for a task running on the provider side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskHandle {
    /// Task accepted, poll by id until it finishes
    Pending(String),
    /// The provider finished the work before returning
    Done,
}

/// Status of a submitted task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Succeeded,
    Failed(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// Who is connected where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user: String,
    pub host: String,
    pub source_ip: Option<IpAddr>,
}

/// Inventory and lifecycle capability of a management endpoint
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Fetch the full inventory
    async fn list_resources(&self) -> Result<Vec<ManagedResource>>;

    async fn power_on(&self, id: &str) -> Result<TaskHandle>;

    async fn power_off(&self, id: &str) -> Result<TaskHandle>;

    async fn create_snapshot(&self, id: &str, name: &str, description: &str)
        -> Result<TaskHandle>;

    /// Revert to the current snapshot
    async fn revert_to_snapshot(&self, id: &str) -> Result<TaskHandle>;

    /// Clone into the source's folder, powered off
    async fn clone_resource(&self, id: &str, new_name: &str) -> Result<TaskHandle>;

    async fn destroy(&self, id: &str) -> Result<TaskHandle>;

    async fn poll_task(&self, handle: &TaskHandle) -> Result<TaskStatus>;

    /// Stop tracking a task the caller gave up waiting on, cancelling it
    /// where the endpoint allows
    async fn abandon_task(&self, handle: &TaskHandle) -> Result<()>;

    async fn session_info(&self) -> Result<SessionInfo>;

    /// Guest IP address, if guest tools are running and report one
    async fn guest_ip(&self, id: &str) -> Result<Option<String>>;

    /// Release the session
    async fn disconnect(&self) -> Result<()>;
}

/// Local address this machine uses to reach `host`.
///
/// No packets are sent; connecting a UDP socket only selects a route.
pub fn source_ip_towards(host: &str) -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect((host, 443)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_terminal() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed("boom".into()).is_terminal());
    }

    #[test]
    fn test_source_ip_for_loopback() {
        let ip = source_ip_towards("127.0.0.1");
        assert!(ip.map(|ip| ip.is_loopback()).unwrap_or(true));
    }
}
