//! Inventory report
//!
//! Session details plus name, power state, sizing and guest address for
//! every VM matching a filter.

use crate::provider::{ResourceProvider, SessionInfo};
use crate::resource::{filter_resources, PowerState};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt;

/// Shown when no guest address is available
pub const NO_GUEST_IP: &str = "Guest tools not running or no IP";

/// One VM's line items
#[derive(Debug, Clone, PartialEq)]
pub struct VmRow {
    pub name: String,
    pub power_state: PowerState,
    pub cpu_count: Option<u32>,
    pub memory_mib: Option<u64>,
    pub ip_address: Option<String>,
}

impl VmRow {
    pub fn memory_gb(&self) -> Option<f64> {
        self.memory_mib.map(|mib| mib as f64 / 1024.0)
    }
}

impl fmt::Display for VmRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VM Name: {}", self.name)?;
        writeln!(f, "Power State: {}", self.power_state)?;
        match self.cpu_count {
            Some(cpus) => writeln!(f, "Number of CPUs: {}", cpus)?,
            None => writeln!(f, "Number of CPUs: -")?,
        }
        match self.memory_gb() {
            Some(gb) => writeln!(f, "Memory: {:.2} GB", gb)?,
            None => writeln!(f, "Memory: -")?,
        }
        write!(
            f,
            "IP Address: {}",
            self.ip_address.as_deref().unwrap_or(NO_GUEST_IP)
        )
    }
}

/// Session header plus the matching VMs
#[derive(Debug, Clone)]
pub struct InventoryReport {
    pub session: SessionInfo,
    pub generated_at: DateTime<Local>,
    pub rows: Vec<VmRow>,
}

impl InventoryReport {
    pub fn session_lines(&self) -> Vec<String> {
        vec![
            format!("DOMAIN/Username: {}", self.session.user),
            format!("Endpoint: {}", self.session.host),
            format!(
                "Source IP: {}",
                self.session
                    .source_ip
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
            format!("Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S")),
        ]
    }
}

/// Collect the report for VMs whose name matches `query`
pub async fn build_report<P>(provider: &P, query: Option<&str>) -> Result<InventoryReport>
where
    P: ResourceProvider + ?Sized,
{
    let session = provider
        .session_info()
        .await
        .context("Failed to read session info")?;
    let inventory = provider
        .list_resources()
        .await
        .context("Failed to list VMs")?;
    let selection = filter_resources(&inventory, query);

    let mut rows = Vec::with_capacity(selection.len());
    for res in selection {
        let ip_address = match res.details.ip_address.clone() {
            Some(ip) => Some(ip),
            None if res.state == PowerState::On => provider.guest_ip(&res.id).await?,
            None => None,
        };

        rows.push(VmRow {
            name: res.name,
            power_state: res.state,
            cpu_count: res.details.cpu_count,
            memory_mib: res.details.memory_mib,
            ip_address,
        });
    }

    Ok(InventoryReport {
        session,
        generated_at: Local::now(),
        rows,
    })
}
