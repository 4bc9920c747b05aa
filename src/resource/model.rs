//! Managed resource model
//!
//! Plain data describing a virtual machine as the provider reports it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Power state of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    #[default]
    Off,
    On,
    /// Not in a steady on/off state: mid-change or suspended
    Transitioning,
}

impl PowerState {
    /// Map a vCenter `power_state` value
    pub fn from_api(value: &str) -> Self {
        match value {
            "POWERED_ON" => Self::On,
            "POWERED_OFF" => Self::Off,
            _ => Self::Transitioning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "poweredOff",
            Self::On => "poweredOn",
            Self::Transitioning => "transitioning",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current snapshot of a resource (no snapshot tree is modelled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Sizing and guest information used by the inventory report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceDetails {
    #[serde(default)]
    pub cpu_count: Option<u32>,
    #[serde(default)]
    pub memory_mib: Option<u64>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// A virtual machine under lifecycle control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedResource {
    /// Provider identifier (e.g. `vm-1042`); defaults to the name when loaded from a file
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: PowerState,
    #[serde(default)]
    pub snapshot: Option<Snapshot>,
    /// Parent grouping clones are placed into
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub details: ResourceDetails,
}

impl ManagedResource {
    pub fn new(id: &str, name: &str, state: PowerState) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            state,
            snapshot: None,
            folder: None,
            details: ResourceDetails::default(),
        }
    }

    pub fn with_snapshot(mut self, name: &str) -> Self {
        self.snapshot = Some(Snapshot {
            id: format!("{}-snap", self.id),
            name: name.to_string(),
            description: String::new(),
        });
        self
    }

    pub fn with_folder(mut self, folder: &str) -> Self {
        self.folder = Some(folder.to_string());
        self
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}
