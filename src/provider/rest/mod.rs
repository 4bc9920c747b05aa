//! REST provider
//!
//! Talks to a vCenter-style Automation API. Mutating calls are issued with
//! `vmw-tasks=true` so the endpoint answers with a task id, which is then
//! polled through `/api/cis/tasks/{task}`.
//!
//! - [`auth`] - Credentials and session token cache
//! - [`client`] - HTTP client with session handling

pub mod auth;
pub mod client;

use super::{source_ip_towards, ResourceProvider, SessionInfo, TaskHandle, TaskStatus};
use crate::resource::{ManagedResource, PowerState, ResourceDetails, Snapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use auth::Credentials;
use client::{endpoint_url, RestClient};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Entry of `GET /api/vcenter/vm`
#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
    power_state: String,
    #[serde(default)]
    cpu_count: Option<u32>,
    #[serde(rename = "memory_size_MiB", default)]
    memory_size_mib: Option<u64>,
}

/// Entry of `GET /api/vcenter/folder`
#[derive(Debug, Deserialize)]
struct FolderSummary {
    folder: String,
}

/// Body of `GET /api/vcenter/vm/{vm}/snapshots`
#[derive(Debug, Deserialize, Default)]
struct SnapshotState {
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Provider backed by a management endpoint's REST API
pub struct RestProvider {
    client: RestClient,
    /// VM id to parent folder, filled on demand for clone placement
    folders: Mutex<HashMap<String, String>>,
}

impl RestProvider {
    /// Resolve the endpoint and open a session
    pub async fn connect(host: &str, credentials: Credentials, insecure: bool) -> Result<Self> {
        let base = endpoint_url(host)?;
        let client = RestClient::new(base, credentials, insecure)?;
        client
            .login()
            .await
            .with_context(|| format!("Failed to open a session on {}", host))?;

        Ok(Self {
            client,
            folders: Mutex::new(HashMap::new()),
        })
    }

    fn vm_path(id: &str, rest: &str) -> String {
        format!("api/vcenter/vm/{}{}", urlencoding::encode(id), rest)
    }

    async fn current_snapshot(&self, id: &str) -> Result<SnapshotState> {
        let value = self.client.get(&Self::vm_path(id, "/snapshots")).await?;
        if value.is_null() {
            return Ok(SnapshotState::default());
        }
        serde_json::from_value(value).context("Failed to parse snapshot state")
    }

    fn cached_folder(&self, id: &str) -> Option<String> {
        self.folders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Find the VM folder holding `id`.
    ///
    /// The VM list summary carries no folder, so each VM folder is listed
    /// with a `folders` filter and every membership seen is cached.
    async fn folder_of(&self, id: &str) -> Result<Option<String>> {
        if let Some(folder) = self.cached_folder(id) {
            return Ok(Some(folder));
        }

        let value = self
            .client
            .get("api/vcenter/folder?type=VIRTUAL_MACHINE")
            .await?;
        let folders: Vec<FolderSummary> =
            serde_json::from_value(value).context("Failed to parse folder list")?;

        let mut members = HashMap::new();
        for folder in folders {
            let path = format!(
                "api/vcenter/vm?folders={}",
                urlencoding::encode(&folder.folder)
            );
            let vms: Vec<VmSummary> = serde_json::from_value(self.client.get(&path).await?)
                .with_context(|| format!("Failed to parse VMs of folder {}", folder.folder))?;
            for vm in vms {
                members.insert(vm.vm, folder.folder.clone());
            }
        }

        let found = members.get(id).cloned();
        self.folders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(members);
        Ok(found)
    }
}

/// Interpret the body of a task-returning call
fn task_handle_from(value: &Value) -> TaskHandle {
    match value {
        Value::String(task) => TaskHandle::Pending(task.clone()),
        Value::Object(map) => match map.get("value").and_then(|v| v.as_str()) {
            Some(task) => TaskHandle::Pending(task.to_string()),
            None => TaskHandle::Done,
        },
        _ => TaskHandle::Done,
    }
}

/// Interpret the body of `GET /api/cis/tasks/{task}`
fn task_status_from(value: &Value) -> TaskStatus {
    let status = value.get("status").and_then(|v| v.as_str()).unwrap_or("");
    match status {
        "SUCCEEDED" => TaskStatus::Succeeded,
        "FAILED" => TaskStatus::Failed(task_error_message(value)),
        "BLOCKED" | "PENDING" | "RUNNING" => TaskStatus::Running,
        other => {
            tracing::warn!("Unexpected task status {:?}, treating as running", other);
            TaskStatus::Running
        }
    }
}

fn task_error_message(value: &Value) -> String {
    let error = value.get("error");
    error
        .and_then(|e| e.get("messages"))
        .and_then(|m| m.get(0))
        .and_then(|m| m.get("default_message"))
        .or_else(|| error.and_then(|e| e.get("message")))
        .and_then(|v| v.as_str())
        .unwrap_or("task failed without an error message")
        .to_string()
}

#[async_trait]
impl ResourceProvider for RestProvider {
    async fn list_resources(&self) -> Result<Vec<ManagedResource>> {
        let value = self.client.get("api/vcenter/vm").await?;
        let summaries: Vec<VmSummary> =
            serde_json::from_value(value).context("Failed to parse VM list")?;

        let mut resources = Vec::with_capacity(summaries.len());

        for vm in summaries {
            let snapshot = match self.current_snapshot(&vm.vm).await {
                Ok(state) => state.current.map(|id| Snapshot {
                    name: state.name.unwrap_or_else(|| id.clone()),
                    description: state.description.unwrap_or_default(),
                    id,
                }),
                Err(e) => {
                    tracing::warn!("Failed to read snapshots of {}: {:#}", vm.name, e);
                    None
                }
            };

            resources.push(ManagedResource {
                id: vm.vm,
                name: vm.name,
                state: PowerState::from_api(&vm.power_state),
                snapshot,
                folder: None,
                details: ResourceDetails {
                    cpu_count: vm.cpu_count,
                    memory_mib: vm.memory_size_mib,
                    ip_address: None,
                },
            });
        }

        // Placement may have changed since the last lookup
        self.folders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!("Listed {} VMs", resources.len());
        Ok(resources)
    }

    async fn power_on(&self, id: &str) -> Result<TaskHandle> {
        let path = Self::vm_path(id, "/power?action=start&vmw-tasks=true");
        Ok(task_handle_from(&self.client.post(&path, None).await?))
    }

    async fn power_off(&self, id: &str) -> Result<TaskHandle> {
        let path = Self::vm_path(id, "/power?action=stop&vmw-tasks=true");
        Ok(task_handle_from(&self.client.post(&path, None).await?))
    }

    async fn create_snapshot(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<TaskHandle> {
        let body = json!({
            "name": name,
            "description": description,
            "memory": false,
            "quiesce": false,
        });
        let path = Self::vm_path(id, "/snapshots?vmw-tasks=true");
        Ok(task_handle_from(&self.client.post(&path, Some(&body)).await?))
    }

    async fn revert_to_snapshot(&self, id: &str) -> Result<TaskHandle> {
        let state = self.current_snapshot(id).await?;
        let Some(snapshot) = state.current else {
            return Err(anyhow::anyhow!("{} has no current snapshot", id));
        };

        let path = Self::vm_path(
            id,
            &format!(
                "/snapshots/{}?action=revert&vmw-tasks=true",
                urlencoding::encode(&snapshot)
            ),
        );
        Ok(task_handle_from(&self.client.post(&path, None).await?))
    }

    async fn clone_resource(&self, id: &str, new_name: &str) -> Result<TaskHandle> {
        let mut body = json!({
            "source": id,
            "name": new_name,
            "power_on": false,
        });
        match self.folder_of(id).await {
            Ok(Some(folder)) => body["placement"] = json!({ "folder": folder }),
            Ok(None) => tracing::warn!("No folder found for {}, using default placement", id),
            Err(e) => tracing::warn!("Folder lookup for {} failed: {:#}", id, e),
        }

        let value = self
            .client
            .post("api/vcenter/vm?action=clone&vmw-tasks=true", Some(&body))
            .await?;
        Ok(task_handle_from(&value))
    }

    async fn destroy(&self, id: &str) -> Result<TaskHandle> {
        let path = Self::vm_path(id, "?vmw-tasks=true");
        Ok(task_handle_from(&self.client.delete(&path).await?))
    }

    async fn poll_task(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let TaskHandle::Pending(task) = handle else {
            return Ok(TaskStatus::Succeeded);
        };
        let path = format!("api/cis/tasks/{}", urlencoding::encode(task));
        let value = self.client.get(&path).await?;
        Ok(task_status_from(&value))
    }

    async fn abandon_task(&self, handle: &TaskHandle) -> Result<()> {
        let TaskHandle::Pending(task) = handle else {
            return Ok(());
        };
        let path = format!("api/cis/tasks/{}?action=cancel", urlencoding::encode(task));
        self.client
            .post(&path, None)
            .await
            .with_context(|| format!("Failed to cancel task {}", task))?;
        tracing::info!("Cancelled task {}", task);
        Ok(())
    }

    async fn session_info(&self) -> Result<SessionInfo> {
        let value = self.client.get("api/session").await?;
        let user = value
            .get("user")
            .and_then(|v| v.as_str())
            .unwrap_or(self.client.user())
            .to_string();
        let host = self.client.base().host_str().unwrap_or_default().to_string();

        Ok(SessionInfo {
            source_ip: source_ip_towards(&host),
            user,
            host,
        })
    }

    async fn guest_ip(&self, id: &str) -> Result<Option<String>> {
        match self.client.get(&Self::vm_path(id, "/guest/identity")).await {
            Ok(value) => Ok(value
                .get("ip_address")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())),
            Err(e) => {
                // Guest tools not running answers 503
                tracing::debug!("No guest identity for {}: {:#}", id, e);
                Ok(None)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.client.logout().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_handle_from_body() {
        assert_eq!(
            task_handle_from(&json!("task-42")),
            TaskHandle::Pending("task-42".to_string())
        );
        assert_eq!(
            task_handle_from(&json!({ "value": "task-7" })),
            TaskHandle::Pending("task-7".to_string())
        );
        assert_eq!(task_handle_from(&Value::Null), TaskHandle::Done);
    }

    #[test]
    fn test_task_status_from_body() {
        assert_eq!(task_status_from(&json!({ "status": "RUNNING" })), TaskStatus::Running);
        assert_eq!(task_status_from(&json!({ "status": "SUCCEEDED" })), TaskStatus::Succeeded);
        assert_eq!(
            task_status_from(&json!({
                "status": "FAILED",
                "error": { "messages": [{ "default_message": "Insufficient disk space" }] }
            })),
            TaskStatus::Failed("Insufficient disk space".to_string())
        );
        assert_eq!(
            task_status_from(&json!({ "status": "FAILED" })),
            TaskStatus::Failed("task failed without an error message".to_string())
        );
    }

    #[test]
    fn test_vm_path_encodes_id() {
        assert_eq!(
            RestProvider::vm_path("vm 1", "/power"),
            "api/vcenter/vm/vm%201/power"
        );
    }
}
