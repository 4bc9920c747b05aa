//! In-memory provider
//!
//! Holds an inventory in process and plays lifecycle tasks against it.
//! Backs `--simulate` and the test suite. Faults can be injected per
//! resource name to exercise failure and timeout paths.

use super::{source_ip_towards, ResourceProvider, SessionInfo, TaskHandle, TaskStatus};
use crate::resource::{ManagedResource, PowerState, Snapshot};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Injected misbehaviour for a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Submission is refused outright
    Reject(String),
    /// Task is accepted, then reports failure
    Fail(String),
    /// Task never finishes
    Hang,
}

#[derive(Debug, Clone)]
enum Effect {
    PowerOn,
    PowerOff,
    Snapshot { name: String, description: String },
    Revert,
    Clone { new_name: String },
    Destroy,
}

#[derive(Debug)]
struct SimTask {
    resource_id: String,
    effect: Effect,
    fault: Option<Fault>,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct SimState {
    resources: Vec<ManagedResource>,
    tasks: HashMap<String, SimTask>,
    faults: HashMap<String, Fault>,
    calls: Vec<String>,
}

impl SimState {
    fn find(&self, id: &str) -> Result<&ManagedResource> {
        match self.resources.iter().find(|r| r.id == id) {
            Some(res) => Ok(res),
            None => bail!("resource {} not found", id),
        }
    }

    fn apply(&mut self, resource_id: &str, effect: Effect) {
        match effect {
            Effect::Destroy => self.resources.retain(|r| r.id != resource_id),
            Effect::Clone { new_name } => {
                let Some(source) = self.resources.iter().find(|r| r.id == resource_id) else {
                    return;
                };
                let mut clone = source.clone();
                clone.id = format!("vm-{}", &Uuid::new_v4().simple().to_string()[..8]);
                clone.name = new_name;
                clone.state = PowerState::Off;
                clone.snapshot = None;
                clone.details.ip_address = None;
                self.resources.push(clone);
            }
            effect => {
                let Some(res) = self.resources.iter_mut().find(|r| r.id == resource_id) else {
                    return;
                };
                match effect {
                    Effect::PowerOn => res.state = PowerState::On,
                    Effect::PowerOff => {
                        res.state = PowerState::Off;
                        res.details.ip_address = None;
                    }
                    Effect::Snapshot { name, description } => {
                        res.snapshot = Some(Snapshot {
                            id: format!("snapshot-{}", &Uuid::new_v4().simple().to_string()[..8]),
                            name,
                            description,
                        });
                    }
                    Effect::Revert | Effect::Destroy | Effect::Clone { .. } => {}
                }
            }
        }
    }
}

/// Provider over an inventory held in memory
pub struct InMemoryProvider {
    state: Mutex<SimState>,
    user: String,
    latency_polls: u32,
}

impl InMemoryProvider {
    pub fn new(resources: Vec<ManagedResource>) -> Self {
        Self {
            state: Mutex::new(SimState {
                resources,
                ..SimState::default()
            }),
            user: "simulator".to_string(),
            latency_polls: 0,
        }
    }

    /// Load an inventory from a JSON or YAML file (by extension)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory file {}", path.display()))?;

        let mut resources: Vec<ManagedResource> = if is_yaml(path) {
            serde_yaml::from_str(&content).context("Failed to parse inventory YAML")?
        } else {
            serde_json::from_str(&content).context("Failed to parse inventory JSON")?
        };

        for res in &mut resources {
            if res.id.is_empty() {
                res.id = res.name.clone();
            }
        }

        tracing::info!("Loaded {} simulated resources from {:?}", resources.len(), path);
        Ok(Self::new(resources))
    }

    /// Number of polls a task reports `Running` before it finishes
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Inject a fault for every task submitted against the named resource
    pub fn with_fault(self, name: &str, fault: Fault) -> Self {
        self.lock().faults.insert(name.to_string(), fault);
        self
    }

    /// Snapshot of the current inventory
    pub fn resources(&self) -> Vec<ManagedResource> {
        self.lock().resources.clone()
    }

    /// Mutating calls received, in order, as `"<call> <id>"`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Tasks submitted and not yet finished or abandoned
    pub fn pending_tasks(&self) -> usize {
        self.lock().tasks.len()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, call: &str, id: &str, effect: Effect) -> Result<TaskHandle> {
        let mut state = self.lock();
        state.calls.push(format!("{} {}", call, id));

        let res = state.find(id)?;
        let fault = state.faults.get(&res.name).cloned();

        match (&effect, res.state) {
            (Effect::PowerOn, PowerState::On) => bail!("{} is already powered on", res.name),
            (Effect::PowerOff, PowerState::Off) => bail!("{} is already powered off", res.name),
            (Effect::Revert, _) if res.snapshot.is_none() => {
                bail!("{} has no current snapshot", res.name)
            }
            _ => {}
        }
        if let Effect::Clone { new_name } = &effect {
            if state.resources.iter().any(|r| &r.name == new_name) {
                bail!("a resource named {} already exists", new_name);
            }
        }
        if let Some(Fault::Reject(detail)) = &fault {
            bail!("{}", detail);
        }

        let task_id = format!("task-{}", Uuid::new_v4());
        state.tasks.insert(
            task_id.clone(),
            SimTask {
                resource_id: id.to_string(),
                effect,
                fault,
                polls_left: self.latency_polls,
            },
        );
        tracing::debug!("Simulated {} on {} as {}", call, id, task_id);
        Ok(TaskHandle::Pending(task_id))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[async_trait]
impl ResourceProvider for InMemoryProvider {
    async fn list_resources(&self) -> Result<Vec<ManagedResource>> {
        Ok(self.resources())
    }

    async fn power_on(&self, id: &str) -> Result<TaskHandle> {
        self.submit("power_on", id, Effect::PowerOn)
    }

    async fn power_off(&self, id: &str) -> Result<TaskHandle> {
        self.submit("power_off", id, Effect::PowerOff)
    }

    async fn create_snapshot(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<TaskHandle> {
        let effect = Effect::Snapshot {
            name: name.to_string(),
            description: description.to_string(),
        };
        self.submit("create_snapshot", id, effect)
    }

    async fn revert_to_snapshot(&self, id: &str) -> Result<TaskHandle> {
        self.submit("revert_to_snapshot", id, Effect::Revert)
    }

    async fn clone_resource(&self, id: &str, new_name: &str) -> Result<TaskHandle> {
        let effect = Effect::Clone {
            new_name: new_name.to_string(),
        };
        self.submit("clone", id, effect)
    }

    async fn destroy(&self, id: &str) -> Result<TaskHandle> {
        self.submit("destroy", id, Effect::Destroy)
    }

    async fn poll_task(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let TaskHandle::Pending(task_id) = handle else {
            return Ok(TaskStatus::Succeeded);
        };

        let mut state = self.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            bail!("unknown task {}", task_id);
        };

        if task.fault == Some(Fault::Hang) {
            return Ok(TaskStatus::Running);
        }
        if task.polls_left > 0 {
            task.polls_left -= 1;
            return Ok(TaskStatus::Running);
        }

        let Some(task) = state.tasks.remove(task_id) else {
            bail!("unknown task {}", task_id);
        };
        if let Some(Fault::Fail(detail)) = task.fault {
            return Ok(TaskStatus::Failed(detail));
        }
        state.apply(&task.resource_id, task.effect);
        Ok(TaskStatus::Succeeded)
    }

    async fn abandon_task(&self, handle: &TaskHandle) -> Result<()> {
        if let TaskHandle::Pending(task_id) = handle {
            if self.lock().tasks.remove(task_id).is_some() {
                tracing::debug!("Dropped abandoned task {}", task_id);
            }
        }
        Ok(())
    }

    async fn session_info(&self) -> Result<SessionInfo> {
        Ok(SessionInfo {
            user: self.user.clone(),
            host: "in-memory".to_string(),
            source_ip: source_ip_towards("127.0.0.1"),
        })
    }

    async fn guest_ip(&self, id: &str) -> Result<Option<String>> {
        let state = self.lock();
        let res = state.find(id)?;
        if res.state != PowerState::On {
            return Ok(None);
        }
        Ok(res.details.ip_address.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        tracing::info!("Simulated session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new(vec![
            ManagedResource::new("vm-1", "web-01", PowerState::Off).with_folder("group-v1"),
            ManagedResource::new("vm-2", "web-02", PowerState::On),
        ])
    }

    #[test]
    fn test_power_on_applies_after_poll() {
        tokio_test::block_on(async {
            let provider = provider().with_latency(1);
            let handle = provider.power_on("vm-1").await.unwrap();

            assert_eq!(provider.poll_task(&handle).await.unwrap(), TaskStatus::Running);
            assert_eq!(provider.resources()[0].state, PowerState::Off);

            assert_eq!(provider.poll_task(&handle).await.unwrap(), TaskStatus::Succeeded);
            assert_eq!(provider.resources()[0].state, PowerState::On);
        });
    }

    #[test]
    fn test_clone_lands_in_same_folder_powered_off() {
        tokio_test::block_on(async {
            let provider = provider();
            let handle = provider.clone_resource("vm-1", "web-01-copy").await.unwrap();
            provider.poll_task(&handle).await.unwrap();

            let resources = provider.resources();
            let clone = resources.iter().find(|r| r.name == "web-01-copy").unwrap();
            assert_eq!(clone.folder.as_deref(), Some("group-v1"));
            assert_eq!(clone.state, PowerState::Off);
            assert_ne!(clone.id, "vm-1");
        });
    }

    #[test]
    fn test_rejects_invalid_submissions() {
        tokio_test::block_on(async {
            let provider = provider();
            assert!(provider.power_on("vm-2").await.is_err());
            assert!(provider.revert_to_snapshot("vm-1").await.is_err());
            assert!(provider.destroy("vm-404").await.is_err());
            assert!(provider.clone_resource("vm-1", "web-02").await.is_err());
            assert_eq!(provider.calls().len(), 4);
        });
    }

    #[test]
    fn test_failed_task_leaves_resource_untouched() {
        tokio_test::block_on(async {
            let provider = provider().with_fault("web-01", Fault::Fail("disk locked".into()));
            let handle = provider.destroy("vm-1").await.unwrap();
            assert_eq!(
                provider.poll_task(&handle).await.unwrap(),
                TaskStatus::Failed("disk locked".into())
            );
            assert_eq!(provider.resources().len(), 2);
        });
    }

    #[test]
    fn test_load_inventory_from_yaml() {
        let path = std::env::temp_dir().join(format!("vmctl-inventory-{}.yaml", Uuid::new_v4()));
        std::fs::write(
            &path,
            "- name: web-01\n  state: \"on\"\n- name: db-01\n  snapshot:\n    name: base\n",
        )
        .unwrap();

        let provider = InMemoryProvider::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let resources = provider.resources();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id, "web-01");
        assert_eq!(resources[0].state, PowerState::On);
        assert!(resources[1].has_snapshot());
    }
}
