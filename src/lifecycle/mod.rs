//! Lifecycle controller
//!
//! Applies one lifecycle operation to a batch of resources through a
//! [`ResourceProvider`]. Resources are processed one at a time, in input
//! order: each request is submitted and its task awaited before the next
//! resource is touched. A failure is recorded in that resource's
//! [`OperationResult`] and the batch carries on.
//!
//! - [`operation`] - Operation kinds, outcomes and result formatting
//! - [`naming`] - Clone naming templates

mod naming;
mod operation;

pub use naming::CloneNaming;
pub use operation::{BatchSummary, OperationKind, OperationResult, Outcome};

use crate::provider::{ResourceProvider, TaskHandle, TaskStatus};
use crate::resource::{ManagedResource, PowerState};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default snapshot name
pub const DEFAULT_SNAPSHOT_NAME: &str = "MilestoneSnapshot";

/// Default snapshot description
pub const DEFAULT_SNAPSHOT_DESCRIPTION: &str = "Snapshot for automation script";

/// Batch rejected before any provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("clone name {name:?} would be given to {count} clones; use {{name}} or {{n}} in the name")]
    CloneNameCollision { name: String, count: usize },
    #[error("clone name {name:?} is the same as its source")]
    CloneNameMatchesSource { name: String },
    #[error("clone name is empty")]
    EmptyCloneName,
}

/// Tuning for task waits and snapshot labels
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Longest wait for a single task
    pub task_timeout: Duration,
    /// Delay between task polls
    pub poll_interval: Duration,
    pub snapshot_name: String,
    pub snapshot_description: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(2000),
            snapshot_name: DEFAULT_SNAPSHOT_NAME.to_string(),
            snapshot_description: DEFAULT_SNAPSHOT_DESCRIPTION.to_string(),
        }
    }
}

/// Per-resource request, after batch-level planning
enum Step<'s> {
    PowerOn,
    PowerOff,
    Snapshot { name: &'s str, description: &'s str },
    Restore,
    Clone { target: String },
    Delete,
}

impl Step<'_> {
    fn kind(&self) -> OperationKind {
        match self {
            Self::PowerOn => OperationKind::PowerOn,
            Self::PowerOff => OperationKind::PowerOff,
            Self::Snapshot { .. } => OperationKind::Snapshot,
            Self::Restore => OperationKind::Restore,
            Self::Clone { .. } => OperationKind::Clone,
            Self::Delete => OperationKind::Delete,
        }
    }

    /// Reason to skip, if the resource's state makes the request moot
    fn skip_reason(&self, resource: &ManagedResource) -> Option<&'static str> {
        match (self, resource.state) {
            (Self::PowerOn, PowerState::On) => Some("already powered on"),
            (Self::PowerOff, PowerState::Off) => Some("already powered off"),
            (Self::PowerOn | Self::PowerOff, PowerState::Transitioning) => {
                Some("not in a steady power state (changing or suspended)")
            }
            (Self::Restore, _) if !resource.has_snapshot() => Some("no snapshot to restore"),
            _ => None,
        }
    }
}

/// Batch lifecycle operations over a provider
pub struct LifecycleController<'p, P: ResourceProvider + ?Sized> {
    provider: &'p P,
    options: ControllerOptions,
}

impl<'p, P: ResourceProvider + ?Sized> LifecycleController<'p, P> {
    pub fn new(provider: &'p P, options: ControllerOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub async fn power_on(&self, resources: &[ManagedResource]) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(resources.len());
        for res in resources {
            results.push(self.apply(Step::PowerOn, res).await);
        }
        results
    }

    pub async fn power_off(&self, resources: &[ManagedResource]) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(resources.len());
        for res in resources {
            results.push(self.apply(Step::PowerOff, res).await);
        }
        results
    }

    /// Snapshot each resource with the given name and description
    pub async fn snapshot(
        &self,
        resources: &[ManagedResource],
        name: &str,
        description: &str,
    ) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(resources.len());
        for res in resources {
            results.push(self.apply(Step::Snapshot { name, description }, res).await);
        }
        results
    }

    /// Snapshot using the configured name and description
    pub async fn snapshot_default(&self, resources: &[ManagedResource]) -> Vec<OperationResult> {
        let name = self.options.snapshot_name.clone();
        let description = self.options.snapshot_description.clone();
        self.snapshot(resources, &name, &description).await
    }

    /// Revert each resource to its current snapshot
    pub async fn restore(&self, resources: &[ManagedResource]) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(resources.len());
        for res in resources {
            results.push(self.apply(Step::Restore, res).await);
        }
        results
    }

    /// Clone each resource, naming clones from `naming`.
    ///
    /// The whole batch is rejected up front if the names would collide.
    pub async fn clone_resources(
        &self,
        resources: &[ManagedResource],
        naming: &CloneNaming,
    ) -> Result<Vec<OperationResult>, LifecycleError> {
        let targets = naming.plan(resources.iter().map(|r| r.name.as_str()))?;

        let mut results = Vec::with_capacity(resources.len());
        for (res, target) in resources.iter().zip(targets) {
            results.push(self.apply(Step::Clone { target }, res).await);
        }
        Ok(results)
    }

    /// Irreversibly remove each resource
    pub async fn delete(&self, resources: &[ManagedResource]) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(resources.len());
        for res in resources {
            results.push(self.apply(Step::Delete, res).await);
        }
        results
    }

    async fn apply(&self, step: Step<'_>, resource: &ManagedResource) -> OperationResult {
        let kind = step.kind();
        let started = Instant::now();
        let note = match &step {
            Step::Clone { target } => Some(format!("as {}", target)),
            Step::Snapshot { name, .. } => Some(format!("snapshot {}", name)),
            _ => None,
        };

        let outcome = match step.skip_reason(resource) {
            Some(reason) => {
                tracing::info!("Skipping {} on {}: {}", kind, resource.name, reason);
                Outcome::Skipped(reason.to_string())
            }
            None => {
                tracing::info!("{} VM: {}", kind.present_participle(), resource.name);
                match self.submit(&step, resource).await {
                    Ok(handle) => self.wait_for_task(&handle).await,
                    Err(e) => Outcome::Failed(format!("{:#}", e)),
                }
            }
        };

        if let Outcome::Failed(detail) = &outcome {
            tracing::warn!("{} failed for {}: {}", kind, resource.name, detail);
        }

        OperationResult {
            resource_id: resource.id.clone(),
            resource_name: resource.name.clone(),
            kind,
            outcome,
            note,
            elapsed: started.elapsed(),
        }
    }

    async fn submit(&self, step: &Step<'_>, resource: &ManagedResource) -> anyhow::Result<TaskHandle> {
        let id = resource.id.as_str();
        match step {
            Step::PowerOn => self.provider.power_on(id).await,
            Step::PowerOff => self.provider.power_off(id).await,
            Step::Snapshot { name, description } => {
                self.provider.create_snapshot(id, name, description).await
            }
            Step::Restore => self.provider.revert_to_snapshot(id).await,
            Step::Clone { target } => self.provider.clone_resource(id, target).await,
            Step::Delete => self.provider.destroy(id).await,
        }
    }

    /// Poll a task until it finishes, fails, or exceeds the timeout
    async fn wait_for_task(&self, handle: &TaskHandle) -> Outcome {
        let poll = async {
            loop {
                match self.provider.poll_task(handle).await {
                    Ok(TaskStatus::Succeeded) => return Outcome::Completed,
                    Ok(TaskStatus::Failed(detail)) => return Outcome::Failed(detail),
                    Ok(TaskStatus::Running) => tokio::time::sleep(self.options.poll_interval).await,
                    Err(e) => return Outcome::Failed(format!("lost track of task: {:#}", e)),
                }
            }
        };

        match tokio::time::timeout(self.options.task_timeout, poll).await {
            Ok(outcome) => outcome,
            Err(_) => {
                if let Err(e) = self.provider.abandon_task(handle).await {
                    tracing::warn!("Failed to abandon task {:?}: {:#}", handle, e);
                }
                Outcome::Failed(format!(
                    "timed out after {}s waiting for task",
                    self.options.task_timeout.as_secs_f32()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::Fault;
    use crate::provider::InMemoryProvider;

    fn fast() -> ControllerOptions {
        ControllerOptions {
            task_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
            ..ControllerOptions::default()
        }
    }

    fn outcomes(results: &[OperationResult]) -> Vec<Outcome> {
        results.iter().map(|r| r.outcome.clone()).collect()
    }

    #[tokio::test]
    async fn test_power_on_skips_running() {
        let provider = InMemoryProvider::new(vec![
            ManagedResource::new("vm-1", "web-01", PowerState::Off),
            ManagedResource::new("vm-2", "web-02", PowerState::On),
        ]);
        let controller = LifecycleController::new(&provider, fast());

        let results = controller.power_on(&provider.resources()).await;
        assert_eq!(
            outcomes(&results),
            vec![Outcome::Completed, Outcome::Skipped("already powered on".into())]
        );
        assert_eq!(provider.calls(), vec!["power_on vm-1"]);
    }

    #[tokio::test]
    async fn test_transitioning_is_skipped() {
        let provider = InMemoryProvider::new(vec![ManagedResource::new(
            "vm-1",
            "web-01",
            PowerState::Transitioning,
        )]);
        let controller = LifecycleController::new(&provider, fast());

        let results = controller.power_off(&provider.resources()).await;
        assert_eq!(
            results[0].outcome,
            Outcome::Skipped("not in a steady power state (changing or suspended)".into())
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_suspended_skip_reason_mentions_suspension() {
        let provider = InMemoryProvider::new(vec![ManagedResource::new(
            "vm-1",
            "web-01",
            PowerState::from_api("SUSPENDED"),
        )]);
        let controller = LifecycleController::new(&provider, fast());

        let results = controller.power_on(&provider.resources()).await;
        match &results[0].outcome {
            Outcome::Skipped(reason) => assert!(reason.contains("suspended")),
            other => panic!("expected a skip, got {:?}", other),
        }
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_waits_through_running_polls() {
        let provider = InMemoryProvider::new(vec![ManagedResource::new(
            "vm-1",
            "web-01",
            PowerState::On,
        )])
        .with_latency(3);
        let controller = LifecycleController::new(&provider, fast());

        let results = controller.power_off(&provider.resources()).await;
        assert_eq!(results[0].outcome, Outcome::Completed);
        assert_eq!(provider.resources()[0].state, PowerState::Off);
    }

    #[tokio::test]
    async fn test_hung_task_times_out() {
        let provider = InMemoryProvider::new(vec![
            ManagedResource::new("vm-1", "web-01", PowerState::Off),
            ManagedResource::new("vm-2", "web-02", PowerState::Off),
        ])
        .with_fault("web-01", Fault::Hang);
        let controller = LifecycleController::new(&provider, fast());

        let results = controller.power_on(&provider.resources()).await;
        assert!(matches!(&results[0].outcome, Outcome::Failed(d) if d.contains("timed out")));
        assert_eq!(results[1].outcome, Outcome::Completed);
        assert_eq!(provider.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn test_repeated_timeouts_leave_no_tasks_behind() {
        let provider = InMemoryProvider::new(vec![ManagedResource::new(
            "vm-1",
            "web-01",
            PowerState::Off,
        )])
        .with_fault("web-01", Fault::Hang);
        let controller = LifecycleController::new(&provider, fast());

        for _ in 0..3 {
            let results = controller.power_on(&provider.resources()).await;
            assert!(matches!(&results[0].outcome, Outcome::Failed(_)));
        }
        assert_eq!(provider.calls().len(), 3);
        assert_eq!(provider.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_then_restore() {
        let provider = InMemoryProvider::new(vec![ManagedResource::new(
            "vm-1",
            "web-01",
            PowerState::On,
        )]);
        let controller = LifecycleController::new(&provider, fast());

        let results = controller.restore(&provider.resources()).await;
        assert_eq!(results[0].outcome, Outcome::Skipped("no snapshot to restore".into()));

        let results = controller.snapshot_default(&provider.resources()).await;
        assert_eq!(results[0].outcome, Outcome::Completed);
        let snapshot = provider.resources()[0].snapshot.clone().unwrap();
        assert_eq!(snapshot.name, DEFAULT_SNAPSHOT_NAME);
        assert_eq!(snapshot.description, DEFAULT_SNAPSHOT_DESCRIPTION);

        let results = controller.restore(&provider.resources()).await;
        assert_eq!(results[0].outcome, Outcome::Completed);
    }

    #[tokio::test]
    async fn test_clone_literal_batch_makes_no_calls() {
        let provider = InMemoryProvider::new(vec![
            ManagedResource::new("vm-1", "web-01", PowerState::Off),
            ManagedResource::new("vm-2", "web-02", PowerState::Off),
        ]);
        let controller = LifecycleController::new(&provider, fast());
        let naming = CloneNaming::parse("web-clone").unwrap();

        let err = controller
            .clone_resources(&provider.resources(), &naming)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::CloneNameCollision { count: 2, .. }));
        assert!(provider.calls().is_empty());
    }
}
