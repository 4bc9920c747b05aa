//! Operation kinds and per-resource results

use std::fmt;
use std::time::Duration;

/// Lifecycle operation applied to a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    PowerOn,
    PowerOff,
    Snapshot,
    Restore,
    Clone,
    Delete,
}

impl OperationKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PowerOn => "Power on",
            Self::PowerOff => "Power off",
            Self::Snapshot => "Snapshot",
            Self::Restore => "Restore",
            Self::Clone => "Clone",
            Self::Delete => "Delete",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::PowerOn => "Powered on",
            Self::PowerOff => "Powered off",
            Self::Snapshot => "Snapshotted",
            Self::Restore => "Restored",
            Self::Clone => "Cloned",
            Self::Delete => "Deleted",
        }
    }

    pub fn present_participle(&self) -> &'static str {
        match self {
            Self::PowerOn => "Powering on",
            Self::PowerOff => "Powering off",
            Self::Snapshot => "Taking snapshot of",
            Self::Restore => "Restoring latest snapshot of",
            Self::Clone => "Cloning",
            Self::Delete => "Deleting",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// What happened to one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The provider task finished successfully
    Completed,
    /// Precondition not met; nothing was requested
    Skipped(String),
    /// Submission was refused or the task failed
    Failed(String),
}

impl Outcome {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Completed => "✓",
            Self::Skipped(_) => "-",
            Self::Failed(_) => "✗",
        }
    }
}

/// Outcome of one operation on one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub resource_id: String,
    pub resource_name: String,
    pub kind: OperationKind,
    pub outcome: Outcome,
    /// Extra context, e.g. the clone's name
    pub note: Option<String>,
    pub elapsed: Duration,
}

impl OperationResult {
    /// Completed or skipped
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped(_))
    }

    /// Format duration for display
    pub fn duration_display(&self) -> String {
        let d = self.elapsed;
        if d.as_secs() < 1 {
            format!("{}ms", d.as_millis())
        } else if d.as_secs() < 60 {
            format!("{}s", d.as_secs())
        } else {
            format!("{}m{}s", d.as_secs() / 60, d.as_secs() % 60)
        }
    }

    /// One line describing this result
    pub fn summary_line(&self) -> String {
        let target = match &self.note {
            Some(note) => format!("{} ({})", self.resource_name, note),
            None => self.resource_name.clone(),
        };

        match &self.outcome {
            Outcome::Completed => format!(
                "{} {} {} [{}]",
                self.outcome.icon(),
                self.kind.past_tense(),
                target,
                self.duration_display()
            ),
            Outcome::Skipped(reason) => {
                format!("{} Skipped {}: {}", self.outcome.icon(), target, reason)
            }
            Outcome::Failed(detail) => format!(
                "{} {} failed for {}: {}",
                self.outcome.icon(),
                self.kind.display_name(),
                target,
                detail
            ),
        }
    }
}

/// Counts over a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn of(results: &[OperationResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            match r.outcome {
                Outcome::Completed => acc.completed += 1,
                Outcome::Skipped(_) => acc.skipped += 1,
                Outcome::Failed(_) => acc.failed += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} failed",
            self.completed, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Outcome) -> OperationResult {
        OperationResult {
            resource_id: "vm-1".to_string(),
            resource_name: "web-01".to_string(),
            kind: OperationKind::PowerOn,
            outcome,
            note: None,
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_summary_lines() {
        assert_eq!(
            result(Outcome::Completed).summary_line(),
            "✓ Powered on web-01 [1s]"
        );
        assert_eq!(
            result(Outcome::Skipped("already powered on".into())).summary_line(),
            "- Skipped web-01: already powered on"
        );
        assert!(result(Outcome::Failed("boom".into()))
            .summary_line()
            .ends_with("Power on failed for web-01: boom"));
    }

    #[test]
    fn test_skip_counts_as_success() {
        assert!(result(Outcome::Skipped("x".into())).is_success());
        assert!(!result(Outcome::Failed("x".into())).is_success());
    }

    #[test]
    fn test_batch_summary() {
        let results = vec![
            result(Outcome::Completed),
            result(Outcome::Skipped("x".into())),
            result(Outcome::Failed("y".into())),
            result(Outcome::Completed),
        ];
        let summary = BatchSummary::of(&results);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.to_string(), "2 completed, 1 skipped, 1 failed");
    }
}
