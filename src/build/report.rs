//! Per-target results of a build run.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::NgmakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Its commands ran and all succeeded.
    Built,
    /// Skipped because the freshness oracle said so.
    UpToDate,
    /// A leaf with no rule; nothing to do.
    Source,
    Failed,
    /// Not attempted because a dependency failed.
    Blocked,
}

impl TargetStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, TargetStatus::Failed | TargetStatus::Blocked)
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetStatus::Built => "built",
            TargetStatus::UpToDate => "up to date",
            TargetStatus::Source => "source",
            TargetStatus::Failed => "failed",
            TargetStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    pub status: TargetStatus,
    /// Human-readable cause for failed and blocked targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip)]
    pub error: Option<Arc<NgmakeError>>,
}

impl TargetOutcome {
    pub fn ok(target: impl Into<String>, status: TargetStatus) -> Self {
        Self {
            target: target.into(),
            status,
            detail: None,
            error: None,
        }
    }

    pub fn failed(target: impl Into<String>, error: Arc<NgmakeError>) -> Self {
        Self {
            target: target.into(),
            status: TargetStatus::Failed,
            detail: Some(error.to_string()),
            error: Some(error),
        }
    }

    pub fn blocked(target: impl Into<String>, dependency: &str) -> Self {
        let target = target.into();
        let error = NgmakeError::DependencyFailed {
            target: target.clone(),
            dependency: dependency.to_string(),
        };
        Self {
            target,
            status: TargetStatus::Blocked,
            detail: Some(error.to_string()),
            error: Some(Arc::new(error)),
        }
    }
}

/// Outcome of one run, in the order targets finished.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub outcomes: Vec<TargetOutcome>,
    /// Rules whose names could not be expanded, with the reason.
    pub unresolved: Vec<String>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| !o.status.is_failure())
    }

    pub fn outcome(&self, target: &str) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.target == target)
    }

    pub fn status(&self, target: &str) -> Option<TargetStatus> {
        self.outcome(target).map(|o| o.status)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }

    pub fn count(&self, status: TargetStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}
