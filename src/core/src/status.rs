//! Process-wide workflow state: the system status record, boot progress and
//! the credential rotation progress.
//!
//! Both registers are owned values injected into the manager. The
//! compare-and-set entry points are the only guard against overlapping
//! destructive workflows; callers that lose the race get a
//! [`NodeError::Conflict`].

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Transient record of the current destructive workflow.
///
/// Sparse: a fresh register serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resync: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_amount_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resetting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updating: Option<bool>,
}

impl SystemStatus {
    pub fn is_resyncing(&self) -> bool {
        self.resync == Some(true)
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting == Some(true)
    }

    pub fn is_updating(&self) -> bool {
        self.updating == Some(true)
    }

    pub fn has_failed(&self) -> bool {
        self.error == Some(true)
    }

    /// The workflow currently in flight, if any. A failed record is not in flight.
    pub fn active_workflow(&self) -> Option<Workflow> {
        if self.has_failed() {
            return None;
        }
        if self.is_resyncing() {
            Some(Workflow::Resync {
                full: self.full == Some(true),
            })
        } else if self.is_resetting() {
            Some(Workflow::Reset)
        } else if self.is_updating() {
            Some(Workflow::Updating)
        } else {
            None
        }
    }

    fn apply_progress(&mut self, progress: DownloadProgress) {
        self.downloaded_amount = Some(progress.downloaded_amount);
        self.downloaded_amount_unit = Some(progress.downloaded_unit);
        self.total_amount = Some(progress.total_amount);
        self.total_amount_unit = Some(progress.total_unit);
        self.speed = Some(progress.speed);
    }
}

/// Mutually exclusive destructive workflows tracked by the [`StatusRegister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Resync { full: bool },
    Reset,
    Updating,
}

impl Workflow {
    pub fn name(&self) -> &'static str {
        match self {
            Workflow::Resync { .. } => "resync",
            Workflow::Reset => "reset",
            Workflow::Updating => "update",
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress of a chain download, parsed from the download container output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub downloaded_amount: String,
    pub downloaded_unit: String,
    pub total_amount: String,
    pub total_unit: String,
    pub speed: String,
}

/// Owner of the [`SystemStatus`] record and the boot progress percentage.
#[derive(Debug, Default)]
pub struct StatusRegister {
    status: RwLock<SystemStatus>,
    boot_percent: AtomicU8,
}

impl StatusRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> SystemStatus {
        self.status.read().clone()
    }

    /// Atomically check that no workflow is in flight, then record `workflow`.
    ///
    /// The record is reset to empty before the intent is written.
    pub fn try_begin(&self, workflow: Workflow) -> Result<()> {
        let mut status = self.status.write();
        if let Some(active) = status.active_workflow() {
            return Err(NodeError::Conflict(format!(
                "cannot start {}: {} already in progress",
                workflow, active
            )));
        }

        *status = SystemStatus::default();
        match workflow {
            Workflow::Resync { full } => {
                status.resync = Some(true);
                status.full = Some(full);
            }
            Workflow::Reset => status.resetting = Some(true),
            Workflow::Updating => status.updating = Some(true),
        }
        Ok(())
    }

    /// Successful end of a workflow.
    pub fn finish(&self) {
        *self.status.write() = SystemStatus::default();
    }

    /// Human-readable note on the current step.
    pub fn set_details(&self, details: impl Into<String>) {
        self.status.write().details = Some(details.into());
    }

    /// Keep the workflow flags for inspection and mark the record failed.
    pub fn fail(&self, details: impl Into<String>) {
        let mut status = self.status.write();
        status.error = Some(true);
        status.details = Some(details.into());
    }

    /// Mark a template update failed. The error stays on record but the
    /// `updating` flag is dropped.
    pub fn fail_update(&self, details: impl Into<String>) {
        let mut status = self.status.write();
        status.updating = None;
        status.error = Some(true);
        status.details = Some(details.into());
    }

    /// Record download progress. Ignored unless a resync is in flight.
    pub fn set_progress(&self, progress: DownloadProgress) {
        let mut status = self.status.write();
        if status.is_resyncing() {
            status.apply_progress(progress);
        }
    }

    pub fn boot_percent(&self) -> u8 {
        self.boot_percent.load(Ordering::SeqCst)
    }

    /// Restart boot progress from zero.
    pub fn reset_boot_progress(&self) {
        self.boot_percent.store(0, Ordering::SeqCst);
    }

    /// Raise boot progress. Never moves backwards, capped at 100.
    pub fn advance_boot(&self, percent: u8) {
        self.boot_percent
            .fetch_max(percent.min(100), Ordering::SeqCst);
    }
}

/// Progress of the credential rotation workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePasswordStatus {
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl ChangePasswordStatus {
    /// A rotation is between its first step and a terminal state.
    pub fn in_flight(&self) -> bool {
        self.percent > 0 && self.percent < 100 && self.forbidden != Some(true)
    }
}

/// Owner of the [`ChangePasswordStatus`] record.
#[derive(Debug, Default)]
pub struct ChangePasswordTracker {
    status: RwLock<ChangePasswordStatus>,
}

impl ChangePasswordTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ChangePasswordStatus {
        self.status.read().clone()
    }

    /// Reject if a rotation is in flight, otherwise reset and enter at 1%.
    pub fn try_begin(&self) -> Result<()> {
        let mut status = self.status.write();
        if status.in_flight() {
            return Err(NodeError::Conflict(format!(
                "password change already in progress ({}%)",
                status.percent
            )));
        }
        *status = ChangePasswordStatus {
            percent: 1,
            ..Default::default()
        };
        Ok(())
    }

    pub fn set_percent(&self, percent: u8) {
        self.status.write().percent = percent.min(100);
    }

    pub fn mark_forbidden(&self) {
        self.status.write().forbidden = Some(true);
    }

    /// Terminal failure.
    pub fn mark_error(&self) {
        let mut status = self.status.write();
        status.error = Some(true);
        status.percent = 100;
    }

    pub fn complete(&self) {
        self.status.write().percent = 100;
    }
}
