//! Chain download outcome and progress, read from the download container.
//!
//! The download image reports through its output: a line containing
//! `Completed ... file(s)` on progress and a line containing `failed` on
//! error. [`DownloadMonitor`] isolates that text contract from the resync
//! state machine.

use std::sync::Arc;

use async_trait::async_trait;
use nodebox_core::error::Result;
use nodebox_core::service::Service;
use nodebox_core::status::DownloadProgress;

use crate::compose::ContainerRuntime;

/// Output lines inspected for the failure marker.
pub const FAILURE_TAIL_LINES: usize = 10;

/// Output lines inspected for progress.
pub const PROGRESS_TAIL_LINES: usize = 5;

/// Estimated full-chain size reported until the real total is close.
const FULL_CHAIN_ESTIMATE_GIB: f64 = 220.0;

/// Downloaded amount (GiB) after which the reported total is trusted.
const ESTIMATE_CUTOFF_GIB: f64 = 210.0;

/// Reports the outcome and progress of the last download run.
#[async_trait]
pub trait DownloadMonitor: Send + Sync {
    /// Whether the last run reported a failure.
    async fn failed(&self) -> Result<bool>;

    /// Most recent progress line, if any.
    async fn progress(&self, full: bool) -> Result<Option<DownloadProgress>>;
}

/// [`DownloadMonitor`] that scans the download container's output.
pub struct LogMarkerMonitor {
    runtime: Arc<dyn ContainerRuntime>,
}

impl LogMarkerMonitor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl DownloadMonitor for LogMarkerMonitor {
    async fn failed(&self) -> Result<bool> {
        let logs = self
            .runtime
            .container_logs(Service::Download.as_str(), Some(FAILURE_TAIL_LINES))
            .await?;
        Ok(reports_failure(&logs))
    }

    async fn progress(&self, full: bool) -> Result<Option<DownloadProgress>> {
        let logs = self
            .runtime
            .container_logs(Service::Download.as_str(), Some(PROGRESS_TAIL_LINES))
            .await?;
        Ok(parse_progress(&logs, full))
    }
}

/// Case-insensitive search for the failure marker.
pub fn reports_failure(logs: &str) -> bool {
    logs.to_lowercase().contains("failed")
}

/// Parse the most recent clean progress line.
///
/// The download tool redraws its status line with carriage returns, so
/// fragments can overwrite each other. A line is only trusted when it
/// carries both `Completed` and `file(s)`:
///
/// `Completed 95.2 MiB/~7.7 GiB (12.2 MiB/s) with ~62 file(s) remaining`
pub fn parse_progress(logs: &str, full: bool) -> Option<DownloadProgress> {
    logs.split(['\r', '\n'])
        .rev()
        .filter(|line| line.contains("Completed") && line.contains("file(s)"))
        .find_map(|line| parse_progress_line(line, full))
}

fn parse_progress_line(line: &str, full: bool) -> Option<DownloadProgress> {
    let start = line.find("Completed")?;
    let details = line[start..].split(" remaining").next()?;
    let parts: Vec<&str> = details.split(' ').collect();
    if parts.len() < 6 {
        return None;
    }

    let downloaded_amount = parts[1].to_string();
    let (downloaded_unit, total) = parts[2].split_once('/')?;
    let mut total_amount = total.replace('~', "");
    let mut total_unit = parts[3].to_string();
    let speed = format!("{} {}", parts[4], parts[5])
        .replace(['(', ')'], "");

    if full && estimate_total(&downloaded_amount, downloaded_unit) {
        total_amount = format!("{}", FULL_CHAIN_ESTIMATE_GIB);
        total_unit = "GiB".to_string();
    }

    Some(DownloadProgress {
        downloaded_amount,
        downloaded_unit: downloaded_unit.to_string(),
        total_amount,
        total_unit,
        speed,
    })
}

/// The tool only sees a short lead of the remaining files, so during a full
/// resync the total is estimated until most of the chain has arrived.
fn estimate_total(amount: &str, unit: &str) -> bool {
    match unit {
        "MiB" | "KiB" | "B" => true,
        "GiB" => amount
            .parse::<f64>()
            .map(|gib| gib < ESTIMATE_CUTOFF_GIB)
            .unwrap_or(true),
        _ => false,
    }
}
