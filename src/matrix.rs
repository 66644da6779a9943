//! Matrix orchestration
//!
//! Fans one [`PlatformJob`] per platform out onto its own tokio task. Jobs
//! share only read-only handles (the release and the step implementation);
//! each reports its terminal status over an mpsc channel. A job that fails or
//! panics never cancels its siblings.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use tokio::sync::mpsc;

use crate::job::{JobOutcome, JobReport, JobSteps, PlatformJob};
use crate::platform::Platform;
use crate::release::Release;

pub struct MatrixOrchestrator<S: ?Sized> {
    steps: Arc<S>,
    workspace_root: PathBuf,
    platforms: Vec<Platform>,
}

impl<S> MatrixOrchestrator<S>
where
    S: JobSteps + ?Sized + 'static,
{
    /// Orchestrator over the full platform set.
    pub fn new(steps: Arc<S>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            steps,
            workspace_root: workspace_root.into(),
            platforms: Platform::all().collect(),
        }
    }

    /// Narrow the matrix to `selected`, kept in matrix order. An empty
    /// selection keeps every platform.
    pub fn with_platforms(mut self, selected: &[Platform]) -> Self {
        if !selected.is_empty() {
            self.platforms = Platform::all().filter(|p| selected.contains(p)).collect();
        }
        self
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Run every job to a terminal state and return one report per job, in
    /// matrix order.
    pub async fn run(&self, release: Arc<Release>) -> Vec<JobReport> {
        info!(
            "release {} (id {}): starting {} job(s)",
            release.tag_name(),
            release.id(),
            self.platforms.len()
        );

        let (tx, mut rx) = mpsc::channel::<JobReport>(self.platforms.len().max(1));
        let mut handles = Vec::with_capacity(self.platforms.len());

        for &platform in &self.platforms {
            let job = PlatformJob::new(platform, &self.workspace_root);
            let steps = Arc::clone(&self.steps);
            let release = Arc::clone(&release);
            let tx = tx.clone();

            info!("[{platform}] pending");
            let handle = tokio::spawn(async move {
                let report = job.run(&*steps, &release).await;
                // The receiver lives until every sender is gone.
                let _ = tx.send(report).await;
            });
            handles.push((platform, handle));
        }
        drop(tx);

        let mut reports = Vec::with_capacity(self.platforms.len());
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }

        for (platform, handle) in handles {
            if let Err(e) = handle.await {
                error!("[{platform}] job task died: {e}");
                reports.push(JobReport::aborted(platform, e.to_string()));
            }
        }

        reports.sort_by_key(|report| report.platform);
        reports
    }
}

/// Human-readable per-job summary.
pub fn summary(reports: &[JobReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = match &report.outcome {
            JobOutcome::Succeeded(asset) if asset.dry_run => writeln!(
                out,
                "{:<8} succeeded  {} (dry run, not uploaded)",
                report.platform, asset.name
            ),
            JobOutcome::Succeeded(asset) => writeln!(
                out,
                "{:<8} succeeded  {} [{}]",
                report.platform, asset.name, asset.content_type
            ),
            JobOutcome::Failed { at: Some(at), error } => writeln!(
                out,
                "{:<8} failed     while {at}: {error}",
                report.platform
            ),
            JobOutcome::Failed { at: None, error } => {
                writeln!(out, "{:<8} failed     {error}", report.platform)
            }
        };
    }
    out
}
