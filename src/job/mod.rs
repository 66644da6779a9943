//! Platform job: bootstrap → build → publish for one matrix branch
//!
//! The three steps sit behind the [`JobSteps`] trait so the orchestrator can
//! drive the real [`Pipeline`] or any other implementation the same way.

mod state;

pub use state::{InvalidTransition, JobState};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{error, info};

use crate::artifact::Artifact;
use crate::bootstrap::{Bootstrapper, BuildEnv};
use crate::compile::CompilerInvoker;
use crate::error::{BootstrapError, BuildError, JobError, PublishError};
use crate::platform::{Platform, PlatformSpec};
use crate::publish::{PublishedAsset, Publisher};
use crate::release::Release;

/// The three steps of a platform job.
#[async_trait]
pub trait JobSteps: Send + Sync {
    async fn bootstrap(
        &self,
        spec: &'static PlatformSpec,
        workspace: &Path,
    ) -> Result<BuildEnv, BootstrapError>;

    async fn build(
        &self,
        spec: &'static PlatformSpec,
        workspace: &Path,
        env: &BuildEnv,
    ) -> Result<Artifact, BuildError>;

    async fn publish(
        &self,
        release: &Release,
        artifact: Artifact,
    ) -> Result<PublishedAsset, PublishError>;
}

/// Real steps: rustup/archive bootstrap, cargo build, release upload.
#[derive(Debug, Clone)]
pub struct Pipeline {
    bootstrapper: Bootstrapper,
    compiler: CompilerInvoker,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(bootstrapper: Bootstrapper, compiler: CompilerInvoker, publisher: Publisher) -> Self {
        Self {
            bootstrapper,
            compiler,
            publisher,
        }
    }
}

#[async_trait]
impl JobSteps for Pipeline {
    async fn bootstrap(
        &self,
        spec: &'static PlatformSpec,
        workspace: &Path,
    ) -> Result<BuildEnv, BootstrapError> {
        self.bootstrapper.bootstrap(spec, workspace).await
    }

    async fn build(
        &self,
        spec: &'static PlatformSpec,
        workspace: &Path,
        env: &BuildEnv,
    ) -> Result<Artifact, BuildError> {
        self.compiler.build(spec, workspace, env).await
    }

    async fn publish(
        &self,
        release: &Release,
        artifact: Artifact,
    ) -> Result<PublishedAsset, PublishError> {
        self.publisher.publish(release, artifact).await
    }
}

#[derive(Debug)]
pub enum JobOutcome {
    Succeeded(PublishedAsset),
    Failed {
        /// State the job was in when it failed; `None` when the task itself died.
        at: Option<JobState>,
        error: JobError,
    },
}

/// Terminal status of one job, sent back to the orchestrator.
#[derive(Debug)]
pub struct JobReport {
    pub platform: Platform,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub(crate) fn aborted(platform: Platform, reason: String) -> Self {
        Self {
            platform,
            outcome: JobOutcome::Failed {
                at: None,
                error: JobError::Aborted(reason),
            },
        }
    }

    pub fn final_state(&self) -> JobState {
        match self.outcome {
            JobOutcome::Succeeded(_) => JobState::Succeeded,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded(_))
    }

    pub fn asset(&self) -> Option<&PublishedAsset> {
        match &self.outcome {
            JobOutcome::Succeeded(asset) => Some(asset),
            JobOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        match &self.outcome {
            JobOutcome::Succeeded(_) => None,
            JobOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// One matrix branch with its private workspace.
#[derive(Debug)]
pub struct PlatformJob {
    spec: &'static PlatformSpec,
    workspace: PathBuf,
    state: JobState,
}

impl PlatformJob {
    pub fn new(platform: Platform, workspace_root: &Path) -> Self {
        Self {
            spec: platform.spec(),
            workspace: workspace_root.join(platform.id()),
            state: JobState::Pending,
        }
    }

    pub fn platform(&self) -> Platform {
        self.spec.platform
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn advance(&mut self, to: JobState) -> Result<(), JobError> {
        self.state = self.state.transition(to)?;
        info!("[{}] {to}", self.spec.platform);
        Ok(())
    }

    /// Run the job to a terminal state.
    pub async fn run<S>(mut self, steps: &S, release: &Release) -> JobReport
    where
        S: JobSteps + ?Sized,
    {
        let platform = self.spec.platform;
        let outcome = match self.execute(steps, release).await {
            Ok(asset) => JobOutcome::Succeeded(asset),
            Err(error) => {
                let at = self.state;
                self.state = JobState::Failed;
                error!("[{platform}] failed while {at}: {error}");
                JobOutcome::Failed {
                    at: Some(at),
                    error,
                }
            }
        };
        JobReport { platform, outcome }
    }

    async fn execute<S>(&mut self, steps: &S, release: &Release) -> Result<PublishedAsset, JobError>
    where
        S: JobSteps + ?Sized,
    {
        self.advance(JobState::Bootstrapping)?;
        let env = steps.bootstrap(self.spec, &self.workspace).await?;

        self.advance(JobState::Building)?;
        let artifact = steps.build(self.spec, &self.workspace, &env).await?;

        // Publication only ever follows a successful build.
        self.advance(JobState::Publishing)?;
        let asset = steps.publish(release, artifact).await?;

        self.advance(JobState::Succeeded)?;
        Ok(asset)
    }
}
