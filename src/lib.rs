//! Release build matrix
//!
//! Builds one executable for macOS, Linux and Windows whenever a release is
//! created and attaches each binary to that release. Every platform runs as
//! an isolated job (bootstrap → build → publish); a failure stays inside its
//! own job.

pub mod artifact;
pub mod bootstrap;
pub mod compile;
pub mod config;
pub mod credential;
pub mod error;
pub mod job;
pub mod matrix;
pub mod platform;
pub mod publish;
pub mod release;

pub use artifact::Artifact;
pub use bootstrap::{Bootstrapper, BuildEnv};
pub use compile::CompilerInvoker;
pub use config::MatrixConfig;
pub use credential::Credential;
pub use error::{BootstrapError, BuildError, JobError, PublishError};
pub use job::{JobOutcome, JobReport, JobState, JobSteps, Pipeline, PlatformJob};
pub use matrix::MatrixOrchestrator;
pub use platform::{Platform, PlatformSpec};
pub use publish::{PublishedAsset, Publisher};
pub use release::{Release, Trigger};
