//! Error taxonomy for platform jobs
//!
//! Each step of a job has its own error type. [`JobError`] wraps whichever
//! step failed; it never crosses into a sibling job.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::job::InvalidTransition;

/// Prerequisite installation failed.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("`{tool}` not found on PATH")]
    ToolNotFound { tool: String },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {url} returned HTTP {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("download of {url} stalled: no data for {secs} seconds")]
    DownloadTimeout { url: String, secs: u64 },

    #[error("failed to extract {}: {source}", archive.display())]
    Extract {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive from {url} does not contain {executable}")]
    MissingExecutable { url: String, executable: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Compiler invocation failed or produced no output.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build tool `{program}` not found on PATH")]
    ToolNotFound { program: String },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}:\n{stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("build succeeded but produced no binary at {}", path.display())]
    MissingOutput { path: PathBuf },

    #[error("cannot inspect build output {}: {source}", path.display())]
    OutputAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Uploading the artifact to the release failed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no upload credential: `{env}` is unset or empty")]
    MissingCredential { env: String },

    #[error("upload of `{name}` rejected: authentication failed (HTTP {status})")]
    Unauthorized { name: String, status: u16 },

    #[error("release already has an asset named `{name}`")]
    NameCollision { name: String },

    #[error("upload of `{name}` failed with HTTP {status}: {body}")]
    Service {
        name: String,
        status: u16,
        body: String,
    },

    #[error("network error uploading `{name}`: {source}")]
    Network {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read artifact {}: {source}", path.display())]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Terminal failure of a single platform job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error(transparent)]
    State(#[from] InvalidTransition),

    #[error("job task aborted: {0}")]
    Aborted(String),
}

/// Lines of subprocess stderr kept in error messages.
pub(crate) const STDERR_TAIL_LINES: usize = 20;

/// Keep the tail of captured stderr for error messages.
pub(crate) fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = b"one\ntwo\nthree\nfour\n";
        assert_eq!(stderr_tail(stderr, 2), "three\nfour");
        assert_eq!(stderr_tail(stderr, 10), "one\ntwo\nthree\nfour");
        assert_eq!(stderr_tail(b"", 3), "");
    }

    #[test]
    fn test_job_error_names_failed_step() {
        let err = JobError::from(BuildError::MissingOutput {
            path: PathBuf::from("target/release/tool"),
        });
        assert!(err.to_string().starts_with("build failed:"));

        let err = JobError::from(PublishError::NameCollision {
            name: "tool_mac".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "publish failed: release already has an asset named `tool_mac`"
        );
    }
}
