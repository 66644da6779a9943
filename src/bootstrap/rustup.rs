//! Rustup target and component installation

use std::path::PathBuf;
use std::time::Duration;

use log::info;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{BootstrapError, STDERR_TAIL_LINES, stderr_tail};

const RUSTUP_TIMEOUT: Duration = Duration::from_secs(1800); // 30 minutes

/// Runs rustup for the toolchain active in the source tree.
///
/// Both `target add` and `component add` are no-ops for anything already
/// installed, so every call is safe to re-run.
#[derive(Debug, Clone)]
pub(super) struct Rustup {
    pub(super) program: String,
    pub(super) source_dir: PathBuf,
    /// Upload token variable, kept out of rustup's environment.
    pub(super) token_env: String,
}

impl Rustup {
    pub(super) async fn add_target(&self, log_prefix: &str, triple: &str) -> Result<(), BootstrapError> {
        self.run(log_prefix, &["target", "add", triple]).await?;
        info!("[{log_prefix}] target `{triple}` available");
        Ok(())
    }

    pub(super) async fn add_component(
        &self,
        log_prefix: &str,
        component: &str,
    ) -> Result<(), BootstrapError> {
        self.run(log_prefix, &["component", "add", component]).await?;
        info!("[{log_prefix}] component `{component}` available");
        Ok(())
    }

    async fn run(&self, log_prefix: &str, args: &[&str]) -> Result<(), BootstrapError> {
        let rustup = which::which(&self.program).map_err(|_| BootstrapError::ToolNotFound {
            tool: self.program.clone(),
        })?;
        let command = format!("{} {}", self.program, args.join(" "));

        info!("[{log_prefix}] {command}");
        let output = timeout(
            RUSTUP_TIMEOUT,
            Command::new(&rustup)
                .args(args)
                .current_dir(&self.source_dir)
                .env_remove(&self.token_env)
                .output(),
        )
        .await
        .map_err(|_| BootstrapError::Timeout {
            command: command.clone(),
            secs: RUSTUP_TIMEOUT.as_secs(),
        })?
        .map_err(|source| BootstrapError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BootstrapError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr, STDERR_TAIL_LINES),
            });
        }
        Ok(())
    }
}
