//! Platform bootstrap
//!
//! Installs the prerequisites listed in a platform's table row before its
//! build runs. Everything produced here stays inside the job: tools land in
//! the job workspace and environment variables are returned as a
//! [`BuildEnv`] for the build step, never exported process-wide.
//!
//! ## Module Organization
//!
//! - `rustup` - rustup target and component installation
//! - `archive` - toolchain archive download and extraction

mod archive;
mod rustup;

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::time::Duration;

use log::info;

use crate::config::MatrixConfig;
use crate::error::BootstrapError;
use crate::platform::{BootstrapStep, PlatformSpec, ToolArchive};

use self::rustup::Rustup;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment overrides handed from bootstrap to the build of the same job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    vars: Vec<(String, OsString)>,
}

impl BuildEnv {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OsString>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_os_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Installs per-platform prerequisites.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    client: reqwest::Client,
    rustup: Rustup,
    archive_urls: HashMap<String, String>,
}

impl Bootstrapper {
    pub fn new(config: &MatrixConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            rustup: Rustup {
                program: config.rustup.clone(),
                source_dir: config.source_dir.clone(),
                token_env: config.token_env.clone(),
            },
            archive_urls: config.archive_urls.clone(),
        })
    }

    /// Run every bootstrap step of `spec` inside `workspace`.
    ///
    /// Re-running on an already bootstrapped workspace succeeds without
    /// refetching anything.
    pub async fn bootstrap(
        &self,
        spec: &PlatformSpec,
        workspace: &Path,
    ) -> Result<BuildEnv, BootstrapError> {
        let prefix = spec.platform.id();
        tokio::fs::create_dir_all(workspace)
            .await
            .map_err(|source| BootstrapError::Io {
                path: workspace.to_path_buf(),
                source,
            })?;

        let mut env = BuildEnv::default();
        if spec.bootstrap.is_empty() {
            info!("[{prefix}] no bootstrap steps required");
            return Ok(env);
        }

        for step in spec.bootstrap {
            match step {
                BootstrapStep::RustupTarget(triple) => {
                    self.rustup.add_target(prefix, triple).await?;
                }
                BootstrapStep::RustupComponent(component) => {
                    self.rustup.add_component(prefix, component).await?;
                }
                BootstrapStep::ToolArchive(tool) => {
                    let url = self.archive_url(tool);
                    let executable = archive::ensure_tool(
                        prefix,
                        &self.client,
                        tool,
                        url,
                        &workspace.join("tools"),
                    )
                    .await?;
                    env.set(tool.env_var, executable);
                }
            }
        }
        Ok(env)
    }

    /// Configured override or the table default
    fn archive_url<'a>(&'a self, tool: &'a ToolArchive) -> &'a str {
        self.archive_urls
            .get(tool.name)
            .map(String::as_str)
            .unwrap_or(tool.default_url)
    }
}
