//! Release build of the published binary

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::artifact::Artifact;
use crate::bootstrap::BuildEnv;
use crate::config::MatrixConfig;
use crate::error::{BuildError, STDERR_TAIL_LINES};
use crate::platform::PlatformSpec;

/// Runs the build tool in release mode for one platform.
#[derive(Debug, Clone)]
pub struct CompilerInvoker {
    program: String,
    extra_args: Vec<String>,
    source_dir: PathBuf,
    binary: String,
    /// Upload token variable, kept out of the build's environment.
    token_env: String,
}

impl CompilerInvoker {
    pub fn new(config: &MatrixConfig) -> Self {
        Self {
            program: config.build.program.clone(),
            extra_args: config.build.args.clone(),
            source_dir: config.source_dir.clone(),
            binary: config.binary.clone(),
            token_env: config.token_env.clone(),
        }
    }

    /// Target directory private to the job workspace
    pub fn target_dir(workspace: &Path) -> PathBuf {
        workspace.join("target")
    }

    /// Where the build leaves the binary for `spec`.
    pub fn output_path(&self, spec: &PlatformSpec, workspace: &Path) -> PathBuf {
        Self::target_dir(workspace)
            .join(spec.target_triple)
            .join("release")
            .join(spec.executable_name(&self.binary))
    }

    /// Arguments passed to the build tool.
    pub fn args(&self, spec: &PlatformSpec, workspace: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "build".into(),
            "--release".into(),
            "--bin".into(),
            self.binary.as_str().into(),
            "--target".into(),
            spec.target_triple.into(),
            "--target-dir".into(),
            Self::target_dir(workspace).into_os_string(),
        ];
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    fn display_command(&self, args: &[OsString]) -> String {
        let mut command = self.program.clone();
        for arg in args {
            command.push(' ');
            command.push_str(&arg.to_string_lossy());
        }
        command
    }

    /// Build the binary and hand back the artifact it produced.
    pub async fn build(
        &self,
        spec: &PlatformSpec,
        workspace: &Path,
        env: &BuildEnv,
    ) -> Result<Artifact, BuildError> {
        let prefix = spec.platform.id();
        let program = which::which(&self.program).map_err(|_| BuildError::ToolNotFound {
            program: self.program.clone(),
        })?;
        let args = self.args(spec, workspace);
        let command = self.display_command(&args);

        info!("[{prefix}] {command}");
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&self.source_dir)
            .env_remove(&self.token_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in env.vars() {
            debug!("[{prefix}] build env {key}={}", value.to_string_lossy());
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| BuildError::Spawn {
            command: command.clone(),
            source,
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, stderr_tail) = tokio::join!(
            child.wait(),
            forward_lines(prefix, stdout, 0),
            forward_lines(prefix, stderr, STDERR_TAIL_LINES),
        );
        let status = status.map_err(|source| BuildError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !status.success() {
            return Err(BuildError::Failed {
                command,
                status: status.to_string(),
                stderr: stderr_tail.join("\n"),
            });
        }

        let path = self.output_path(spec, workspace);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => return Err(BuildError::MissingOutput { path }),
            Err(source) => return Err(BuildError::OutputAccess { path, source }),
        }

        info!("[{prefix}] built {}", path.display());
        Ok(Artifact::new(
            spec.platform,
            path,
            spec.asset_name(&self.binary),
            spec.content_type,
        ))
    }
}

/// Log every line of a build stream as it arrives, keeping the last `keep`.
async fn forward_lines<R>(prefix: &str, stream: Option<R>, keep: usize) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Vec::new();
    };
    let mut tail = VecDeque::with_capacity(keep);
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!("[{prefix}] {line}");
        if keep == 0 {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    fn invoker(program: &str) -> CompilerInvoker {
        let mut config = MatrixConfig {
            binary: "mybinary".to_string(),
            ..MatrixConfig::default()
        };
        config.build.program = program.to_string();
        config.build.args = vec!["--locked".to_string()];
        CompilerInvoker::new(&config)
    }

    #[test]
    fn test_output_path_per_platform() {
        let invoker = invoker("cargo");
        let ws = Path::new("/jobs/windows");
        assert_eq!(
            invoker.output_path(Platform::Windows.spec(), ws),
            PathBuf::from("/jobs/windows/target/x86_64-pc-windows-msvc/release/mybinary.exe")
        );
        let ws = Path::new("/jobs/mac");
        assert_eq!(
            invoker.output_path(Platform::MacOs.spec(), ws),
            PathBuf::from("/jobs/mac/target/x86_64-apple-darwin/release/mybinary")
        );
    }

    #[test]
    fn test_args_request_release_build() {
        let invoker = invoker("cargo");
        let args = invoker.args(Platform::Linux.spec(), Path::new("/jobs/linux"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "build",
                "--release",
                "--bin",
                "mybinary",
                "--target",
                "x86_64-unknown-linux-gnu",
                "--target-dir",
                "/jobs/linux/target",
                "--locked",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_build_tool() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker("release-matrix-no-such-build-tool");
        let err = invoker
            .build(Platform::Linux.spec(), dir.path(), &BuildEnv::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_build_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker("false");
        let err = invoker
            .build(Platform::Linux.spec(), dir.path(), &BuildEnv::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker("true");
        let err = invoker
            .build(Platform::Linux.spec(), dir.path(), &BuildEnv::default())
            .await
            .unwrap_err();
        match err {
            BuildError::MissingOutput { path } => {
                assert!(path.ends_with("x86_64-unknown-linux-gnu/release/mybinary"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_output_becomes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker("true");
        let spec = Platform::MacOs.spec();
        let output = invoker.output_path(spec, dir.path());
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"\x7fELF").unwrap();

        let artifact = invoker
            .build(spec, dir.path(), &BuildEnv::default())
            .await
            .unwrap();
        assert_eq!(artifact.path(), output);
        assert_eq!(artifact.name(), "mybinary_mac");
        assert_eq!(artifact.content_type(), "application/zip");
        assert_eq!(artifact.platform(), Platform::MacOs);
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-build");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_keeps_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            "i=1; while [ $i -le 50 ]; do echo \"line $i\" >&2; i=$((i+1)); done; echo done; exit 101",
        );
        let invoker = invoker(&program);
        let err = invoker
            .build(Platform::Linux.spec(), dir.path(), &BuildEnv::default())
            .await
            .unwrap_err();
        match err {
            BuildError::Failed { status, stderr, .. } => {
                assert!(status.contains("101"), "status: {status}");
                let lines: Vec<&str> = stderr.lines().collect();
                assert_eq!(lines.len(), STDERR_TAIL_LINES);
                assert_eq!(lines.first(), Some(&"line 31"));
                assert_eq!(lines.last(), Some(&"line 50"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_output_is_not_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the target directory should be.
        std::fs::write(CompilerInvoker::target_dir(dir.path()), b"").unwrap();

        let invoker = invoker("true");
        let err = invoker
            .build(Platform::Linux.spec(), dir.path(), &BuildEnv::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, BuildError::OutputAccess { .. }),
            "unexpected error: {err}"
        );
    }
}
