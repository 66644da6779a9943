use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Platform;

/// Default config file looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "release-matrix.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no binary name configured: set `binary` in {DEFAULT_CONFIG_FILE} or pass --binary")]
    MissingBinary,
}

/// Top‑level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixConfig {
    /// Name of the executable built and published (`<binary>_mac`, ...).
    #[serde(default)]
    pub binary: String,
    /// Checked-out source tree handed to the build tool.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    /// Root of the per-platform job workspaces.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    /// Environment variable holding the upload token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Matrix branches to run; empty means every platform.
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub build: BuildConfig,
    /// rustup executable used by target and component bootstrap steps.
    #[serde(default = "default_rustup")]
    pub rustup: String,
    /// Download URL overrides for toolchain archives, keyed by tool name.
    #[serde(default)]
    pub archive_urls: HashMap<String, String>,
}

/// Build tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Extra arguments appended after the release-mode arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("target").join("release-matrix")
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_user_agent() -> String {
    concat!("release-matrix/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_program() -> String {
    "cargo".to_string()
}

fn default_rustup() -> String {
    "rustup".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            binary: String::new(),
            source_dir: default_source_dir(),
            workspace_dir: default_workspace_dir(),
            token_env: default_token_env(),
            user_agent: default_user_agent(),
            platforms: Vec::new(),
            build: BuildConfig::default(),
            rustup: default_rustup(),
            archive_urls: HashMap::new(),
        }
    }
}

impl MatrixConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `release-matrix.toml` in the
    /// current directory is used when present and defaults otherwise. A
    /// `--binary` override replaces the configured name.
    pub fn load(explicit: Option<&Path>, binary_override: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    log::debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
                    Self::default()
                }
            }
        };

        if let Some(binary) = binary_override {
            config.binary = binary.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.binary.trim().is_empty() {
            return Err(ConfigError::MissingBinary);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: MatrixConfig = toml::from_str("binary = \"mybinary\"").unwrap();
        assert_eq!(config.binary, "mybinary");
        assert_eq!(config.source_dir, PathBuf::from("."));
        assert_eq!(config.workspace_dir, PathBuf::from("target/release-matrix"));
        assert_eq!(config.token_env, "GITHUB_TOKEN");
        assert_eq!(config.build.program, "cargo");
        assert!(config.build.args.is_empty());
        assert!(config.archive_urls.is_empty());
        assert!(config.platforms.is_empty());
        assert_eq!(config.rustup, "rustup");
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            binary = "chubaodb"
            source_dir = "src-tree"
            workspace_dir = "/tmp/jobs"
            token_env = "RELEASE_TOKEN"
            platforms = ["mac", "windows"]

            [build]
            program = "cross"
            args = ["--locked"]

            [archive_urls]
            protoc = "https://mirror.example/protoc.zip"
        "#;
        let config: MatrixConfig = toml::from_str(text).unwrap();
        assert_eq!(config.build.program, "cross");
        assert_eq!(config.build.args, vec!["--locked".to_string()]);
        assert_eq!(
            config.archive_urls.get("protoc").map(String::as_str),
            Some("https://mirror.example/protoc.zip")
        );
        assert_eq!(config.token_env, "RELEASE_TOKEN");
        assert_eq!(config.platforms, vec![Platform::MacOs, Platform::Windows]);
    }

    #[test]
    fn test_binary_override_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.toml");
        std::fs::write(&path, "source_dir = \".\"\n").unwrap();

        assert!(matches!(
            MatrixConfig::load(Some(path.as_path()), None),
            Err(ConfigError::MissingBinary)
        ));
        let config = MatrixConfig::load(Some(path.as_path()), Some("tool")).unwrap();
        assert_eq!(config.binary, "tool");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = MatrixConfig::load(Some(missing.as_path()), Some("tool")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "binary = [").unwrap();
        let err = MatrixConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.toml");
        std::fs::write(
            &path,
            "binary = \"tool\"\nprotoc_url = \"https://mirror.example/protoc.zip\"\n",
        )
        .unwrap();
        let err = MatrixConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("protoc_url"), "{err}");

        let err = toml::from_str::<MatrixConfig>("binary = \"tool\"\n[build]\nprogramm = \"cross\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("programm"), "{err}");
    }
}
