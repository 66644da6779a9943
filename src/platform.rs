//! Target platform table for the release matrix
//!
//! Every matrix branch is one row of [`PLATFORMS`]. Bootstrap requirements,
//! target triple, asset naming and content type all live here so the policy
//! sits in one place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Content type declared for every uploaded asset.
///
/// Kept as `application/zip` for all platforms, including raw executables,
/// for compatibility with existing asset consumers.
pub const ASSET_CONTENT_TYPE: &str = "application/zip";

/// Default download location of the `protoc` toolchain archive for Windows jobs.
pub const DEFAULT_PROTOC_URL: &str =
    "https://github.com/protocolbuffers/protobuf/releases/download/v3.11.4/protoc-3.11.4-win64.zip";

/// Matrix branch identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "mac")]
    MacOs,
    Linux,
    Windows,
}

/// A prerequisite installed before the build runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    /// `rustup target add <triple>`, for rows whose triple may not be the
    /// runner's host.
    RustupTarget(&'static str),
    /// `rustup component add <component>`
    RustupComponent(&'static str),
    /// Fetch a zip archive holding a prebuilt tool and expose it to the build.
    ToolArchive(ToolArchive),
}

/// A binary toolchain shipped as a zip archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolArchive {
    /// Key used for the workspace directory and for URL overrides in config.
    pub name: &'static str,
    /// Executable path relative to the archive root.
    pub executable: &'static str,
    /// Environment variable handed to the build pointing at the executable.
    pub env_var: &'static str,
    pub default_url: &'static str,
}

/// One row of the platform table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformSpec {
    pub platform: Platform,
    pub target_triple: &'static str,
    /// Suffix of the built executable (`.exe` on Windows).
    pub exe_suffix: &'static str,
    /// Suffix appended to the binary name to form the asset name.
    pub asset_suffix: &'static str,
    pub content_type: &'static str,
    pub bootstrap: &'static [BootstrapStep],
}

const MAC_TRIPLE: &str = "x86_64-apple-darwin";

const PROTOC: ToolArchive = ToolArchive {
    name: "protoc",
    executable: "bin/protoc.exe",
    env_var: "PROTOC",
    default_url: DEFAULT_PROTOC_URL,
};

/// The fixed platform set, in matrix order.
pub const PLATFORMS: [PlatformSpec; 3] = [
    PlatformSpec {
        platform: Platform::MacOs,
        target_triple: MAC_TRIPLE,
        exe_suffix: "",
        asset_suffix: "_mac",
        content_type: ASSET_CONTENT_TYPE,
        bootstrap: &[
            BootstrapStep::RustupTarget(MAC_TRIPLE),
            BootstrapStep::RustupComponent("rustfmt"),
        ],
    },
    PlatformSpec {
        platform: Platform::Linux,
        target_triple: "x86_64-unknown-linux-gnu",
        exe_suffix: "",
        asset_suffix: "_linux",
        content_type: ASSET_CONTENT_TYPE,
        bootstrap: &[],
    },
    PlatformSpec {
        platform: Platform::Windows,
        target_triple: "x86_64-pc-windows-msvc",
        exe_suffix: ".exe",
        asset_suffix: ".exe",
        content_type: ASSET_CONTENT_TYPE,
        bootstrap: &[BootstrapStep::ToolArchive(PROTOC)],
    },
];

impl Platform {
    /// All platforms in matrix order
    pub fn all() -> impl Iterator<Item = Platform> {
        PLATFORMS.iter().map(|spec| spec.platform)
    }

    /// Short identifier used on the command line and for workspace directories
    pub fn id(self) -> &'static str {
        match self {
            Platform::MacOs => "mac",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        }
    }

    /// Look up this platform's row in the table
    pub fn spec(self) -> &'static PlatformSpec {
        // Rows follow variant order.
        &PLATFORMS[self as usize]
    }
}

impl PlatformSpec {
    /// Name under which the artifact is attached to the release.
    pub fn asset_name(&self, binary: &str) -> String {
        format!("{binary}{}", self.asset_suffix)
    }

    /// File name produced by the build tool.
    pub fn executable_name(&self, binary: &str) -> String {
        format!("{binary}{}", self.exe_suffix)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.id())
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapStep::RustupTarget(triple) => write!(f, "rustup target add {triple}"),
            BootstrapStep::RustupComponent(component) => {
                write!(f, "rustup component add {component}")
            }
            BootstrapStep::ToolArchive(tool) => {
                write!(f, "fetch {} archive (exports {})", tool.name, tool.env_var)
            }
        }
    }
}

/// Unknown platform identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform `{0}` (expected one of: mac, linux, windows)")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mac" | "macos" | "darwin" => Ok(Platform::MacOs),
            "linux" => Ok(Platform::Linux),
            "windows" | "win" => Ok(Platform::Windows),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}
