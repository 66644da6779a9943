//! Built binary awaiting publication

use std::path::{Path, PathBuf};

use crate::platform::Platform;

/// The compiled binary of one platform job.
///
/// Deliberately not `Clone`: the build step hands it to the publisher by
/// value and it is consumed by the upload.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    platform: Platform,
    path: PathBuf,
    name: String,
    content_type: &'static str,
}

impl Artifact {
    pub fn new(
        platform: Platform,
        path: PathBuf,
        name: impl Into<String>,
        content_type: &'static str,
    ) -> Self {
        Self {
            platform,
            path,
            name: name.into(),
            content_type,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Asset name on the release
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }
}
