//! Release-created trigger
//!
//! Parses the GitHub `release` event payload. The upload URL arrives as an
//! RFC 6570 template (`.../assets{?name,label}`); the template part is dropped
//! and the remaining base URL is validated once up front.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Environment variable GitHub Actions uses to point at the event payload.
pub const EVENT_PATH_ENV: &str = "GITHUB_EVENT_PATH";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("no event payload: pass --event or set {EVENT_PATH_ENV}")]
    NoEventPath,

    #[error("failed to read event payload {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed release event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid upload_url `{upload_url}`: {source}")]
    InvalidUploadUrl {
        upload_url: String,
        #[source]
        source: url::ParseError,
    },
}

/// The release that triggered the pipeline. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    id: u64,
    tag_name: String,
    upload_endpoint: Url,
}

impl Release {
    pub fn new(id: u64, tag_name: impl Into<String>, upload_url: &str) -> Result<Self, EventError> {
        let base = strip_url_template(upload_url);
        let upload_endpoint = Url::parse(base).map_err(|source| EventError::InvalidUploadUrl {
            upload_url: upload_url.to_string(),
            source,
        })?;
        Ok(Self {
            id,
            tag_name: tag_name.into(),
            upload_endpoint,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Asset upload endpoint without query or template suffix
    pub fn upload_endpoint(&self) -> &Url {
        &self.upload_endpoint
    }
}

/// What the incoming event asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A release was created; run the matrix against it.
    Created(Release),
    /// Some other release action (published, edited, ...); nothing to do.
    Ignored { action: String },
}

#[derive(Deserialize)]
struct RawEvent {
    action: String,
    release: RawRelease,
}

#[derive(Deserialize)]
struct RawRelease {
    id: u64,
    #[serde(default)]
    tag_name: String,
    upload_url: String,
}

/// Parse an event payload.
pub fn parse_event(payload: &str) -> Result<Trigger, EventError> {
    let event: RawEvent = serde_json::from_str(payload)?;
    if event.action != "created" {
        return Ok(Trigger::Ignored {
            action: event.action,
        });
    }
    let release = Release::new(
        event.release.id,
        event.release.tag_name,
        &event.release.upload_url,
    )?;
    Ok(Trigger::Created(release))
}

/// Read and parse the event payload at `path`.
pub fn load_event(path: &Path) -> Result<Trigger, EventError> {
    let payload = std::fs::read_to_string(path).map_err(|source| EventError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_event(&payload)
}

/// Resolve the event path from an explicit argument or the environment.
pub fn event_path(explicit: Option<PathBuf>) -> Result<PathBuf, EventError> {
    explicit
        .or_else(|| std::env::var_os(EVENT_PATH_ENV).map(PathBuf::from))
        .ok_or(EventError::NoEventPath)
}

fn strip_url_template(upload_url: &str) -> &str {
    match upload_url.find('{') {
        Some(idx) => &upload_url[..idx],
        None => upload_url,
    }
}
