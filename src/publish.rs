//! Release asset upload
//!
//! Uploads one artifact to the release's asset endpoint:
//!
//! ```text
//! POST <upload endpoint>?name=<asset name>
//! Authorization: Bearer <token>
//! Content-Type: <content type from the platform table>
//! ```
//!
//! The credential is checked before anything touches the network, so a
//! missing token can never leave a partial asset behind.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use crate::artifact::Artifact;
use crate::config::MatrixConfig;
use crate::credential::Credential;
use crate::error::PublishError;
use crate::release::Release;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Asset attached to the release by a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishedAsset {
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub browser_download_url: Option<String>,
    /// Set when the upload was skipped (`--dry-run`).
    #[serde(skip)]
    pub dry_run: bool,
}

/// Uploads artifacts to a release.
#[derive(Debug, Clone)]
pub struct Publisher {
    client: reqwest::Client,
    credential: Option<Arc<Credential>>,
    token_env: String,
    dry_run: bool,
}

impl Publisher {
    pub fn new(
        config: &MatrixConfig,
        credential: Option<Arc<Credential>>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            credential,
            token_env: config.token_env.clone(),
            dry_run: false,
        })
    }

    /// Skip the upload and only report what would be published.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Upload `artifact` as a named asset of `release`.
    pub async fn publish(
        &self,
        release: &Release,
        artifact: Artifact,
    ) -> Result<PublishedAsset, PublishError> {
        let prefix = artifact.platform().id();
        let name = artifact.name().to_string();

        if self.dry_run {
            info!(
                "[{prefix}] dry run: would upload {} as `{name}` ({}) to release {}",
                artifact.path().display(),
                artifact.content_type(),
                release.tag_name()
            );
            return Ok(PublishedAsset {
                name,
                content_type: artifact.content_type().to_string(),
                browser_download_url: None,
                dry_run: true,
            });
        }

        let credential = self
            .credential
            .as_deref()
            .ok_or_else(|| PublishError::MissingCredential {
                env: self.token_env.clone(),
            })?;

        let body = tokio::fs::read(artifact.path())
            .await
            .map_err(|source| PublishError::ReadArtifact {
                path: artifact.path().to_path_buf(),
                source,
            })?;

        let mut endpoint = release.upload_endpoint().clone();
        endpoint.query_pairs_mut().append_pair("name", &name);

        info!(
            "[{prefix}] uploading `{name}` ({} bytes) to release {}",
            body.len(),
            release.tag_name()
        );
        let response = self
            .client
            .post(endpoint)
            .header(AUTHORIZATION, credential.authorization())
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(CONTENT_TYPE, artifact.content_type())
            .body(body)
            .send()
            .await
            .map_err(|source| PublishError::Network {
                name: name.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(name, status, body));
        }

        let mut asset = response
            .json::<PublishedAsset>()
            .await
            .unwrap_or_else(|_| PublishedAsset {
                name: name.clone(),
                content_type: String::new(),
                browser_download_url: None,
                dry_run: false,
            });
        if asset.content_type.is_empty() {
            asset.content_type = artifact.content_type().to_string();
        }

        info!("[{prefix}] published `{}`", asset.name);
        Ok(asset)
    }
}

/// Map a non-success upload response onto the publish error taxonomy.
fn classify_failure(name: String, status: StatusCode, body: String) -> PublishError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Unauthorized {
            name,
            status: status.as_u16(),
        },
        // GitHub answers 422 `already_exists` for a duplicate asset name.
        StatusCode::UNPROCESSABLE_ENTITY if body.contains("already_exists") => {
            PublishError::NameCollision { name }
        }
        _ => PublishError::Service {
            name,
            status: status.as_u16(),
            body,
        },
    }
}
