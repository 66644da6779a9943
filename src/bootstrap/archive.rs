//! Toolchain archive fetch and extraction
//!
//! The archive is downloaded and unpacked into a staging directory next to
//! its final location, then renamed into place. The extracted executable is
//! the completion marker: when it already exists nothing is fetched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::error::BootstrapError;
use crate::platform::ToolArchive;

/// No data received for this long aborts the download.
const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BootstrapError + '_ {
    move |source| BootstrapError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Make `tool` available under `tools_dir`, returning the executable path.
pub(super) async fn ensure_tool(
    log_prefix: &str,
    client: &reqwest::Client,
    tool: &ToolArchive,
    url: &str,
    tools_dir: &Path,
) -> Result<PathBuf, BootstrapError> {
    let install_dir = tools_dir.join(tool.name);
    let executable = install_dir.join(tool.executable);

    if tokio::fs::try_exists(&executable)
        .await
        .map_err(io_err(&executable))?
    {
        debug!(
            "[{log_prefix}] {} already present at {}, skipping download",
            tool.name,
            executable.display()
        );
        return Ok(executable);
    }

    tokio::fs::create_dir_all(tools_dir)
        .await
        .map_err(io_err(tools_dir))?;

    // Staging lives beside the install dir so the final rename stays on one filesystem.
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{}-", tool.name))
        .tempdir_in(tools_dir)
        .map_err(io_err(tools_dir))?;
    let archive_path = staging.path().join(format!("{}.zip", tool.name));
    let extract_dir = staging.path().join("extracted");

    info!("[{log_prefix}] downloading {} from {url}", tool.name);
    let bytes = download(client, url, &archive_path).await?;
    debug!("[{log_prefix}] downloaded {bytes} bytes to {}", archive_path.display());

    extract_zip(&archive_path, &extract_dir).await?;

    if !tokio::fs::try_exists(extract_dir.join(tool.executable))
        .await
        .map_err(io_err(&extract_dir))?
    {
        return Err(BootstrapError::MissingExecutable {
            url: url.to_string(),
            executable: tool.executable.to_string(),
        });
    }

    // A directory without the marker is a leftover from an interrupted run.
    if tokio::fs::try_exists(&install_dir)
        .await
        .map_err(io_err(&install_dir))?
    {
        tokio::fs::remove_dir_all(&install_dir)
            .await
            .map_err(io_err(&install_dir))?;
    }
    tokio::fs::rename(&extract_dir, &install_dir)
        .await
        .map_err(io_err(&install_dir))?;

    info!("[{log_prefix}] {} installed at {}", tool.name, executable.display());
    Ok(executable)
}

/// Stream `url` into `dest`, returning the number of bytes written.
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64, BootstrapError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| BootstrapError::Download {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(BootstrapError::DownloadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let mut file = tokio::fs::File::create(dest).await.map_err(io_err(dest))?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    loop {
        let chunk = match timeout(DOWNLOAD_INACTIVITY_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(source))) => {
                return Err(BootstrapError::Download {
                    url: url.to_string(),
                    source,
                });
            }
            Ok(None) => break,
            Err(_) => {
                return Err(BootstrapError::DownloadTimeout {
                    url: url.to_string(),
                    secs: DOWNLOAD_INACTIVITY_TIMEOUT.as_secs(),
                });
            }
        };
        file.write_all(&chunk).await.map_err(io_err(dest))?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err(dest))?;
    Ok(downloaded)
}

/// Unpack a zip archive; extraction is CPU-bound so it runs on the blocking pool.
async fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), BootstrapError> {
    let archive_path = archive_path.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive_path).map_err(io_err(&archive_path))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|source| BootstrapError::Extract {
            archive: archive_path.clone(),
            source,
        })?;
        archive
            .extract(&dest)
            .map_err(|source| BootstrapError::Extract {
                archive: archive_path.clone(),
                source,
            })
    })
    .await
    .map_err(|e| BootstrapError::Io {
        path: PathBuf::from("<extract task>"),
        source: std::io::Error::other(e),
    })?
}
