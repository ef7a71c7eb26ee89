// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Release archive download and single-binary extraction

use crate::config::build_http_client;
use crate::error::{ClientError, Result};
use crate::release::ReleaseDescriptor;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(unix)]
const BINARY_MODE: u32 = 0o770;
const STAGING_SUFFIX: &str = ".partial";

/// Container format of a release artifact, derived from its URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    fn from_url(url: &str) -> Self {
        if url.ends_with(".gz") {
            Self::TarGz
        } else {
            Self::Zip
        }
    }
}

#[derive(Debug, Clone)]
pub struct Installer {
    client: reqwest::Client,
}

impl Installer {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `release` and place its binary under `destination_root`.
    ///
    /// Only the first archive member is extracted. The binary is staged next
    /// to the destination and renamed into place, so an existing install is
    /// only replaced once extraction has succeeded.
    pub async fn install(
        &self,
        release: &ReleaseDescriptor,
        destination_root: &Path,
        force: bool,
    ) -> Result<PathBuf> {
        let destination = release.install_path(destination_root);
        if destination.exists() && !force {
            return Err(ClientError::AlreadyInstalled(destination));
        }

        std::fs::create_dir_all(destination_root)?;

        tracing::info!(
            url = %release.download_url,
            "Downloading {}",
            release.display_version()
        );
        let archive = self.download(&release.download_url).await?;

        let staging = destination_root.join(format!("{}{STAGING_SUFFIX}", release.binary_name()));
        if let Err(e) = stage_binary(archive, &release.download_url, &staging) {
            if staging.exists() {
                let _ = std::fs::remove_file(&staging);
            }
            return Err(e);
        }

        if destination.exists() {
            tracing::info!("Overwriting {}", destination.display());
        }
        std::fs::rename(&staging, &destination)?;

        tracing::info!("Installed {}", destination.display());
        Ok(destination)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Download(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ClientError::Download(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Download(format!("Failed to download bytes: {e}")))?;
        tracing::debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Extract the archive's first member to `staging` and make it executable.
fn stage_binary(archive: Vec<u8>, url: &str, staging: &Path) -> Result<()> {
    match ArchiveKind::from_url(url) {
        ArchiveKind::TarGz => extract_first_tar_member(&archive, staging)?,
        ArchiveKind::Zip => extract_first_zip_member(archive, staging)?,
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staging, std::fs::Permissions::from_mode(BINARY_MODE))?;
    }
    Ok(())
}

fn write_member(mut member: impl Read, destination: &Path) -> Result<()> {
    let mut file = File::create(destination)?;
    std::io::copy(&mut member, &mut file)?;
    Ok(())
}

fn extract_first_tar_member(archive: &[u8], destination: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(archive));
    let entry = archive
        .entries()
        .map_err(|e| ClientError::Extraction(format!("Invalid tar archive: {e}")))?
        .next()
        .ok_or_else(|| ClientError::Extraction("Archive is empty".to_string()))?
        .map_err(|e| ClientError::Extraction(format!("Invalid tar entry: {e}")))?;

    if !entry.header().entry_type().is_file() {
        return Err(ClientError::Extraction(format!(
            "First archive member {} is not a file",
            entry.path().map(|p| p.display().to_string()).unwrap_or_default()
        )));
    }
    write_member(entry, destination)
}

fn extract_first_zip_member(archive: Vec<u8>, destination: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| ClientError::Extraction(format!("Invalid zip archive: {e}")))?;
    if archive.is_empty() {
        return Err(ClientError::Extraction("Archive is empty".to_string()));
    }

    let member = archive
        .by_index(0)
        .map_err(|e| ClientError::Extraction(format!("Invalid zip entry: {e}")))?;
    if !member.is_file() {
        return Err(ClientError::Extraction(format!(
            "First archive member {} is not a file",
            member.name()
        )));
    }
    write_member(member, destination)
}
