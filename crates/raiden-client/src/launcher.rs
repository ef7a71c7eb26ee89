// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Resolve, install and start a node in one pass

use crate::config::ClientConfig;
use crate::error::Result;
use crate::installer::Installer;
use crate::process::ProcessController;
use crate::readiness::ReadinessMonitor;
use crate::release::ReleaseDescriptor;
use crate::source::ReleaseCatalog;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Drives one channel from release lookup to a ready node
#[derive(Debug)]
pub struct ClientLauncher {
    config: ClientConfig,
    catalog: ReleaseCatalog,
    installer: Installer,
}

impl ClientLauncher {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let catalog = ReleaseCatalog::new(config.channel.source(&config)?);
        let installer = Installer::with_client(config.http_client()?);
        Ok(Self {
            config,
            catalog,
            installer,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ReleaseCatalog {
        &self.catalog
    }

    /// The configured release tag, or the channel's newest release.
    pub async fn resolve(&self) -> Result<ReleaseDescriptor> {
        let release = match self.config.release_tag.as_deref() {
            Some(tag) => self.catalog.fetch_by_tag(tag).await?,
            None => self.catalog.latest().await?,
        };
        info!(
            channel = ?release.channel,
            "Resolved {}",
            release.display_version()
        );
        Ok(release)
    }

    /// Install `release` unless it is already present and no reinstall was asked for.
    pub async fn ensure_installed(&self, release: &ReleaseDescriptor) -> Result<PathBuf> {
        let binary_dir = &self.config.binary_dir;
        if release.is_installed(binary_dir) && !self.config.force_install {
            let path = release.install_path(binary_dir);
            info!("{} already installed at {}", release.binary_name(), path.display());
            return Ok(path);
        }
        self.installer
            .install(release, binary_dir, self.config.force_install)
            .await
    }

    /// Adopt a running node of `release`, launching one if none is found.
    ///
    /// Fails with [`ClientError::Config`](crate::ClientError::Config) when the
    /// node's config or passphrase file is not configured.
    pub fn start(&self, release: &ReleaseDescriptor) -> Result<ProcessController> {
        let (config_file, passphrase_file) = self.config.node_files()?;
        let mut controller = ProcessController::attach(release, &self.config.binary_dir);
        if controller.pid().is_none() {
            controller.launch(config_file, passphrase_file)?;
        }
        Ok(controller)
    }

    pub fn readiness_monitor(&self, cancel: CancellationToken) -> Result<ReadinessMonitor> {
        let mut monitor = ReadinessMonitor::new(&self.config.web_ui_url, self.config.http_client()?)?
            .with_poll_interval(self.config.poll_interval())
            .with_cancellation(cancel);
        if let Some(secs) = self.config.readiness_deadline_secs {
            monitor = monitor.with_deadline(Duration::from_secs(secs));
        }
        if let Some(attempts) = self.config.readiness_max_attempts {
            monitor = monitor.with_max_attempts(attempts);
        }
        Ok(monitor)
    }

    /// Resolve, install, start and wait until the web ui is up.
    ///
    /// A node that never becomes ready is killed before the error is returned.
    pub async fn launch<F>(
        &self,
        cancel: CancellationToken,
        observer: F,
    ) -> Result<(ReleaseDescriptor, ProcessController)>
    where
        F: FnMut(&Value),
    {
        self.config.node_files()?;
        let release = self.resolve().await?;
        self.ensure_installed(&release).await?;
        let mut controller = self.start(&release)?;

        let ready = self
            .readiness_monitor(cancel)?
            .wait_for_ready(&mut controller, observer)
            .await;
        if let Err(e) = ready {
            warn!("{} did not become ready: {e}", release.binary_name());
            if let Err(kill_error) = controller.kill().await {
                error!("Failed to stop {}: {kill_error}", release.binary_name());
            }
            return Err(e);
        }
        Ok((release, controller))
    }
}
