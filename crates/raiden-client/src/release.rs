// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Release descriptors and per-channel ordering

use crate::config::ReleaseChannel;
use crate::version::VersionData;
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Platform part of every published archive name
#[cfg(target_os = "macos")]
pub const ASSET_SUFFIX: &str = "macOS-x86_64.zip";
#[cfg(not(target_os = "macos"))]
pub const ASSET_SUFFIX: &str = "linux-x86_64.tar.gz";

/// One installable release artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseDescriptor {
    pub channel: ReleaseChannel,
    pub download_url: String,
    pub version: VersionData,
    /// Build time of a nightly; `None` on tagged channels.
    pub built_at: Option<NaiveDateTime>,
}

impl ReleaseDescriptor {
    pub fn tagged(
        channel: ReleaseChannel,
        download_url: impl Into<String>,
        version: VersionData,
    ) -> Self {
        Self {
            channel,
            download_url: download_url.into(),
            version,
            built_at: None,
        }
    }

    pub fn nightly(
        download_url: impl Into<String>,
        version: VersionData,
        built_at: NaiveDateTime,
    ) -> Self {
        Self {
            channel: ReleaseChannel::Nightly,
            download_url: download_url.into(),
            version,
            built_at: Some(built_at),
        }
    }

    /// Release string used for tag lookup and binary naming
    pub fn release(&self) -> String {
        match self.built_at {
            Some(built_at) => format!("{}-{}", self.version.release(), built_at.format("%Y%m%d")),
            None => self.version.release(),
        }
    }

    /// Human readable version
    pub fn display_version(&self) -> String {
        let version = &self.version;
        match self.channel {
            ReleaseChannel::Stable => format!(
                "Raiden {}.{}.{}",
                version.major, version.minor, version.revision
            ),
            ReleaseChannel::Testnet => {
                format!("Raiden Preview {} (Testnet only)", version.release())
            }
            ReleaseChannel::Nightly => format!("Raiden Nightly Build {}", self.release()),
        }
    }

    /// File name of the installed binary, also the process name to look for
    pub fn binary_name(&self) -> String {
        format!("{}-{}", self.channel.binary_prefix(), self.release())
    }

    pub fn install_path(&self, binary_dir: &Path) -> PathBuf {
        binary_dir.join(self.binary_name())
    }

    pub fn is_installed(&self, binary_dir: &Path) -> bool {
        self.install_path(binary_dir).exists()
    }
}

/// How releases of one channel are ranked against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// Compare version identities (stable, testnet)
    Semantic,
    /// Compare build timestamps only (nightly)
    BuildTime,
}

impl OrderingPolicy {
    pub fn for_channel(channel: ReleaseChannel) -> Self {
        match channel {
            ReleaseChannel::Stable | ReleaseChannel::Testnet => Self::Semantic,
            ReleaseChannel::Nightly => Self::BuildTime,
        }
    }

    pub fn compare(self, a: &ReleaseDescriptor, b: &ReleaseDescriptor) -> Ordering {
        match self {
            Self::Semantic => a.version.cmp(&b.version),
            Self::BuildTime => a.built_at.cmp(&b.built_at),
        }
    }

    /// Newest release under this policy
    pub fn latest<'a, I>(self, releases: I) -> Option<&'a ReleaseDescriptor>
    where
        I: IntoIterator<Item = &'a ReleaseDescriptor>,
    {
        releases.into_iter().max_by(|a, b| self.compare(a, b))
    }

    /// Sort newest first
    pub fn sort_newest_first(self, releases: &mut [ReleaseDescriptor]) {
        releases.sort_by(|a, b| self.compare(b, a));
    }
}
