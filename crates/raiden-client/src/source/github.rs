// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! GitHub releases source for the stable and testnet channels

use super::ReleaseSource;
use crate::config::ReleaseChannel;
use crate::error::{ClientError, Result};
use crate::release::{ASSET_SUFFIX, ReleaseDescriptor};
use crate::version::VersionData;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;

const REPOSITORY: &str = "raiden-network/raiden";
const DOWNLOAD_BASE_URL: &str = "https://github.com/raiden-network/raiden/releases/download";

#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

fn asset_pattern(channel: ReleaseChannel) -> Regex {
    let version = r"raiden-v(?P<major>\d+)\.(?P<minor>\d+)\.(?P<revision>\d+)";
    let extra = match channel {
        ReleaseChannel::Stable => "",
        ReleaseChannel::Testnet | ReleaseChannel::Nightly => "(?P<extra>.*)",
    };
    Regex::new(&format!("^{version}{extra}-{}$", regex::escape(ASSET_SUFFIX)))
        .expect("asset pattern is valid")
}

/// Release index served by the GitHub releases API
#[derive(Debug)]
pub struct GitHubSource {
    channel: ReleaseChannel,
    api_base_url: String,
    client: reqwest::Client,
    asset_pattern: Regex,
}

impl GitHubSource {
    /// Create a source for the stable or testnet channel
    pub fn new(channel: ReleaseChannel, api_base_url: &str, client: reqwest::Client) -> Self {
        Self {
            channel,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client,
            asset_pattern: asset_pattern(channel),
        }
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{REPOSITORY}/releases", self.api_base_url)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("Request to {url} failed: {e}")))?;

        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            && remaining < 10
        {
            tracing::warn!("GitHub rate limit low: {remaining} remaining");
        }

        Ok(response)
    }

    /// First asset of a release record that matches this channel's naming pattern
    fn descriptor_from_record(&self, record: &GithubRelease) -> Option<ReleaseDescriptor> {
        record.assets.iter().find_map(|asset| {
            let captures = self.asset_pattern.captures(&asset.name)?;
            let version = VersionData::from_captures(&captures)?;
            Some(ReleaseDescriptor::tagged(
                self.channel,
                &asset.browser_download_url,
                version,
            ))
        })
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    format!("GitHub API error {status}: {body}")
}

#[async_trait]
impl ReleaseSource for GitHubSource {
    fn channel(&self) -> ReleaseChannel {
        self.channel
    }

    async fn list(&self) -> Result<Vec<ReleaseDescriptor>> {
        let response = self.get(&self.releases_url()).await?;
        if !response.status().is_success() {
            return Err(ClientError::Network(error_body(response).await));
        }

        let records: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("Failed to parse releases: {e}")))?;

        let releases = records
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<GithubRelease>(value) {
                Ok(record) => {
                    let descriptor = self.descriptor_from_record(&record);
                    if descriptor.is_none() {
                        tracing::debug!(
                            "Release {:?} has no {ASSET_SUFFIX} asset for {:?}",
                            record.tag_name,
                            self.channel
                        );
                    }
                    descriptor
                }
                Err(e) => {
                    tracing::debug!("Skipping malformed release record: {e}");
                    None
                }
            })
            .collect();

        Ok(releases)
    }

    async fn fetch_by_tag(&self, tag: &str) -> Result<ReleaseDescriptor> {
        let url = format!("{}/tags/{tag}", self.releases_url());
        let response = self.get(&url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("release tag {tag}")));
        }
        if !response.status().is_success() {
            return Err(ClientError::Network(error_body(response).await));
        }

        let record: GithubRelease = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("Failed to parse release: {e}")))?;

        self.descriptor_from_record(&record).ok_or_else(|| {
            ClientError::NotFound(format!("release {tag} has no {ASSET_SUFFIX} asset"))
        })
    }

    fn build_download_url(&self, version: &VersionData, _built_at: Option<NaiveDateTime>) -> String {
        let release = version.release();
        format!("{DOWNLOAD_BASE_URL}/v{release}/raiden-v{release}-{ASSET_SUFFIX}")
    }
}
