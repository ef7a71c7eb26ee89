// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Configuration module for the client

use crate::error::{ClientError, Result};
use crate::source::{GitHubSource, NightlySource, ReleaseSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "RAIDEN_CLIENT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "raiden-client.toml";

pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const NIGHTLY_INDEX_URL: &str = "https://raiden-nightlies.ams3.digitaloceanspaces.com";
pub const WEB_UI_URL: &str = "http://127.0.0.1:5001";

fn default_github_api_url() -> String {
    GITHUB_API_URL.to_owned()
}

fn default_nightly_index_url() -> String {
    NIGHTLY_INDEX_URL.to_owned()
}

fn default_web_ui_url() -> String {
    WEB_UI_URL.to_owned()
}

fn default_binary_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("bin")
}

fn default_30() -> u64 {
    30
}

fn default_1000() -> u64 {
    1000
}

/// Independent release track of the Raiden client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    #[default]
    #[serde(alias = "mainnet")]
    Stable,
    #[serde(alias = "testing", alias = "demo_env")]
    Testnet,
    Nightly,
}

impl ReleaseChannel {
    /// Prefix of installed binary names on this channel
    pub fn binary_prefix(self) -> &'static str {
        match self {
            Self::Stable => "raiden",
            Self::Testnet => "raiden-testnet",
            Self::Nightly => "raiden-nightly",
        }
    }

    /// Build the release source serving this channel.
    pub fn source(self, config: &ClientConfig) -> Result<Box<dyn ReleaseSource>> {
        let client = config.http_client()?;
        Ok(match self {
            Self::Stable | Self::Testnet => {
                Box::new(GitHubSource::new(self, &config.github_api_url, client))
            }
            Self::Nightly => Box::new(NightlySource::new(&config.nightly_index_url, client)),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Release channel to install from
    #[serde(default)]
    pub channel: ReleaseChannel,

    /// Release to install; the newest listed release when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_tag: Option<String>,

    /// Directory holding installed binaries
    #[serde(default = "default_binary_dir")]
    pub binary_dir: PathBuf,

    /// Overwrite an existing binary on install
    #[serde(default)]
    pub force_install: bool,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    #[serde(default = "default_nightly_index_url")]
    pub nightly_index_url: String,

    /// Base URL of the node's web UI and REST API
    #[serde(default = "default_web_ui_url")]
    pub web_ui_url: String,

    /// Timeout applied to every HTTP request (seconds)
    #[serde(default = "default_30")]
    pub request_timeout_secs: u64,

    /// Delay between readiness checks (milliseconds)
    #[serde(default = "default_1000")]
    pub poll_interval_ms: u64,

    /// Give up waiting for readiness after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_deadline_secs: Option<u64>,

    /// Give up waiting for readiness after this many checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_max_attempts: Option<u32>,

    /// Node configuration file handed to the launched binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,

    /// Passphrase file handed to the launched binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel: ReleaseChannel::default(),
            release_tag: None,
            binary_dir: default_binary_dir(),
            force_install: false,
            github_api_url: default_github_api_url(),
            nightly_index_url: default_nightly_index_url(),
            web_ui_url: default_web_ui_url(),
            request_timeout_secs: 30,
            poll_interval_ms: 1000,
            readiness_deadline_secs: None,
            readiness_max_attempts: None,
            config_file: None,
            passphrase_file: None,
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `$RAIDEN_CLIENT_CONFIG`, then `./raiden-client.toml`, else defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        if path.exists() {
            Self::from_file(&path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ClientError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.readiness_max_attempts == Some(0) {
            return Err(ClientError::Config(
                "readiness_max_attempts must be greater than zero".to_string(),
            ));
        }
        reqwest::Url::parse(&self.web_ui_url)
            .map_err(|e| ClientError::Config(format!("Invalid web_ui_url: {e}")))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Node configuration and passphrase files; both are required to launch.
    pub fn node_files(&self) -> Result<(&Path, &Path)> {
        let config_file = self
            .config_file
            .as_deref()
            .ok_or_else(|| ClientError::Config("config_file is not set".to_string()))?;
        let passphrase_file = self
            .passphrase_file
            .as_deref()
            .ok_or_else(|| ClientError::Config("passphrase_file is not set".to_string()))?;
        Ok((config_file, passphrase_file))
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        build_http_client(self.request_timeout())
    }
}

const USER_AGENT: &str = concat!("raiden-client/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {e}")))
}
