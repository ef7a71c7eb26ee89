// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Raiden client installer and supervisor
//!
//! Resolves releases of the Raiden node from the stable, testnet and nightly
//! channels, installs the binary into a per-user directory, launches it and
//! waits until its web UI is ready.

pub mod config;
pub mod error;
pub mod installer;
pub mod launcher;
pub mod process;
pub mod readiness;
pub mod release;
pub mod source;
pub mod version;

pub use config::{ClientConfig, ReleaseChannel};
pub use error::{ClientError, Result};
pub use installer::Installer;
pub use launcher::ClientLauncher;
pub use process::{ProcessController, ProcessProbe, ProcessState};
pub use readiness::{ReadinessMonitor, ReadinessState};
pub use release::{OrderingPolicy, ReleaseDescriptor};
pub use source::{GitHubSource, NightlySource, ReleaseCatalog, ReleaseSource};
pub use version::{ModifierKind, VersionData, VersionModifier};
