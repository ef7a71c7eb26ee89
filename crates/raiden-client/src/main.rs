// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Raiden launcher - installs the configured release and runs it until Ctrl-C

use anyhow::Context;
use raiden_client::{ClientConfig, ClientLauncher};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("raiden_client=debug".parse()?),
        )
        .init();

    info!("Starting Raiden launcher");

    let config = ClientConfig::load().context("Failed to load launcher config")?;
    info!(
        "Loaded config: channel={:?}, release_tag={:?}, binary_dir={}",
        config.channel,
        config.release_tag,
        config.binary_dir.display()
    );

    let launcher = ClientLauncher::new(config).context("Failed to set up launcher")?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutdown signal received");
        trigger.cancel();
    });

    let (release, mut controller) = launcher
        .launch(shutdown.clone(), |status| info!("Node status: {status}"))
        .await
        .context("Failed to start raiden")?;
    info!(
        pid = ?controller.pid(),
        "{} is ready at {}",
        release.display_version(),
        launcher.config().web_ui_url
    );

    shutdown.cancelled().await;
    controller
        .kill()
        .await
        .context("Failed to stop raiden")?;
    info!("Shutting down");

    Ok(())
}
