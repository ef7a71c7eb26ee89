// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Polling a freshly launched node until its web UI accepts connections

use crate::error::{ClientError, Result};
use crate::process::ProcessProbe;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const STATUS_PATH: &str = "/api/v1/status";

const READY_STATUS: &str = "ready";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Progress of a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    NotStarted,
    /// Checking that the node process is still alive
    WaitingForProcess,
    /// Polling the status endpoint
    PollingStatus,
    /// Status reported ready, waiting for the port to accept a connection
    ConfirmingPort,
    Ready,
    /// The wait ended without the node becoming ready
    Terminated,
}

/// Outcome of one status request
#[derive(Debug)]
enum StatusPoll {
    Ready,
    Pending(Value),
    Unavailable,
}

#[derive(Debug)]
pub struct ReadinessMonitor {
    client: reqwest::Client,
    status_url: reqwest::Url,
    host: String,
    port: u16,
    poll_interval: Duration,
    deadline: Option<Duration>,
    max_attempts: Option<u32>,
    cancel: CancellationToken,
    state: ReadinessState,
}

impl ReadinessMonitor {
    pub fn new(web_ui_url: &str, client: reqwest::Client) -> Result<Self> {
        let base = reqwest::Url::parse(web_ui_url)
            .map_err(|e| ClientError::Config(format!("Invalid web ui url {web_ui_url}: {e}")))?;
        let status_url = base
            .join(STATUS_PATH)
            .map_err(|e| ClientError::Config(format!("Invalid web ui url {web_ui_url}: {e}")))?;
        let host = base
            .host_str()
            .ok_or_else(|| ClientError::Config(format!("Web ui url {web_ui_url} has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = base
            .port_or_known_default()
            .ok_or_else(|| ClientError::Config(format!("Web ui url {web_ui_url} has no port")))?;

        Ok(Self {
            client,
            status_url,
            host,
            port,
            poll_interval: Duration::from_secs(1),
            deadline: None,
            max_attempts: None,
            cancel: CancellationToken::new(),
            state: ReadinessState::NotStarted,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Give up with [`ClientError::ReadinessTimeout`] once `deadline` has elapsed.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Give up with [`ClientError::ReadinessTimeout`] after `max_attempts` polls.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn status_url(&self) -> &reqwest::Url {
        &self.status_url
    }

    /// Wait until the node reports ready and its port accepts connections.
    ///
    /// `observer` receives every non-ready status body. Fails with
    /// [`ClientError::ProcessTerminated`] as soon as the process is gone,
    /// whatever phase the wait is in. Any failure other than
    /// [`ClientError::NotRunning`] leaves the state at `Terminated`.
    pub async fn wait_for_ready<P, F>(&mut self, probe: &mut P, observer: F) -> Result<()>
    where
        P: ProcessProbe + ?Sized,
        F: FnMut(&Value),
    {
        if probe.cached_pid().is_none() {
            return Err(ClientError::NotRunning);
        }

        let result = self.poll_until_ready(probe, observer).await;
        if result.is_err() {
            self.state = ReadinessState::Terminated;
        }
        result
    }

    async fn poll_until_ready<P, F>(&mut self, probe: &mut P, mut observer: F) -> Result<()>
    where
        P: ProcessProbe + ?Sized,
        F: FnMut(&Value),
    {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut status_ready = false;

        loop {
            self.check_bounds(started, attempts)?;
            attempts += 1;

            self.state = ReadinessState::WaitingForProcess;
            let zombie = probe.is_zombie();
            if zombie || probe.refresh().pid().is_none() {
                warn!("Process terminated while waiting for the web ui");
                return Err(ClientError::ProcessTerminated);
            }

            if !status_ready {
                self.state = ReadinessState::PollingStatus;
                info!("Waiting for raiden to start...");
                match self.poll_status().await? {
                    StatusPoll::Ready => status_ready = true,
                    StatusPoll::Pending(status) => observer(&status),
                    StatusPoll::Unavailable => {}
                }
            }

            if status_ready {
                self.state = ReadinessState::ConfirmingPort;
                if self.port_open().await {
                    info!(attempts, "Web ui ready at {}", self.status_url);
                    self.state = ReadinessState::Ready;
                    return Ok(());
                }
            }

            self.pause().await?;
        }
    }

    fn check_bounds(&self, started: Instant, attempts: u32) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let elapsed = started.elapsed();
        let exhausted = self.max_attempts.is_some_and(|max| attempts >= max)
            || self.deadline.is_some_and(|deadline| elapsed >= deadline);
        if exhausted {
            return Err(ClientError::ReadinessTimeout {
                attempts,
                elapsed_secs: elapsed.as_secs(),
            });
        }
        Ok(())
    }

    async fn poll_status(&self) -> Result<StatusPoll> {
        debug!("Checking {}", self.status_url);
        let response = match self.client.get(self.status_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Status endpoint unavailable: {e}");
                return Ok(StatusPoll::Unavailable);
            }
        };

        if !response.status().is_success() {
            debug!("Status endpoint returned {}", response.status());
            return Ok(StatusPoll::Unavailable);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("Failed to read status: {e}")))?;
        let status: Value = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("Status is not JSON: {e}")))?;

        if status.get("status").and_then(Value::as_str) == Some(READY_STATUS) {
            Ok(StatusPoll::Ready)
        } else {
            Ok(StatusPoll::Pending(status))
        }
    }

    async fn port_open(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Web ui port {} not accepting connections: {e}", self.port);
                false
            }
            Err(_) => false,
        }
    }

    async fn pause(&self) -> Result<()> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(ClientError::Cancelled),
            () = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }
}
