// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Launching, locating and killing the node process

use crate::error::{ClientError, Result};
use crate::release::ReleaseDescriptor;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, error, info, warn};

const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What the controller knows about its node process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// No process launched or found yet
    Unsupervised,
    Supervised(u32),
    /// A previously supervised process is gone
    Terminated,
}

impl ProcessState {
    pub fn pid(self) -> Option<u32> {
        match self {
            Self::Supervised(pid) => Some(pid),
            Self::Unsupervised | Self::Terminated => None,
        }
    }
}

/// Process liveness as seen by the readiness loop
pub trait ProcessProbe {
    /// Pid cached by the last launch or refresh
    fn cached_pid(&self) -> Option<u32>;

    /// Whether the cached pid is a dead or zombie process
    fn is_zombie(&mut self) -> bool;

    /// Re-scan and update the cached pid
    fn refresh(&mut self) -> ProcessState;
}

fn is_defunct(status: ProcessStatus) -> bool {
    matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

fn name_matches(process: &Process, binary_name: &str) -> bool {
    if process.name().to_string_lossy().eq_ignore_ascii_case(binary_name) {
        return true;
    }
    // Process names are truncated by the kernel; the executable keeps the full name.
    process
        .exe()
        .and_then(Path::file_name)
        .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case(binary_name))
}

/// Controls one installed release's node process
pub struct ProcessController {
    binary_name: String,
    binary_path: PathBuf,
    system: System,
    state: ProcessState,
    child: Option<Child>,
}

impl std::fmt::Debug for ProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessController")
            .field("binary_path", &self.binary_path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ProcessController {
    pub fn new(release: &ReleaseDescriptor, binary_dir: &Path) -> Self {
        Self {
            binary_name: release.binary_name(),
            binary_path: release.install_path(binary_dir),
            system: System::new(),
            state: ProcessState::Unsupervised,
            child: None,
        }
    }

    /// Controller adopting an already running node of this release, if any
    pub fn attach(release: &ReleaseDescriptor, binary_dir: &Path) -> Self {
        let mut controller = Self::new(release, binary_dir);
        if let Some(pid) = controller.find_process_id() {
            info!(pid, "Attached to running {}", controller.binary_name);
            controller.state = ProcessState::Supervised(pid);
        }
        controller
    }

    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.pid()
    }

    /// Highest live pid whose name matches the binary
    pub fn find_process_id(&mut self) -> Option<u32> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );

        let binary_name = &self.binary_name;
        self.system
            .processes()
            .iter()
            .filter(|(_, process)| !is_defunct(process.status()))
            .filter(|(_, process)| name_matches(process, binary_name))
            .map(|(pid, _)| pid.as_u32())
            .max()
    }

    pub fn is_running(&mut self) -> bool {
        self.find_process_id().is_some()
    }

    /// Start the installed binary with `--config-file` and `--password-file`.
    pub fn launch(&mut self, config_file: &Path, passphrase_file: &Path) -> Result<u32> {
        if let Some(child) = self.child.as_mut()
            && matches!(child.try_wait(), Ok(None))
        {
            warn!("{} is already running", self.binary_name);
            return Ok(child.id());
        }

        info!("Starting {}", self.binary_path.display());
        let child = Command::new(&self.binary_path)
            .arg("--config-file")
            .arg(config_file)
            .arg("--password-file")
            .arg(passphrase_file)
            .spawn()
            .map_err(|e| {
                ClientError::Process(format!("Failed to start {}: {e}", self.binary_path.display()))
            })?;

        let pid = child.id();
        info!(pid, "Started {}", self.binary_name);
        self.child = Some(child);
        self.state = ProcessState::Supervised(pid);
        Ok(pid)
    }

    /// Kill the supervised process and confirm it is gone.
    ///
    /// Does nothing when no pid is cached. Fails with
    /// [`ClientError::InvariantViolation`] if a matching process survives.
    pub async fn kill(&mut self) -> Result<()> {
        let ProcessState::Supervised(pid) = self.state else {
            debug!("No supervised process to kill");
            return Ok(());
        };

        info!(pid, "Killing {}", self.binary_name);
        if let Some(mut child) = self.child.take_if(|child| child.id() == pid) {
            child
                .kill()
                .map_err(|e| ClientError::Process(format!("Failed to kill {pid}: {e}")))?;
            reap_child(&mut child, pid).await?;
        } else {
            self.signal_kill(pid)?;
            self.wait_for_exit(pid).await;
        }

        if let Some(survivor) = self.find_process_id() {
            error!(pid = survivor, "{} still running after kill", self.binary_name);
            return Err(ClientError::InvariantViolation { pid: survivor });
        }

        info!(pid, "{} terminated", self.binary_name);
        self.state = ProcessState::Terminated;
        Ok(())
    }

    #[cfg(unix)]
    fn signal_kill(&self, pid: u32) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};

        let raw = i32::try_from(pid)
            .map_err(|_| ClientError::Process(format!("Invalid pid {pid}")))?;
        match signal::kill(nix::unistd::Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(ClientError::Process(format!("Failed to send SIGKILL to {pid}: {e}"))),
        }
    }

    #[cfg(not(unix))]
    fn signal_kill(&mut self, pid: u32) -> Result<()> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if let Some(process) = self.system.process(pid) {
            process.kill();
        }
        Ok(())
    }

    /// Poll until `pid` is gone or defunct, giving up after a bounded wait.
    async fn wait_for_exit(&mut self, pid: u32) {
        let started = Instant::now();
        while started.elapsed() < KILL_CONFIRM_TIMEOUT {
            if !self.pid_alive(pid) {
                return;
            }
            tokio::time::sleep(KILL_POLL_INTERVAL).await;
        }
        warn!(pid, "Process did not exit within {KILL_CONFIRM_TIMEOUT:?}");
    }

    fn pid_alive(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        self.system
            .process(pid)
            .is_some_and(|process| !is_defunct(process.status()))
    }

    /// Reap an exited child and re-scan for the node process.
    pub fn refresh(&mut self) -> ProcessState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(pid = child.id(), "{} exited: {status}", self.binary_name);
                    self.child = None;
                }
                Ok(None) => {}
                Err(e) => warn!("Error checking child status: {e}"),
            }
        }

        self.state = match (self.find_process_id(), self.state) {
            (Some(pid), _) => ProcessState::Supervised(pid),
            (None, ProcessState::Unsupervised) => ProcessState::Unsupervised,
            (None, _) => ProcessState::Terminated,
        };
        self.state
    }

    /// Whether the cached pid is dead or a zombie.
    pub fn is_zombie(&mut self) -> bool {
        let Some(pid) = self.state.pid() else {
            return false;
        };
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        self.system
            .process(pid)
            .is_some_and(|process| is_defunct(process.status()))
    }
}

/// Poll `try_wait` until the killed child has been reaped.
async fn reap_child(child: &mut Child, pid: u32) -> Result<()> {
    let started = Instant::now();
    while started.elapsed() < KILL_CONFIRM_TIMEOUT {
        let exited = child
            .try_wait()
            .map_err(|e| ClientError::Process(format!("Failed to reap {pid}: {e}")))?;
        if let Some(status) = exited {
            debug!(pid, "Reaped child: {status}");
            return Ok(());
        }
        tokio::time::sleep(KILL_POLL_INTERVAL).await;
    }
    warn!(pid, "Child not reaped within {KILL_CONFIRM_TIMEOUT:?}");
    Ok(())
}

impl ProcessProbe for ProcessController {
    fn cached_pid(&self) -> Option<u32> {
        self.pid()
    }

    fn is_zombie(&mut self) -> bool {
        ProcessController::is_zombie(self)
    }

    fn refresh(&mut self) -> ProcessState {
        ProcessController::refresh(self)
    }
}
