//! Supervisor for the single managed process
//!
//! Owns the child from spawn to exit. The process is started in its own
//! session so that signals aimed at the launcher never reach it implicitly;
//! the only way it is stopped is an explicit `terminate`.
//!
//! `terminate` may be reached from a signal task, a panic hook, a `Drop`
//! impl, and the normal completion path at the same time. It is guarded by
//! an atomic compare-and-swap, so at most one SIGTERM is ever sent.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::*;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::watch;

use crate::config::LaunchConfig;
use crate::error::LaunchError;
use crate::process::args::launch_args;

/// Lifecycle of the managed process. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ProcessState {
    NotStarted = 0,
    Running = 1,
    Terminated = 2,
}

impl ProcessState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessState::NotStarted,
            1 => ProcessState::Running,
            _ => ProcessState::Terminated,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Terminated)
    }
}

/// Why a termination was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationCause {
    /// `complete` outside watch mode
    Completed,
    /// SIGINT / SIGTERM delivered to the launcher
    Interrupt,
    /// The launcher is going away
    HostExit,
    /// A panic or a fault reported by the host
    Fault,
    /// Readiness wait ran out and cleanup on timeout is enabled
    ReadinessTimeout,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationCause::Completed => "completed",
            TerminationCause::Interrupt => "interrupt",
            TerminationCause::HostExit => "host exit",
            TerminationCause::Fault => "fault",
            TerminationCause::ReadinessTimeout => "readiness timeout",
        };
        write!(f, "{}", s)
    }
}

/// How the managed process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitRecord {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub exited_at: DateTime<Utc>,
}

impl ExitRecord {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            exited_at: Utc::now(),
        }
    }

    fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
            exited_at: Utc::now(),
        }
    }
}

impl fmt::Display for ExitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code {}", code)?,
            None => write!(f, "code null")?,
        }
        if let Some(signal) = self.signal {
            write!(f, " and signal {}", signal)?;
        }
        Ok(())
    }
}

/// State shared with the exit observer task
struct Shared {
    state: AtomicU8,
    exit_tx: watch::Sender<Option<ExitRecord>>,
}

impl Shared {
    /// Mark the process terminated and publish how it ended
    fn record_exit(&self, record: ExitRecord) -> ExitRecord {
        self.state.store(ProcessState::Terminated as u8, Ordering::SeqCst);
        self.exit_tx.send_replace(Some(record.clone()));
        record
    }
}

/// Owns exactly one managed OS process
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
    start_claimed: AtomicBool,
    terminate_requested: AtomicBool,
    signals_sent: AtomicUsize,
    pid: OnceLock<u32>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("state", &self.state())
            .field("pid", &self.pid())
            .field("signals_sent", &self.signals_sent())
            .finish()
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(ProcessState::NotStarted as u8),
                exit_tx,
            }),
            start_claimed: AtomicBool::new(false),
            terminate_requested: AtomicBool::new(false),
            signals_sent: AtomicUsize::new(0),
            pid: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    /// Number of termination signals actually delivered
    pub fn signals_sent(&self) -> usize {
        self.signals_sent.load(Ordering::SeqCst)
    }

    pub fn exit_record(&self) -> Option<ExitRecord> {
        self.shared.exit_tx.borrow().clone()
    }

    /// Spawn `java_bin` with the launch arguments and start observing it.
    ///
    /// Must be called from within a tokio runtime. Only the first call may
    /// spawn; later calls fail with `LaunchError::AlreadyStarted`.
    pub fn start(&self, launch: &LaunchConfig, artifact_path: &Path) -> Result<u32, LaunchError> {
        if self.start_claimed.swap(true, Ordering::SeqCst) {
            return Err(LaunchError::AlreadyStarted);
        }

        let args = launch_args(launch, artifact_path);
        debug!("Spawning {} {:?}", launch.java_bin, args);

        let mut cmd = Command::new(&launch.java_bin);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(launch.stdio.to_stdio())
            .stderr(launch.stdio.to_stdio())
            .kill_on_drop(false);

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    // New session: the child leaves our process group
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                // error observer
                error!("Failed to spawn {}: {}", launch.java_bin, source);
                eprintln!("{} {}: {}", "Failed to start".red(), launch.java_bin, source);
                return Err(LaunchError::Spawn {
                    program: launch.java_bin.clone(),
                    source,
                });
            }
        };

        let Some(pid) = child.id() else {
            error!("Spawned {} but no pid was reported", launch.java_bin);
            return Err(LaunchError::NoPid {
                program: launch.java_bin.clone(),
            });
        };
        let _ = self.pid.set(pid);
        self.shared.state.store(ProcessState::Running as u8, Ordering::SeqCst);
        info!("Started {} (pid {}) on port {}", launch.java_bin, pid, launch.port);

        // exit observer
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let waited = child.wait().await;
            // The pid is reaped now; publish before anything that can block
            let record = match waited {
                Ok(status) => shared.record_exit(ExitRecord::from_status(status)),
                Err(e) => {
                    let record = shared.record_exit(ExitRecord::unknown());
                    error!("Waiting on pid {} failed: {}", pid, e);
                    record
                }
            };
            println!("WireMock exited with {}\n", record);
            info!("Managed process {} exited with {}", pid, record);
        });

        Ok(pid)
    }

    /// Ask the process to stop with SIGTERM.
    ///
    /// Returns `true` only for the one call that actually sent the signal.
    /// A no-op when the process is not running or termination was already
    /// requested. Does not wait for the process to exit.
    pub fn terminate(&self, cause: TerminationCause) -> bool {
        if self.state() != ProcessState::Running {
            debug!("Terminate ({}) ignored in state {:?}", cause, self.state());
            return false;
        }
        if self
            .terminate_requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Terminate ({}) ignored, already requested", cause);
            return false;
        }
        let Some(pid) = self.pid().filter(|pid| *pid > 0) else {
            return false;
        };

        println!("{}", "Shutting down wiremock".yellow());
        tracing::info!(pid, cause = %cause, "Sending SIGTERM to managed process");

        if let Err(e) = send_sigterm(pid) {
            warn!("SIGTERM to pid {} failed: {}", pid, e);
        }
        self.signals_sent.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Wait up to `limit` for the exit observer to record an exit.
    pub async fn wait_for_exit(&self, limit: Duration) -> Option<ExitRecord> {
        if self.state() == ProcessState::NotStarted {
            return None;
        }
        let mut rx = self.shared.exit_tx.subscribe();
        match tokio::time::timeout(limit, rx.wait_for(|record| record.is_some())).await {
            Ok(Ok(record)) => record.clone(),
            _ => None,
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> std::io::Result<()> {
    // 0 and negative values address process groups, never a single child
    let pid = libc::pid_t::try_from(pid)
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid pid {}", pid)))?;
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "SIGTERM is only available on unix",
    ))
}
