//! External termination triggers for watch mode
//!
//! A `TriggerRegistration` is the context object that wires the three
//! process-external triggers (interrupt, host exit, unhandled fault) to the
//! supervisor's single `terminate` entry point:
//!
//! - interrupt: SIGINT and SIGTERM listeners, live as soon as `register`
//!   returns, drained by a tokio task
//! - host exit: dropping the registration
//! - fault: the process-wide panic hook, or `TerminationHandle::fire` from
//!   the host
//!
//! The panic hook is installed once per process. Registrations add their
//! handle to its registry and remove it again on drop, and the registry only
//! holds `Weak` references, so it never keeps a supervisor alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError, Weak};

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::process::{ProcessSupervisor, TerminationCause};

/// Which triggers to register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSet {
    pub interrupt: bool,
    pub fault_hook: bool,
}

impl Default for TriggerSet {
    fn default() -> Self {
        Self::all()
    }
}

impl TriggerSet {
    pub fn all() -> Self {
        Self {
            interrupt: true,
            fault_hook: true,
        }
    }

    /// Host exit only; the host fires the rest through a `TerminationHandle`
    pub fn manual() -> Self {
        Self {
            interrupt: false,
            fault_hook: false,
        }
    }
}

/// Cloneable entry point into the supervisor's `terminate`
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    supervisor: Weak<ProcessSupervisor>,
}

impl TerminationHandle {
    pub fn new(supervisor: &Arc<ProcessSupervisor>) -> Self {
        Self {
            supervisor: Arc::downgrade(supervisor),
        }
    }

    /// Returns `true` if this call delivered the termination signal
    pub fn fire(&self, cause: TerminationCause) -> bool {
        match self.supervisor.upgrade() {
            Some(supervisor) => supervisor.terminate(cause),
            None => false,
        }
    }
}

/// SIGINT/SIGTERM listeners. The OS-level handlers are in place once
/// `install` returns; `recv` only waits for the next delivery.
#[derive(Debug)]
pub struct InterruptListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl InterruptListener {
    /// Must be called from within a tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolves on the next SIGINT or SIGTERM (ctrl-c elsewhere)
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => {}
                _ = self.terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

/// Live registration of watch-mode triggers. Dropping it counts as host exit.
#[derive(Debug)]
pub struct TriggerRegistration {
    handle: TerminationHandle,
    signal_task: Option<JoinHandle<()>>,
    fault_id: Option<u64>,
}

impl TriggerRegistration {
    /// Register `triggers` against `supervisor`. Needs a tokio runtime when
    /// `triggers.interrupt` is set.
    pub fn register(supervisor: &Arc<ProcessSupervisor>, triggers: TriggerSet) -> Self {
        let handle = TerminationHandle::new(supervisor);

        let signal_task = if triggers.interrupt {
            match InterruptListener::install() {
                Ok(mut listener) => {
                    let handle = handle.clone();
                    Some(tokio::spawn(async move {
                        listener.recv().await;
                        if handle.fire(TerminationCause::Interrupt) {
                            info!("Interrupt received, managed process terminated");
                        }
                    }))
                }
                Err(e) => {
                    warn!("Cannot listen for interrupts: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let fault_id = triggers.fault_hook.then(|| register_fault_handle(handle.clone()));

        debug!("Registered termination triggers: {:?}", triggers);
        Self {
            handle,
            signal_task,
            fault_id,
        }
    }

    pub fn handle(&self) -> TerminationHandle {
        self.handle.clone()
    }
}

impl Drop for TriggerRegistration {
    fn drop(&mut self) {
        if let Some(task) = self.signal_task.take() {
            task.abort();
        }
        if let Some(id) = self.fault_id.take() {
            unregister_fault_handle(id);
        }
        if self.handle.fire(TerminationCause::HostExit) {
            info!("Host exiting, managed process terminated");
        }
    }
}

static FAULT_HOOK: Once = Once::new();
static NEXT_FAULT_ID: AtomicU64 = AtomicU64::new(0);
static FAULT_HANDLES: Mutex<Vec<(u64, TerminationHandle)>> = Mutex::new(Vec::new());

fn fault_handles() -> MutexGuard<'static, Vec<(u64, TerminationHandle)>> {
    FAULT_HANDLES.lock().unwrap_or_else(PoisonError::into_inner)
}

fn register_fault_handle(handle: TerminationHandle) -> u64 {
    FAULT_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let handles: Vec<TerminationHandle> = fault_handles().iter().map(|(_, h)| h.clone()).collect();
            for handle in handles {
                handle.fire(TerminationCause::Fault);
            }
            previous(panic_info);
        }));
    });

    let id = NEXT_FAULT_ID.fetch_add(1, Ordering::Relaxed);
    fault_handles().push((id, handle));
    id
}

fn unregister_fault_handle(id: u64) {
    fault_handles().retain(|(registered, _)| *registered != id);
}

#[cfg(test)]
fn is_fault_registered(id: u64) -> bool {
    fault_handles().iter().any(|(registered, _)| *registered == id)
}
