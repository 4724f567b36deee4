//! Lifecycle controller
//!
//! Drives one managed WireMock process through a test run:
//!
//! ```text
//! Idle -> Preparing -> Ready -> ShuttingDown -> Done
//!             \-> Failed
//! ```
//!
//! `prepare` fetches the jar (unless skipped), starts the process and waits
//! for its port. `complete` stops it, except in watch mode, where the process
//! outlives the run and only the registered triggers stop it.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactFetcher, ArtifactLocation, ArtifactSource, DEFAULT_DOWNLOAD_TIMEOUT};
use crate::config::{Config, LaunchConfig};
use crate::error::{FetchError, PrepareError};
use crate::lifecycle::triggers::{TerminationHandle, TriggerRegistration, TriggerSet};
use crate::port::PortWaiter;
use crate::process::{ProcessSupervisor, TerminationCause};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Idle,
    Preparing,
    Ready,
    ShuttingDown,
    Done,
    /// `prepare` was rejected
    Failed,
}

/// Runner configuration handed to `prepare`. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub watch: bool,
}

/// Runner capabilities; accepted for hook compatibility, otherwise unused
pub type Capabilities = serde_json::Value;

pub struct LifecycleController {
    launch: LaunchConfig,
    location: ArtifactLocation,
    source: Arc<dyn ArtifactSource>,
    supervisor: Arc<ProcessSupervisor>,
    waiter: PortWaiter,
    terminate_on_timeout: bool,
    shutdown_wait: Option<Duration>,
    triggers: TriggerSet,
    phase: LifecyclePhase,
    watch_mode: bool,
    registration: Option<TriggerRegistration>,
}

impl LifecycleController {
    /// Controller downloading through an `ArtifactFetcher` with the default timeout
    pub fn new(launch: LaunchConfig) -> Result<Self, FetchError> {
        let fetcher = ArtifactFetcher::new(DEFAULT_DOWNLOAD_TIMEOUT)?;
        Ok(Self::with_source(launch, Arc::new(fetcher)))
    }

    pub fn with_source(launch: LaunchConfig, source: Arc<dyn ArtifactSource>) -> Self {
        let location = ArtifactLocation::wiremock(
            &launch.artifact_base_url,
            &launch.artifact_version,
            &launch.install_dir,
        );
        Self {
            launch,
            location,
            source,
            supervisor: Arc::new(ProcessSupervisor::new()),
            waiter: PortWaiter::default(),
            terminate_on_timeout: false,
            shutdown_wait: None,
            triggers: TriggerSet::all(),
            phase: LifecyclePhase::Idle,
            watch_mode: false,
            registration: None,
        }
    }

    /// Resolve `config` (creating the root dir) and build a controller from it
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let launch = LaunchConfig::from_config(config)?;
        let fetcher = ArtifactFetcher::new(Duration::from_millis(config.download_timeout_ms))?;
        Ok(Self::with_source(launch, Arc::new(fetcher))
            .with_port_waiter(PortWaiter::new(
                config.readiness.poll_interval(),
                config.readiness.timeout(),
            ))
            .with_terminate_on_timeout(config.readiness.terminate_on_timeout)
            .with_shutdown_wait(config.shutdown_wait_ms.map(Duration::from_millis)))
    }

    pub fn with_artifact_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_port_waiter(mut self, waiter: PortWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_terminate_on_timeout(mut self, enabled: bool) -> Self {
        self.terminate_on_timeout = enabled;
        self
    }

    pub fn with_shutdown_wait(mut self, wait: Option<Duration>) -> Self {
        self.shutdown_wait = wait;
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerSet) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn watch_mode(&self) -> bool {
        self.watch_mode
    }

    pub fn launch_config(&self) -> &LaunchConfig {
        &self.launch
    }

    pub fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Handle a host can use to report faults or interrupts it caught itself
    pub fn termination_handle(&self) -> TerminationHandle {
        match &self.registration {
            Some(registration) => registration.handle(),
            None => TerminationHandle::new(&self.supervisor),
        }
    }

    /// Runner `onPrepare` hook
    pub async fn prepare(&mut self, runner: &RunnerConfig, capabilities: &Capabilities) -> Result<(), PrepareError> {
        if self.phase != LifecyclePhase::Idle {
            return Err(PrepareError::InvalidPhase(self.phase));
        }
        self.phase = LifecyclePhase::Preparing;
        self.watch_mode = runner.watch;
        debug!("Preparing (watch: {}) with capabilities {}", self.watch_mode, capabilities);

        match self.run_prepare().await {
            Ok(()) => {
                self.phase = LifecyclePhase::Ready;
                tracing::info!(
                    port = self.launch.port,
                    watch = self.watch_mode,
                    "WireMock ready"
                );
                Ok(())
            }
            Err(e) => {
                self.phase = LifecyclePhase::Failed;
                error!("Prepare failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_prepare(&mut self) -> Result<(), PrepareError> {
        if !self.launch.skip_fetch {
            self.source.ensure_artifact(&self.location).await?;
        } else if !self.location.exists() {
            warn!(
                "Install skipped and {} is missing; launching anyway",
                self.location.local_path.display()
            );
        }

        self.supervisor.start(&self.launch, &self.location.local_path)?;

        if self.watch_mode {
            self.registration = Some(TriggerRegistration::register(&self.supervisor, self.triggers));
        }

        if let Err(e) = self.waiter.wait(self.launch.port).await {
            if self.terminate_on_timeout {
                self.supervisor.terminate(TerminationCause::ReadinessTimeout);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// `prepare` for hosts that own the fixture outright: when it fails, the
    /// process is stopped (`complete` plus `shutdown`) before the error is
    /// returned, so nothing outlives the failed run.
    pub async fn prepare_or_teardown(
        &mut self,
        runner: &RunnerConfig,
        capabilities: &Capabilities,
    ) -> Result<(), PrepareError> {
        if let Err(e) = self.prepare(runner, capabilities).await {
            self.complete().await;
            self.shutdown();
            return Err(e);
        }
        Ok(())
    }

    /// Runner `onComplete` hook
    pub async fn complete(&mut self) {
        if self.phase == LifecyclePhase::Done {
            return;
        }
        let from = self.phase;
        self.phase = LifecyclePhase::ShuttingDown;

        if self.watch_mode {
            info!("Watch mode: leaving WireMock running until interrupted");
        } else if self.supervisor.terminate(TerminationCause::Completed) {
            if let Some(wait) = self.shutdown_wait {
                match self.supervisor.wait_for_exit(wait).await {
                    Some(record) => debug!("Shutdown confirmed: {}", record),
                    None => warn!("WireMock still running {}ms after SIGTERM", wait.as_millis()),
                }
            }
        }

        debug!("Complete: {:?} -> Done", from);
        self.phase = LifecyclePhase::Done;
    }

    /// Host is exiting: fire the host-exit trigger now instead of at drop
    pub fn shutdown(&mut self) {
        drop(self.registration.take());
    }
}
