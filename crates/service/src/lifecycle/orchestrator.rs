use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use installers::{Installer, InstallerError, InstallerRegistry, ProtocolConfig};
use models::protocol::{self as protocol_model, Model, ProtocolStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::{LifecycleError, ServiceError};
use crate::jobs::{JobInfo, JobPool, JobTicket};
use crate::lifecycle::locks::{ProtocolGuard, ProtocolLocks};
use crate::lifecycle::state::{transition, LifecycleEvent};
use crate::metrics;
use crate::protocol::ProtocolRepository;

const MAX_SAVE_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub enum InstallOutcome {
    /// INSTALLING was persisted and a background job owns the protocol.
    Accepted(JobTicket),
    AlreadyInstalled(Model),
}

#[derive(Debug)]
pub enum UninstallOutcome {
    Accepted(JobTicket),
    NotInstalled(Model),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub config: Option<serde_json::Value>,
    pub port: Option<i32>,
    pub ssl_enabled: Option<bool>,
}

/// Stored state merged with what the service manager reports right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub protocol: String,
    pub status: ProtocolStatus,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
    pub port: Option<i32>,
    pub error_message: Option<String>,
}

impl StatusReport {
    fn from_row(row: &Model) -> Self {
        Self {
            protocol: row.name.clone(),
            status: row.status,
            is_running: false,
            pid: None,
            uptime_seconds: None,
            port: row.port,
            error_message: row.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    fn name(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }

    fn event(self) -> LifecycleEvent {
        match self {
            ServiceAction::Start => LifecycleEvent::Started,
            ServiceAction::Stop => LifecycleEvent::Stopped,
            ServiceAction::Restart => LifecycleEvent::Restarted,
        }
    }

    async fn invoke(self, installer: &dyn Installer) -> Result<bool, InstallerError> {
        match self {
            ServiceAction::Start => installer.start_service().await,
            ServiceAction::Stop => installer.stop_service().await,
            ServiceAction::Restart => installer.restart_service().await,
        }
    }
}

/// Drives installers through the protocol state machine.
///
/// Operations on one protocol are mutually exclusive (a second request gets `Busy`);
/// different protocols proceed in parallel. Install and uninstall return as soon as the
/// busy state is persisted and the job is queued; everything else completes inline.
pub struct LifecycleOrchestrator<R: ProtocolRepository> {
    repo: Arc<R>,
    registry: Arc<InstallerRegistry>,
    locks: ProtocolLocks,
    jobs: JobPool,
}

impl<R: ProtocolRepository + 'static> LifecycleOrchestrator<R> {
    pub fn new(repo: Arc<R>, registry: Arc<InstallerRegistry>, jobs: JobPool) -> Self {
        Self { repo, registry, locks: ProtocolLocks::new(), jobs }
    }

    pub async fn list(&self) -> Result<Vec<Model>, LifecycleError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, name: &str) -> Result<Model, LifecycleError> {
        self.repo
            .get_by_name(name)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))
    }

    pub fn job(&self, id: Uuid) -> Option<JobInfo> {
        self.jobs.get(id)
    }

    /// Take exclusive ownership of an existing protocol and return its current row.
    async fn claim(&self, name: &str, operation: &str) -> Result<(ProtocolGuard, Model), LifecycleError> {
        // unknown names are rejected before a lock entry is created for them
        self.get(name).await?;
        let guard = self.locks.try_acquire(name).ok_or_else(|| {
            metrics::record(name, operation, "busy");
            warn!(protocol = %name, operation, "protocol busy");
            LifecycleError::Busy(name.to_string())
        })?;
        let row = self.get(name).await?;
        if row.status.is_busy() {
            // a job from a previous process that was never recovered
            metrics::record(name, operation, "busy");
            return Err(LifecycleError::Busy(name.to_string()));
        }
        Ok((guard, row))
    }

    #[instrument(skip_all, fields(protocol = %name))]
    pub async fn install(&self, name: &str) -> Result<InstallOutcome, LifecycleError> {
        let (guard, row) = self.claim(name, "install").await?;
        if row.is_installed {
            metrics::record(name, "install", "noop");
            return Ok(InstallOutcome::AlreadyInstalled(row));
        }
        if self.jobs.active_for(name).is_some() {
            metrics::record(name, "install", "busy");
            return Err(LifecycleError::Busy(name.to_string()));
        }
        let installer = self.registry.resolve(name)?;
        let stub = self.registry.is_stub(name);
        let config = protocol_config(&row);

        apply(self.repo.as_ref(), name, LifecycleEvent::InstallStarted).await?;
        info!(protocol = %name, event = "install_started", "install accepted");

        let repo = self.repo.clone();
        let owned_name = name.to_string();
        let job = async move {
            let _guard = guard;
            let event = run_install(installer, config, stub).await;
            finish_job(repo.as_ref(), &owned_name, "install", event).await
        };
        self.submit(name, "install", job).await.map(InstallOutcome::Accepted)
    }

    #[instrument(skip_all, fields(protocol = %name))]
    pub async fn uninstall(&self, name: &str) -> Result<UninstallOutcome, LifecycleError> {
        let (guard, row) = self.claim(name, "uninstall").await?;
        if !row.is_installed {
            metrics::record(name, "uninstall", "noop");
            return Ok(UninstallOutcome::NotInstalled(row));
        }
        if self.jobs.active_for(name).is_some() {
            metrics::record(name, "uninstall", "busy");
            return Err(LifecycleError::Busy(name.to_string()));
        }
        let installer = self.registry.resolve(name)?;

        apply(self.repo.as_ref(), name, LifecycleEvent::UninstallStarted).await?;
        info!(protocol = %name, event = "uninstall_started", "uninstall accepted");

        let repo = self.repo.clone();
        let owned_name = name.to_string();
        let job = async move {
            let _guard = guard;
            let event = run_uninstall(installer).await;
            finish_job(repo.as_ref(), &owned_name, "uninstall", event).await
        };
        self.submit(name, "uninstall", job).await.map(UninstallOutcome::Accepted)
    }

    async fn submit<F>(&self, name: &str, kind: &str, job: F) -> Result<JobTicket, LifecycleError>
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        match self.jobs.submit(name, kind, job) {
            Ok(ticket) => {
                info!(protocol = %name, job_id = %ticket.id, kind, "job_submitted");
                Ok(ticket)
            }
            Err(e) => {
                // the busy marker is already persisted; do not leave it behind
                let msg = format!("could not schedule {kind}: {e}");
                apply(self.repo.as_ref(), name, LifecycleEvent::Failed(msg)).await?;
                metrics::record(name, kind, "busy");
                Err(LifecycleError::Busy(name.to_string()))
            }
        }
    }

    #[instrument(skip_all, fields(protocol = %name))]
    pub async fn start(&self, name: &str) -> Result<Model, LifecycleError> {
        self.service_action(name, ServiceAction::Start).await
    }

    #[instrument(skip_all, fields(protocol = %name))]
    pub async fn stop(&self, name: &str) -> Result<Model, LifecycleError> {
        self.service_action(name, ServiceAction::Stop).await
    }

    #[instrument(skip_all, fields(protocol = %name))]
    pub async fn restart(&self, name: &str) -> Result<Model, LifecycleError> {
        self.service_action(name, ServiceAction::Restart).await
    }

    async fn service_action(&self, name: &str, action: ServiceAction) -> Result<Model, LifecycleError> {
        let op = action.name();
        let (_guard, row) = self.claim(name, op).await?;
        if !row.is_installed {
            metrics::record(name, op, "rejected");
            return Err(LifecycleError::PreconditionFailed(format!("{name} is not installed")));
        }
        let installer = self.registry.resolve(name)?;

        match guarded(op, async move { action.invoke(installer.as_ref()).await }).await {
            Ok(true) => {
                let saved = apply(self.repo.as_ref(), name, action.event()).await?;
                metrics::record(name, op, "ok");
                info!(protocol = %name, event = op, status = %saved.status, "service action completed");
                Ok(saved)
            }
            Ok(false) => {
                // expected failure: the stored state is left as it was
                metrics::record(name, op, "failed");
                warn!(protocol = %name, event = op, "service action failed");
                Err(LifecycleError::OperationFailed(format!("failed to {op} {name}")))
            }
            Err(msg) => {
                error!(protocol = %name, event = op, error = %msg, "service action errored");
                apply(self.repo.as_ref(), name, LifecycleEvent::Failed(msg.clone())).await?;
                metrics::record(name, op, "failed");
                Err(LifecycleError::OperationFailed(msg))
            }
        }
    }

    /// Store new settings; a running service is reconfigured and restarted once.
    #[instrument(skip_all, fields(protocol = %name))]
    pub async fn update_config(&self, name: &str, update: ConfigUpdate) -> Result<Model, LifecycleError> {
        if let Some(port) = update.port {
            protocol_model::validate_port(port).map_err(|e| LifecycleError::InvalidInput(e.to_string()))?;
        }
        if let Some(config) = &update.config {
            protocol_model::validate_config(config).map_err(|e| LifecycleError::InvalidInput(e.to_string()))?;
        }
        let (_guard, row) = self.claim(name, "configure").await?;
        let was_running = row.is_installed && row.status == ProtocolStatus::Running;

        let event = LifecycleEvent::ConfigUpdated { config: update.config, port: update.port, ssl_enabled: update.ssl_enabled };
        let saved = apply(self.repo.as_ref(), name, event).await?;
        if !was_running {
            metrics::record(name, "configure", "ok");
            return Ok(saved);
        }

        let installer = self.registry.resolve(name)?;
        let config = protocol_config(&saved);
        let configurer = installer.clone();
        let failure = match guarded("configure", async move { configurer.configure(&config).await }).await {
            Ok(true) => match guarded("restart", async move { installer.restart_service().await }).await {
                Ok(true) => None,
                Ok(false) => Some("restart after reconfigure failed".to_string()),
                Err(msg) => Some(msg),
            },
            Ok(false) => Some("configuration failed".to_string()),
            Err(msg) => Some(msg),
        };

        match failure {
            None => {
                metrics::record(name, "configure", "ok");
                info!(protocol = %name, event = "reconfigured", "configuration applied and service restarted");
                Ok(saved)
            }
            Some(msg) => {
                error!(protocol = %name, event = "reconfigure_failed", error = %msg, "reconfigure failed");
                apply(self.repo.as_ref(), name, LifecycleEvent::Failed(msg.clone())).await?;
                metrics::record(name, "configure", "failed");
                Err(LifecycleError::OperationFailed(msg))
            }
        }
    }

    /// Read-only; never takes the protocol lock.
    pub async fn get_status(&self, name: &str) -> Result<StatusReport, LifecycleError> {
        let row = self.get(name).await?;
        let mut report = StatusReport::from_row(&row);
        if !row.is_installed {
            return Ok(report);
        }
        let live_status = match self.registry.resolve(name) {
            Ok(installer) => guarded("status", async move { installer.get_status().await }).await,
            Err(e) => Err(e.to_string()),
        };
        match live_status {
            Ok(live) => {
                report.is_running = live.is_running;
                report.pid = live.pid;
                report.uptime_seconds = live.uptime_seconds;
            }
            Err(msg) => {
                report.status = ProtocolStatus::Error;
                report.error_message = Some(msg);
            }
        }
        Ok(report)
    }

    /// Move rows left in INSTALLING/UNINSTALLING by a previous process to ERROR.
    pub async fn recover_interrupted(&self) -> Result<usize, LifecycleError> {
        let mut recovered = 0;
        for row in self.repo.list().await? {
            if !row.status.is_busy() {
                continue;
            }
            let Some(_guard) = self.locks.try_acquire(&row.name) else {
                continue;
            };
            apply(self.repo.as_ref(), &row.name, LifecycleEvent::Interrupted).await?;
            warn!(protocol = %row.name, previous = %row.status, event = "interrupted", "recovered interrupted operation");
            recovered += 1;
        }
        Ok(recovered)
    }
}

/// Read the current row, apply `event` and write it back under the version check.
/// A concurrent writer causes a re-read and another attempt.
pub async fn apply<R: ProtocolRepository + ?Sized>(repo: &R, name: &str, event: LifecycleEvent) -> Result<Model, LifecycleError> {
    let mut last_conflict = String::new();
    for _ in 0..MAX_SAVE_ATTEMPTS {
        let current = repo
            .get_by_name(name)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        let next = transition(&current, event.clone(), Utc::now().into());
        match repo.save(next, current.version).await {
            Ok(saved) => return Ok(saved),
            Err(ServiceError::Conflict(msg)) => {
                warn!(protocol = %name, event = event.name(), "version conflict, retrying");
                last_conflict = msg;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(LifecycleError::Store(ServiceError::Conflict(last_conflict)))
}

fn protocol_config(row: &Model) -> ProtocolConfig {
    let port = row.port.and_then(|p| u16::try_from(p).ok());
    ProtocolConfig::new(port, row.ssl_enabled, row.config_map())
}

/// Run one installer call on its own task so a panic surfaces as an error string.
async fn guarded<T, F>(step: &str, call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, InstallerError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{step} failed: {e}")),
        Err(join) => Err(format!("{step} failed: installer panicked ({join})")),
    }
}

async fn run_install(installer: Arc<dyn Installer>, config: ProtocolConfig, stub: bool) -> LifecycleEvent {
    let protocol = installer.protocol().to_string();

    let detector = installer.clone();
    let detection = match guarded("detect", async move { detector.detect_existing().await }).await {
        Ok(d) => d,
        Err(msg) => return LifecycleEvent::Failed(msg),
    };
    if detection.installed {
        info!(protocol = %protocol, found = ?detection.version_or_path, "existing installation adopted");
        return LifecycleEvent::DetectedExisting;
    }

    let packages = installer.clone();
    match guarded("package installation", async move { packages.install_packages().await }).await {
        Ok(true) => {}
        Ok(false) if stub => return LifecycleEvent::Failed(format!("{protocol} installer is not implemented yet")),
        Ok(false) => return LifecycleEvent::Failed("package installation failed".into()),
        Err(msg) => return LifecycleEvent::Failed(msg),
    }

    let configurer = installer.clone();
    match guarded("configuration", async move { configurer.configure(&config).await }).await {
        Ok(true) => {}
        Ok(false) => return LifecycleEvent::Failed("configuration failed".into()),
        Err(msg) => return LifecycleEvent::Failed(msg),
    }

    match guarded("start", async move { installer.start_service().await }).await {
        Ok(started) => {
            if !started {
                warn!(protocol = %protocol, "installed but the service did not start");
            }
            LifecycleEvent::Installed { started }
        }
        Err(msg) => LifecycleEvent::Failed(msg),
    }
}

async fn run_uninstall(installer: Arc<dyn Installer>) -> LifecycleEvent {
    let stopper = installer.clone();
    // an already stopped service is fine here
    if let Err(msg) = guarded("stop", async move { stopper.stop_service().await }).await {
        warn!(protocol = %installer.protocol(), error = %msg, "stop before uninstall failed");
    }
    match guarded("uninstall", async move { installer.uninstall().await }).await {
        Ok(true) => LifecycleEvent::Uninstalled,
        Ok(false) => LifecycleEvent::Failed("uninstall failed".into()),
        Err(msg) => LifecycleEvent::Failed(msg),
    }
}

/// Persist the job's final event and turn it into the job result.
async fn finish_job<R: ProtocolRepository + ?Sized>(repo: &R, name: &str, kind: &str, event: LifecycleEvent) -> Result<(), String> {
    let outcome = match &event {
        LifecycleEvent::Failed(msg) => Err(msg.clone()),
        _ => Ok(()),
    };
    match apply(repo, name, event).await {
        Ok(saved) => {
            info!(protocol = %name, kind, status = %saved.status, error = ?saved.error_message, "job result persisted");
        }
        Err(e) => {
            error!(protocol = %name, kind, error = %e, "failed to persist job result");
            metrics::record(name, kind, "failed");
            return Err(format!("failed to persist {kind} result: {e}"));
        }
    }
    metrics::record(name, kind, if outcome.is_ok() { "ok" } else { "failed" });
    outcome
}
