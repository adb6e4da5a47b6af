use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use installers::test_support::ScriptedExecutor;
use installers::{
    CommandOutput, Detection, Installer, InstallerError, InstallerRegistry, OsKind, ProtocolConfig, ServiceStatus,
};
use models::protocol::{Model, ProtocolStatus};
use serde_json::json;
use tokio::sync::Notify;

use super::*;
use crate::errors::LifecycleError;
use crate::jobs::{JobPool, JobState};
use crate::protocol::repository::mock::InMemoryProtocolRepository;
use crate::protocol::{ProtocolRepository, SeaOrmProtocolRepository};

#[derive(Clone, Default)]
struct Plan {
    existing: bool,
    packages_fail: bool,
    configure_fails: bool,
    start_fails: bool,
    start_panics: bool,
    uninstall_fails: bool,
    uninstall_errors: bool,
    hold_packages: Option<Arc<Notify>>,
}

#[derive(Default)]
struct Calls {
    detect: AtomicUsize,
    packages: AtomicUsize,
    configure: AtomicUsize,
    start: AtomicUsize,
    stop: AtomicUsize,
    restart: AtomicUsize,
    status: AtomicUsize,
    uninstall: AtomicUsize,
    running: AtomicBool,
}

impl Calls {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct FakeInstaller {
    name: String,
    plan: Plan,
    calls: Arc<Calls>,
}

#[async_trait]
impl Installer for FakeInstaller {
    fn protocol(&self) -> &str {
        &self.name
    }

    async fn detect_existing(&self) -> Result<Detection, InstallerError> {
        self.calls.detect.fetch_add(1, Ordering::SeqCst);
        Ok(if self.plan.existing { Detection::present("/usr/sbin/fake") } else { Detection::absent() })
    }

    async fn install_packages(&self) -> Result<bool, InstallerError> {
        self.calls.packages.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.plan.hold_packages {
            gate.notified().await;
        }
        Ok(!self.plan.packages_fail)
    }

    async fn configure(&self, _config: &ProtocolConfig) -> Result<bool, InstallerError> {
        self.calls.configure.fetch_add(1, Ordering::SeqCst);
        if self.plan.configure_fails {
            return Err(InstallerError::Other("disk full".into()));
        }
        Ok(true)
    }

    async fn start_service(&self) -> Result<bool, InstallerError> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        if self.plan.start_panics {
            panic!("service manager went away");
        }
        if self.plan.start_fails {
            return Ok(false);
        }
        self.calls.running.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn stop_service(&self) -> Result<bool, InstallerError> {
        self.calls.stop.fetch_add(1, Ordering::SeqCst);
        self.calls.running.store(false, Ordering::SeqCst);
        Ok(true)
    }

    async fn restart_service(&self) -> Result<bool, InstallerError> {
        self.calls.restart.fetch_add(1, Ordering::SeqCst);
        self.calls.running.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn get_status(&self) -> Result<ServiceStatus, InstallerError> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);
        if self.calls.running.load(Ordering::SeqCst) {
            Ok(ServiceStatus { is_running: true, pid: Some(42), uptime_seconds: Some(7) })
        } else {
            Ok(ServiceStatus::stopped())
        }
    }

    async fn uninstall(&self) -> Result<bool, InstallerError> {
        self.calls.uninstall.fetch_add(1, Ordering::SeqCst);
        if self.plan.uninstall_errors {
            return Err(InstallerError::Other("package database is locked".into()));
        }
        Ok(!self.plan.uninstall_fails)
    }
}

struct Fixture<R: ProtocolRepository + 'static> {
    orchestrator: LifecycleOrchestrator<R>,
    repo: Arc<R>,
    calls: Arc<Calls>,
}

fn fake_registry(plan: Plan, calls: Arc<Calls>) -> InstallerRegistry {
    let mut registry = InstallerRegistry::new(ScriptedExecutor::new().context(OsKind::Linux));
    for name in ["ftp", "sftp", "smb", "s3", "nfs"] {
        let plan = plan.clone();
        let calls = calls.clone();
        let owned = name.to_string();
        registry.register(name, move |_ctx| -> Arc<dyn Installer> {
            Arc::new(FakeInstaller { name: owned.clone(), plan: plan.clone(), calls: calls.clone() })
        });
    }
    registry.register_stub("webdav");
    registry.register_stub("nextcloud");
    registry
}

fn fixture(plan: Plan) -> Fixture<InMemoryProtocolRepository> {
    let repo = Arc::new(InMemoryProtocolRepository::with_defaults());
    let calls = Arc::new(Calls::default());
    let registry = fake_registry(plan, calls.clone());
    let orchestrator = LifecycleOrchestrator::new(repo.clone(), Arc::new(registry), JobPool::new(4, 64));
    Fixture { orchestrator, repo, calls }
}

/// Put `name` straight into an installed state, bypassing the installer.
async fn seed_installed(repo: &InMemoryProtocolRepository, name: &str, status: ProtocolStatus) -> Model {
    let mut row = repo.get_by_name(name).await.unwrap().expect("seeded");
    row.status = status;
    row.is_installed = true;
    row.is_enabled = status == ProtocolStatus::Running;
    row.installed_at = Some(Utc::now().into());
    repo.put(row.clone());
    row
}

async fn accepted_install<R: ProtocolRepository + 'static>(orch: &LifecycleOrchestrator<R>, name: &str) -> JobState {
    match orch.install(name).await.expect("install accepted") {
        InstallOutcome::Accepted(ticket) => ticket.wait().await,
        other => panic!("expected a job, got {other:?}"),
    }
}

#[tokio::test]
async fn fresh_catalog_is_uninstalled() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    let rows = fx.orchestrator.list().await?;
    assert_eq!(rows.len(), 7);
    for row in rows {
        assert_eq!(row.status, ProtocolStatus::Uninstalled);
        assert!(!row.is_installed);
        assert!(!row.is_enabled);
    }
    Ok(())
}

#[tokio::test]
async fn install_runs_every_step_and_ends_running() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    assert_eq!(accepted_install(&fx.orchestrator, "ftp").await, JobState::Succeeded);

    let row = fx.orchestrator.get("ftp").await?;
    assert_eq!(row.status, ProtocolStatus::Running);
    assert!(row.is_installed && row.is_enabled);
    assert!(row.installed_at.is_some());
    assert!(row.error_message.is_none());
    assert_eq!(row.version, 2);
    assert_eq!(fx.repo.history("ftp"), vec![ProtocolStatus::Installing, ProtocolStatus::Running]);
    for counter in [&fx.calls.detect, &fx.calls.packages, &fx.calls.configure, &fx.calls.start] {
        assert_eq!(Calls::count(counter), 1);
    }
    Ok(())
}

#[tokio::test]
async fn install_returns_before_the_job_finishes() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let fx = fixture(Plan { hold_packages: Some(gate.clone()), ..Plan::default() });

    let ticket = match fx.orchestrator.install("smb").await? {
        InstallOutcome::Accepted(ticket) => ticket,
        other => panic!("expected a job, got {other:?}"),
    };
    assert_eq!(fx.orchestrator.get("smb").await?.status, ProtocolStatus::Installing);
    assert!(fx.orchestrator.job(ticket.id).is_some());

    gate.notify_one();
    assert_eq!(ticket.wait().await, JobState::Succeeded);
    assert_eq!(fx.orchestrator.get("smb").await?.status, ProtocolStatus::Running);
    Ok(())
}

#[tokio::test]
async fn existing_installation_is_adopted_stopped() -> anyhow::Result<()> {
    let fx = fixture(Plan { existing: true, ..Plan::default() });
    assert_eq!(accepted_install(&fx.orchestrator, "nfs").await, JobState::Succeeded);

    let row = fx.orchestrator.get("nfs").await?;
    assert_eq!(row.status, ProtocolStatus::Stopped);
    assert!(row.is_installed);
    assert!(!row.is_enabled);
    assert_eq!(Calls::count(&fx.calls.packages), 0);
    assert_eq!(Calls::count(&fx.calls.start), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_install_admits_a_single_job() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let fx = fixture(Plan { hold_packages: Some(gate.clone()), ..Plan::default() });

    let first = fx.orchestrator.install("sftp").await?;
    let second = fx.orchestrator.install("sftp").await;
    assert!(matches!(second, Err(LifecycleError::Busy(_))));
    // other protocols are not held up
    assert!(matches!(fx.orchestrator.start("ftp").await, Err(LifecycleError::PreconditionFailed(_))));

    gate.notify_one();
    match first {
        InstallOutcome::Accepted(ticket) => assert_eq!(ticket.wait().await, JobState::Succeeded),
        other => panic!("expected a job, got {other:?}"),
    }
    assert_eq!(Calls::count(&fx.calls.packages), 1);
    assert_eq!(fx.repo.history("sftp"), vec![ProtocolStatus::Installing, ProtocolStatus::Running]);

    // once installed a repeat install is a no-op
    assert!(matches!(fx.orchestrator.install("sftp").await?, InstallOutcome::AlreadyInstalled(_)));
    assert_eq!(fx.repo.history("sftp").len(), 2);
    Ok(())
}

#[tokio::test]
async fn operations_are_busy_while_install_runs() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let fx = fixture(Plan { hold_packages: Some(gate.clone()), ..Plan::default() });

    let ticket = match fx.orchestrator.install("ftp").await? {
        InstallOutcome::Accepted(ticket) => ticket,
        other => panic!("expected a job, got {other:?}"),
    };
    assert!(matches!(fx.orchestrator.start("ftp").await, Err(LifecycleError::Busy(_))));
    assert!(matches!(fx.orchestrator.stop("ftp").await, Err(LifecycleError::Busy(_))));
    assert!(matches!(fx.orchestrator.restart("ftp").await, Err(LifecycleError::Busy(_))));
    assert!(matches!(fx.orchestrator.uninstall("ftp").await, Err(LifecycleError::Busy(_))));
    let update = ConfigUpdate { port: Some(2121), ..ConfigUpdate::default() };
    assert!(matches!(fx.orchestrator.update_config("ftp", update).await, Err(LifecycleError::Busy(_))));

    // rejected operations leave no trace
    assert_eq!(fx.repo.history("ftp"), vec![ProtocolStatus::Installing]);
    assert_eq!(Calls::count(&fx.calls.start), 0);
    assert_eq!(Calls::count(&fx.calls.stop), 0);

    gate.notify_one();
    assert_eq!(ticket.wait().await, JobState::Succeeded);
    let row = fx.orchestrator.get("ftp").await?;
    assert_eq!(row.status, ProtocolStatus::Running);
    assert_eq!(row.port, Some(21));
    Ok(())
}

#[tokio::test]
async fn service_actions_require_installation() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    for result in [
        fx.orchestrator.start("smb").await,
        fx.orchestrator.stop("smb").await,
        fx.orchestrator.restart("smb").await,
    ] {
        assert!(matches!(result, Err(LifecycleError::PreconditionFailed(_))));
    }
    assert!(fx.repo.history("smb").is_empty());
    assert_eq!(Calls::count(&fx.calls.start), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_protocol_is_not_found() {
    let fx = fixture(Plan::default());
    assert!(matches!(fx.orchestrator.install("gopher").await, Err(LifecycleError::NotFound(_))));
    assert!(matches!(fx.orchestrator.get_status("gopher").await, Err(LifecycleError::NotFound(_))));
    assert!(matches!(
        fx.orchestrator.update_config("gopher", ConfigUpdate::default()).await,
        Err(LifecycleError::NotFound(_))
    ));
}

#[tokio::test]
async fn package_failure_records_error() -> anyhow::Result<()> {
    let fx = fixture(Plan { packages_fail: true, ..Plan::default() });
    let state = accepted_install(&fx.orchestrator, "ftp").await;
    assert_eq!(state, JobState::Failed { error: "package installation failed".into() });

    let row = fx.orchestrator.get("ftp").await?;
    assert_eq!(row.status, ProtocolStatus::Error);
    assert!(!row.is_installed);
    assert_eq!(row.error_message.as_deref(), Some("package installation failed"));
    assert_eq!(Calls::count(&fx.calls.configure), 0);
    Ok(())
}

#[tokio::test]
async fn placeholder_protocol_fails_with_explanation() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    assert!(matches!(accepted_install(&fx.orchestrator, "webdav").await, JobState::Failed { .. }));

    let row = fx.orchestrator.get("webdav").await?;
    assert_eq!(row.status, ProtocolStatus::Error);
    assert_eq!(row.error_message.as_deref(), Some("webdav installer is not implemented yet"));
    Ok(())
}

#[tokio::test]
async fn install_that_cannot_start_is_stopped() -> anyhow::Result<()> {
    let fx = fixture(Plan { start_fails: true, ..Plan::default() });
    assert_eq!(accepted_install(&fx.orchestrator, "s3").await, JobState::Succeeded);
    let row = fx.orchestrator.get("s3").await?;
    assert_eq!(row.status, ProtocolStatus::Stopped);
    assert!(row.is_installed && !row.is_enabled);
    Ok(())
}

#[tokio::test]
async fn panicking_installer_becomes_error() -> anyhow::Result<()> {
    let fx = fixture(Plan { start_panics: true, ..Plan::default() });
    seed_installed(&fx.repo, "ftp", ProtocolStatus::Stopped).await;

    let err = fx.orchestrator.start("ftp").await.unwrap_err();
    assert!(matches!(err, LifecycleError::OperationFailed(_)));
    let row = fx.orchestrator.get("ftp").await?;
    assert_eq!(row.status, ProtocolStatus::Error);
    assert!(row.error_message.unwrap().contains("panicked"));

    // the lock was released
    assert!(matches!(fx.orchestrator.stop("ftp").await?.status, ProtocolStatus::Stopped));
    Ok(())
}

#[tokio::test]
async fn failed_start_leaves_state_untouched() -> anyhow::Result<()> {
    let fx = fixture(Plan { start_fails: true, ..Plan::default() });
    let before = seed_installed(&fx.repo, "smb", ProtocolStatus::Stopped).await;

    assert!(matches!(fx.orchestrator.start("smb").await, Err(LifecycleError::OperationFailed(_))));
    assert_eq!(fx.orchestrator.get("smb").await?, before);
    Ok(())
}

#[tokio::test]
async fn stop_start_restart_transitions() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    seed_installed(&fx.repo, "nfs", ProtocolStatus::Running).await;

    let stopped = fx.orchestrator.stop("nfs").await?;
    assert_eq!(stopped.status, ProtocolStatus::Stopped);
    assert!(!stopped.is_enabled && stopped.is_installed);

    let started = fx.orchestrator.start("nfs").await?;
    assert_eq!(started.status, ProtocolStatus::Running);
    assert!(started.is_enabled);

    let restarted = fx.orchestrator.restart("nfs").await?;
    assert_eq!(restarted.status, ProtocolStatus::Running);
    assert_eq!(restarted.version, started.version + 1);
    Ok(())
}

#[tokio::test]
async fn config_update_on_running_protocol_reconfigures_once() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    seed_installed(&fx.repo, "ftp", ProtocolStatus::Running).await;

    let update = ConfigUpdate { config: Some(json!({ "force_ssl": true })), port: Some(2121), ssl_enabled: Some(true) };
    let row = fx.orchestrator.update_config("ftp", update).await?;
    assert_eq!(row.status, ProtocolStatus::Running);
    assert_eq!(row.port, Some(2121));
    assert!(row.ssl_enabled);
    assert_eq!(row.config_map().get("force_ssl"), Some(&json!(true)));
    assert_eq!(Calls::count(&fx.calls.configure), 1);
    assert_eq!(Calls::count(&fx.calls.restart), 1);
    Ok(())
}

#[tokio::test]
async fn config_update_on_stopped_protocol_only_stores() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    seed_installed(&fx.repo, "smb", ProtocolStatus::Stopped).await;

    let update = ConfigUpdate { config: Some(json!({ "workgroup": "OFFICE" })), ..ConfigUpdate::default() };
    let row = fx.orchestrator.update_config("smb", update).await?;
    assert_eq!(row.status, ProtocolStatus::Stopped);
    assert_eq!(row.port, Some(445));
    assert_eq!(Calls::count(&fx.calls.configure), 0);
    assert_eq!(Calls::count(&fx.calls.restart), 0);
    Ok(())
}

#[tokio::test]
async fn failed_reconfigure_records_error() -> anyhow::Result<()> {
    let fx = fixture(Plan { configure_fails: true, ..Plan::default() });
    seed_installed(&fx.repo, "sftp", ProtocolStatus::Running).await;

    let err = fx.orchestrator.update_config("sftp", ConfigUpdate { port: Some(2222), ..ConfigUpdate::default() }).await;
    assert!(matches!(err, Err(LifecycleError::OperationFailed(_))));
    let row = fx.orchestrator.get("sftp").await?;
    assert_eq!(row.status, ProtocolStatus::Error);
    assert_eq!(row.port, Some(2222));
    assert!(row.error_message.unwrap().contains("disk full"));
    assert_eq!(Calls::count(&fx.calls.restart), 0);
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected_before_any_change() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    let bad_port = fx.orchestrator.update_config("ftp", ConfigUpdate { port: Some(70000), ..ConfigUpdate::default() }).await;
    assert!(matches!(bad_port, Err(LifecycleError::InvalidInput(_))));
    let bad_config =
        fx.orchestrator.update_config("ftp", ConfigUpdate { config: Some(json!([1, 2])), ..ConfigUpdate::default() }).await;
    assert!(matches!(bad_config, Err(LifecycleError::InvalidInput(_))));
    assert!(fx.repo.history("ftp").is_empty());
    Ok(())
}

#[tokio::test]
async fn install_then_uninstall_round_trips() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    assert_eq!(accepted_install(&fx.orchestrator, "s3").await, JobState::Succeeded);

    let ticket = match fx.orchestrator.uninstall("s3").await? {
        UninstallOutcome::Accepted(ticket) => ticket,
        other => panic!("expected a job, got {other:?}"),
    };
    assert_eq!(ticket.wait().await, JobState::Succeeded);

    let row = fx.orchestrator.get("s3").await?;
    assert_eq!(row.status, ProtocolStatus::Uninstalled);
    assert!(!row.is_installed && !row.is_enabled);
    assert!(row.installed_at.is_none());
    assert_eq!(Calls::count(&fx.calls.stop), 1);
    assert_eq!(Calls::count(&fx.calls.uninstall), 1);
    assert_eq!(
        fx.repo.history("s3"),
        vec![ProtocolStatus::Installing, ProtocolStatus::Running, ProtocolStatus::Uninstalling, ProtocolStatus::Uninstalled]
    );

    assert!(matches!(fx.orchestrator.uninstall("s3").await?, UninstallOutcome::NotInstalled(_)));
    Ok(())
}

#[tokio::test]
async fn failed_uninstall_records_error() -> anyhow::Result<()> {
    for (plan, expected) in [
        (Plan { uninstall_fails: true, ..Plan::default() }, "uninstall failed"),
        (Plan { uninstall_errors: true, ..Plan::default() }, "package database is locked"),
    ] {
        let fx = fixture(plan);
        seed_installed(&fx.repo, "smb", ProtocolStatus::Running).await;

        let ticket = match fx.orchestrator.uninstall("smb").await? {
            UninstallOutcome::Accepted(ticket) => ticket,
            other => panic!("expected a job, got {other:?}"),
        };
        assert!(matches!(ticket.wait().await, JobState::Failed { .. }));

        let row = fx.orchestrator.get("smb").await?;
        assert_eq!(row.status, ProtocolStatus::Error);
        let message = row.error_message.unwrap_or_default();
        assert!(message.contains(expected), "unexpected error message: {message}");
        assert!(row.is_installed);
        assert_eq!(fx.repo.history("smb"), vec![ProtocolStatus::Uninstalling, ProtocolStatus::Error]);
    }
    Ok(())
}

#[tokio::test]
async fn status_merges_live_service_state() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    let idle = fx.orchestrator.get_status("ftp").await?;
    assert_eq!(idle.status, ProtocolStatus::Uninstalled);
    assert!(!idle.is_running);
    assert_eq!(Calls::count(&fx.calls.status), 0);

    assert_eq!(accepted_install(&fx.orchestrator, "ftp").await, JobState::Succeeded);
    let live = fx.orchestrator.get_status("ftp").await?;
    assert_eq!(live.status, ProtocolStatus::Running);
    assert!(live.is_running);
    assert_eq!(live.pid, Some(42));
    assert_eq!(live.uptime_seconds, Some(7));
    assert_eq!(live.port, Some(21));
    Ok(())
}

#[tokio::test]
async fn interrupted_jobs_are_recovered() -> anyhow::Result<()> {
    let fx = fixture(Plan::default());
    let mut row = fx.repo.get_by_name("smb").await?.expect("seeded");
    row.status = ProtocolStatus::Installing;
    fx.repo.put(row);
    let mut row = fx.repo.get_by_name("nfs").await?.expect("seeded");
    row.status = ProtocolStatus::Uninstalling;
    row.is_installed = true;
    fx.repo.put(row);

    assert!(matches!(fx.orchestrator.install("smb").await, Err(LifecycleError::Busy(_))));
    assert_eq!(fx.orchestrator.recover_interrupted().await?, 2);
    assert_eq!(fx.orchestrator.recover_interrupted().await?, 0);

    let smb = fx.orchestrator.get("smb").await?;
    assert_eq!(smb.status, ProtocolStatus::Error);
    assert!(smb.error_message.unwrap().starts_with("install interrupted"));
    let nfs = fx.orchestrator.get("nfs").await?;
    assert!(nfs.error_message.unwrap().starts_with("uninstall interrupted"));

    // ERROR is not terminal: install can be retried
    assert_eq!(accepted_install(&fx.orchestrator, "smb").await, JobState::Succeeded);
    Ok(())
}

#[tokio::test]
async fn sftp_installs_through_the_real_installer() -> anyhow::Result<()> {
    let exec = ScriptedExecutor::new()
        .with_programs(&["apt-get"])
        .respond("systemctl is-active sshd", CommandOutput::ok("active\n"))
        .respond("systemctl show -p MainPID sshd", CommandOutput::ok("MainPID=4242\n"))
        .respond("ps -o etimes= -p 4242", CommandOutput::ok("   30\n"));
    let registry = InstallerRegistry::with_defaults(exec.context(OsKind::Linux));
    let repo = Arc::new(InMemoryProtocolRepository::with_defaults());
    let orch = LifecycleOrchestrator::new(repo.clone(), Arc::new(registry), JobPool::new(2, 16));

    assert_eq!(accepted_install(&orch, "sftp").await, JobState::Succeeded);
    let row = orch.get("sftp").await?;
    assert_eq!(row.status, ProtocolStatus::Running);
    assert!(row.is_installed && row.is_enabled);

    assert!(exec.ran("apt-get install -y openssh-server"));
    assert!(exec.ran("groupadd sftpusers"));
    assert!(exec.ran("systemctl enable sshd"));
    let sshd_config = exec.file("/etc/ssh/sshd_config").expect("written");
    assert!(sshd_config.contains("Match Group sftpusers"));

    let status = orch.get_status("sftp").await?;
    assert!(status.is_running);
    assert_eq!(status.pid, Some(4242));
    assert_eq!(status.uptime_seconds, Some(30));
    Ok(())
}

#[tokio::test]
async fn lifecycle_persists_through_sqlite() -> anyhow::Result<()> {
    let db = models::db::connect_in_memory().await?;
    let repo = Arc::new(SeaOrmProtocolRepository::new(db));
    repo.seed_defaults().await?;
    let calls = Arc::new(Calls::default());
    let registry = fake_registry(Plan::default(), calls.clone());
    let orch = LifecycleOrchestrator::new(repo.clone(), Arc::new(registry), JobPool::new(2, 16));

    assert_eq!(accepted_install(&orch, "nfs").await, JobState::Succeeded);
    let row = repo.get_by_name("nfs").await?.expect("seeded");
    assert_eq!(row.status, ProtocolStatus::Running);
    assert_eq!(row.version, 2);

    let stopped = orch.stop("nfs").await?;
    assert_eq!(stopped.status, ProtocolStatus::Stopped);
    assert_eq!(repo.get_by_name("nfs").await?.expect("seeded").version, 3);
    Ok(())
}
