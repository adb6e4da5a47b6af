use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use configs::{LifecycleConfig, StorageConfig};
use serde::Serialize;
use thiserror::Error;

use crate::executor::{CommandOutput, Executor};
use crate::host::OsKind;

/// Unexpected installer failures. Expected ones (a package that will not install, a
/// service that refuses to start) are reported as `Ok(false)` instead.
#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported platform: {0}")]
    Unsupported(String),
    #[error("installer error: {0}")]
    Other(String),
}

impl InstallerError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub installed: bool,
    pub version_or_path: Option<String>,
}

impl Detection {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(version_or_path: impl Into<String>) -> Self {
        Self { installed: true, version_or_path: Some(version_or_path.into()) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub is_running: bool,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
}

impl ServiceStatus {
    pub fn stopped() -> Self {
        Self::default()
    }
}

/// Settings handed to `Installer::configure`, taken from the stored protocol record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolConfig {
    pub port: Option<u16>,
    pub ssl_enabled: bool,
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl ProtocolConfig {
    pub fn new(port: Option<u16>, ssl_enabled: bool, values: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { port, ssl_enabled, values }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

/// Fixed capability set every protocol family provides.
///
/// Implementations are stateless: whatever they learn about the host is re-read on every
/// call, the stored protocol record being the only durable state.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Protocol identifier this installer serves (`ftp`, `smb`, ...).
    fn protocol(&self) -> &str;

    /// Read-only check for an existing installation.
    async fn detect_existing(&self) -> Result<Detection, InstallerError>;

    /// Install required packages. Safe to repeat.
    async fn install_packages(&self) -> Result<bool, InstallerError>;

    /// Render and write configuration artifacts. Overwrites previous output.
    async fn configure(&self, config: &ProtocolConfig) -> Result<bool, InstallerError>;

    /// Start the service and enable it at boot.
    async fn start_service(&self) -> Result<bool, InstallerError>;

    async fn stop_service(&self) -> Result<bool, InstallerError>;

    async fn restart_service(&self) -> Result<bool, InstallerError>;

    /// Read-only. A service that is not installed reports not running.
    async fn get_status(&self) -> Result<ServiceStatus, InstallerError>;

    /// Stop (tolerating an already stopped service), then remove.
    async fn uninstall(&self) -> Result<bool, InstallerError>;
}

/// What every installer gets to work with.
#[derive(Clone)]
pub struct InstallerContext {
    pub executor: Arc<dyn Executor>,
    pub os: OsKind,
    pub storage: Arc<StorageConfig>,
    pub command_timeout: Duration,
    pub package_timeout: Duration,
}

impl InstallerContext {
    pub fn new(executor: Arc<dyn Executor>, storage: Arc<StorageConfig>, lifecycle: &LifecycleConfig) -> Self {
        Self {
            executor,
            os: OsKind::current(),
            storage,
            command_timeout: lifecycle.command_timeout(),
            package_timeout: lifecycle.package_timeout(),
        }
    }

    pub fn with_os(mut self, os: OsKind) -> Self {
        self.os = os;
        self
    }

    /// Run a short command with the command timeout.
    pub async fn run(&self, argv: &[&str]) -> CommandOutput {
        self.executor.run(argv, Some(self.command_timeout)).await
    }

    /// Run a package-manager or download command with the longer package timeout.
    pub async fn run_long(&self, argv: &[&str]) -> CommandOutput {
        self.executor.run(argv, Some(self.package_timeout)).await
    }

    pub async fn which(&self, program: &str) -> Option<PathBuf> {
        self.executor.which(program).await
    }

    pub async fn exists(&self, path: &Path) -> bool {
        self.executor.path_exists(path).await
    }

    pub async fn read_file(&self, path: &Path) -> Result<String, InstallerError> {
        self.executor.read_file(path).await.map_err(|e| InstallerError::io(path, e))
    }

    pub async fn write_file(&self, path: &Path, contents: &str) -> Result<(), InstallerError> {
        self.executor.write_file(path, contents).await.map_err(|e| InstallerError::io(path, e))
    }

    pub async fn create_dir(&self, path: &Path) -> Result<(), InstallerError> {
        self.executor.create_dir_all(path).await.map_err(|e| InstallerError::io(path, e))
    }

    /// Copy `path` to `path.backup` when it exists. Best effort.
    pub async fn backup(&self, path: &Path) {
        if self.exists(path).await {
            let src = path.to_string_lossy().into_owned();
            let dst = format!("{src}.backup");
            self.run(&["cp", &src, &dst]).await;
        }
    }
}
