use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8000, worker_threads: Some(4) }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            acquire_timeout_secs: default_acquire_timeout(),
            sqlx_logging: false,
        }
    }
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 600 }
fn default_max_lifetime() -> u64 { 3600 }
fn default_acquire_timeout() -> u64 { 30 }

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/file_server.db?mode=rwc";

/// Timeouts and worker sizing for protocol lifecycle operations.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Default timeout for a single host command (systemctl, which, testparm...).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Timeout for package manager and download commands.
    #[serde(default = "default_package_timeout")]
    pub package_timeout_secs: u64,
    /// Maximum number of install/uninstall jobs running at once.
    #[serde(default = "default_job_workers")]
    pub job_workers: usize,
    /// Finished jobs kept around for polling.
    #[serde(default = "default_retained_jobs")]
    pub retained_jobs: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            package_timeout_secs: default_package_timeout(),
            job_workers: default_job_workers(),
            retained_jobs: default_retained_jobs(),
        }
    }
}

fn default_command_timeout() -> u64 { 120 }
fn default_package_timeout() -> u64 { 1800 }
fn default_job_workers() -> usize { 4 }
fn default_retained_jobs() -> usize { 256 }

impl LifecycleConfig {
    pub fn command_timeout(&self) -> Duration { Duration::from_secs(self.command_timeout_secs) }
    pub fn package_timeout(&self) -> Duration { Duration::from_secs(self.package_timeout_secs) }
}

/// Host paths used by the protocol installers.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default = "default_sftp_root")]
    pub sftp_root: PathBuf,
    #[serde(default = "default_nfs_export_root")]
    pub nfs_export_root: PathBuf,
    #[serde(default = "default_nfs_clients")]
    pub nfs_clients: String,
    #[serde(default = "default_minio_install_dir")]
    pub minio_install_dir: PathBuf,
    #[serde(default = "default_minio_data_dir")]
    pub minio_data_dir: PathBuf,
    #[serde(default = "default_minio_config_dir")]
    pub minio_config_dir: PathBuf,
    #[serde(default = "default_minio_download_url")]
    pub minio_download_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            sftp_root: default_sftp_root(),
            nfs_export_root: default_nfs_export_root(),
            nfs_clients: default_nfs_clients(),
            minio_install_dir: default_minio_install_dir(),
            minio_data_dir: default_minio_data_dir(),
            minio_config_dir: default_minio_config_dir(),
            minio_download_url: default_minio_download_url(),
        }
    }
}

fn default_base_path() -> PathBuf { "/opt/file-server/storage".into() }
fn default_sftp_root() -> PathBuf { "/opt/file-server/sftp".into() }
fn default_nfs_export_root() -> PathBuf { "/opt/file-server/nfs".into() }
fn default_nfs_clients() -> String { "*(rw,sync,no_subtree_check)".into() }
fn default_minio_install_dir() -> PathBuf { "/opt/minio".into() }
fn default_minio_data_dir() -> PathBuf { "/opt/minio/data".into() }
fn default_minio_config_dir() -> PathBuf { "/etc/minio".into() }
fn default_minio_download_url() -> String { "https://dl.min.io/server/minio/release/linux-amd64/minio".into() }

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminConfig {
    /// Key required in `X-API-Key` for mutating protocol routes. Unset disables the check.
    #[serde(default)]
    pub api_key: Option<String>,
}

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Like `load_and_validate`, but a missing config file falls back to defaults plus env.
    pub fn load_or_default() -> Result<Self> {
        let mut cfg = match load_default() {
            Ok(cfg) => cfg,
            Err(e) if is_not_found(&e) => AppConfig::default(),
            Err(e) => return Err(e),
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize_from_env();
        self.server.normalize()?;
        self.database.normalize_from_env();
        self.database.validate()?;
        self.lifecycle.validate()?;
        self.admin.normalize_from_env();
        Ok(())
    }
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

impl ServerConfig {
    fn normalize_from_env(&mut self) {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("SERVER_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }
    }

    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "0.0.0.0".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        if self.url.trim().is_empty() {
            self.url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        }
    }

    pub fn is_sqlite(&self) -> bool {
        self.url.to_lowercase().starts_with("sqlite:")
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("database.url is empty; set it in config.toml or DATABASE_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("postgresql://") || lower.starts_with("postgres://") || lower.starts_with("sqlite:")) {
            return Err(anyhow!("database.url must start with postgres://, postgresql:// or sqlite:"));
        }
        if self.min_connections == 0 {
            return Err(anyhow!("database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(anyhow!("database timeouts must be positive seconds"));
        }
        Ok(())
    }
}

impl LifecycleConfig {
    fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 || self.package_timeout_secs == 0 {
            return Err(anyhow!("lifecycle timeouts must be positive seconds"));
        }
        if self.job_workers == 0 {
            return Err(anyhow!("lifecycle.job_workers must be >= 1"));
        }
        Ok(())
    }
}

impl AdminConfig {
    fn normalize_from_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("ADMIN_API_KEY").ok();
        }
        if matches!(self.api_key.as_deref(), Some(k) if k.trim().is_empty()) {
            self.api_key = None;
        }
    }
}
