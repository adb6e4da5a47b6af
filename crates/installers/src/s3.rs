//! S3-compatible object storage through a MinIO binary managed as a systemd unit.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, error, info};

use crate::host::{self, OsKind, ServiceUnits};
use crate::plugin::{Detection, Installer, InstallerContext, InstallerError, ProtocolConfig, ServiceStatus};

const UNIT_PATH: &str = "/etc/systemd/system/minio.service";
const BIN_LINK: &str = "/usr/local/bin/minio";
const SERVICE_USER: &str = "minio-user";
const WINDOWS_DIR: &str = "C:\\minio";
const WINDOWS_DOWNLOAD_URL: &str = "https://dl.min.io/server/minio/release/windows-amd64/minio.exe";
const UNITS: ServiceUnits = ServiceUnits { linux: &["minio"], windows: None };

pub const ACCESS_KEY_LEN: usize = 20;
pub const SECRET_KEY_LEN: usize = 40;

pub struct S3Installer {
    ctx: InstallerContext,
}

/// Alphanumeric key of `len` characters.
pub fn generate_key(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// Root user and password from a `minio.env` file or a Windows start script.
fn parse_credentials(text: &str) -> (Option<String>, Option<String>) {
    let mut user = None;
    let mut password = None;
    for line in text.lines() {
        let line = line.trim();
        let line = line.strip_prefix("set ").unwrap_or(line);
        if let Some(v) = line.strip_prefix("MINIO_ROOT_USER=") {
            user = Some(v.trim().to_string()).filter(|v| !v.is_empty());
        } else if let Some(v) = line.strip_prefix("MINIO_ROOT_PASSWORD=") {
            password = Some(v.trim().to_string()).filter(|v| !v.is_empty());
        }
    }
    (user, password)
}

impl S3Installer {
    pub fn new(ctx: InstallerContext) -> Self {
        Self { ctx }
    }

    fn binary(&self) -> PathBuf {
        self.ctx.storage.minio_install_dir.join("minio")
    }

    async fn download_linux(&self) -> Result<bool, InstallerError> {
        self.ctx.create_dir(&self.ctx.storage.minio_install_dir).await?;
        let binary = self.binary().display().to_string();
        let url = self.ctx.storage.minio_download_url.as_str();

        info!(url = %url, target = %binary, "downloading minio");
        let mut fetched = self.ctx.run_long(&["wget", "-q", url, "-O", binary.as_str()]).await.success;
        if !fetched {
            fetched = self.ctx.run_long(&["curl", "-fsSL", "-o", binary.as_str(), url]).await.success;
        }
        if !fetched {
            error!("failed to download minio with wget or curl");
            return Ok(false);
        }

        if !self.ctx.run(&["chmod", "+x", binary.as_str()]).await.success {
            return Ok(false);
        }
        self.ctx.run(&["ln", "-sf", binary.as_str(), BIN_LINK]).await;
        // fails harmlessly when the account already exists
        self.ctx.run(&["useradd", "-r", "-s", "/sbin/nologin", SERVICE_USER]).await;
        Ok(true)
    }

    async fn configure_linux(&self, config: &ProtocolConfig, access_key: &str, secret_key: &str) -> Result<bool, InstallerError> {
        let storage = &self.ctx.storage;
        let env_path = storage.minio_config_dir.join("minio.env");
        let port = config.port.unwrap_or(9000);
        let console_port = config.values.get("console_port").and_then(|v| v.as_u64()).unwrap_or(9001);

        let env = format!(
            "MINIO_ROOT_USER={access_key}\n\
             MINIO_ROOT_PASSWORD={secret_key}\n\
             MINIO_VOLUMES={}\n\
             MINIO_OPTS=\"--address :{port} --console-address :{console_port}\"\n",
            storage.minio_data_dir.display()
        );
        self.ctx.write_file(&env_path, &env).await?;
        self.ctx.write_file(Path::new(UNIT_PATH), &self.render_unit(&env_path)).await?;
        host::systemd_daemon_reload(&self.ctx).await;

        let owner = format!("{SERVICE_USER}:{SERVICE_USER}");
        for dir in [&storage.minio_data_dir, &storage.minio_config_dir] {
            let dir = dir.display().to_string();
            self.ctx.run(&["chown", "-R", owner.as_str(), dir.as_str()]).await;
        }

        let creds = storage.minio_config_dir.join("credentials.txt");
        self.ctx.write_file(&creds, &format!("Access Key: {access_key}\nSecret Key: {secret_key}\n")).await?;
        info!(path = %creds.display(), "minio credentials written");
        Ok(true)
    }

    fn credentials_file(&self) -> PathBuf {
        match self.ctx.os {
            OsKind::Windows => Path::new(WINDOWS_DIR).join("start-minio.bat"),
            _ => self.ctx.storage.minio_config_dir.join("minio.env"),
        }
    }

    /// Keys from the config, then from the file written by a previous configure,
    /// and only then freshly generated.
    async fn resolve_credentials(&self, config: &ProtocolConfig) -> (String, String) {
        let path = self.credentials_file();
        let (stored_user, stored_password) = match self.ctx.read_file(&path).await {
            Ok(text) => parse_credentials(&text),
            Err(_) => (None, None),
        };
        if stored_user.is_some() {
            debug!(path = %path.display(), "reusing stored minio credentials");
        }
        let access_key = config
            .get_str("access_key")
            .map(str::to_string)
            .or(stored_user)
            .unwrap_or_else(|| generate_key(ACCESS_KEY_LEN));
        let secret_key = config
            .get_str("secret_key")
            .map(str::to_string)
            .or(stored_password)
            .unwrap_or_else(|| generate_key(SECRET_KEY_LEN));
        (access_key, secret_key)
    }

    fn render_unit(&self, env_path: &Path) -> String {
        let binary = self.binary();
        format!(
            "[Unit]\n\
             Description=MinIO\n\
             Documentation=https://docs.min.io\n\
             Wants=network-online.target\n\
             After=network-online.target\n\
             AssertFileIsExecutable={bin}\n\
             \n\
             [Service]\n\
             WorkingDirectory=/usr/local/\n\
             User={SERVICE_USER}\n\
             Group={SERVICE_USER}\n\
             ProtectProc=invisible\n\
             EnvironmentFile={env}\n\
             ExecStart={bin} server $MINIO_OPTS $MINIO_VOLUMES\n\
             Restart=always\n\
             LimitNOFILE=65536\n\
             TasksMax=infinity\n\
             TimeoutStopSec=infinity\n\
             SendSIGKILL=no\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            bin = binary.display(),
            env = env_path.display(),
        )
    }

    async fn configure_windows(&self, access_key: &str, secret_key: &str) -> Result<bool, InstallerError> {
        let dir = Path::new(WINDOWS_DIR);
        let data = dir.join("data");
        self.ctx.create_dir(&data).await?;
        let script = format!(
            "@echo off\r\nset MINIO_ROOT_USER={access_key}\r\nset MINIO_ROOT_PASSWORD={secret_key}\r\n\
             \"{WINDOWS_DIR}\\minio.exe\" server \"{}\" --console-address \":9001\"\r\n",
            data.display()
        );
        self.ctx.write_file(&dir.join("start-minio.bat"), &script).await?;
        self.ctx
            .write_file(&dir.join("credentials.txt"), &format!("Access Key: {access_key}\nSecret Key: {secret_key}\n"))
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl Installer for S3Installer {
    fn protocol(&self) -> &str {
        "s3"
    }

    async fn detect_existing(&self) -> Result<Detection, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => {
                let Some(path) = self.ctx.which("minio").await else {
                    return Ok(Detection::absent());
                };
                let version = self.ctx.run(&["minio", "--version"]).await;
                if version.success && !version.stdout.trim().is_empty() {
                    let first = version.stdout.lines().next().unwrap_or_default().trim().to_string();
                    Ok(Detection::present(first))
                } else {
                    Ok(Detection::present(path.display().to_string()))
                }
            }
            OsKind::Windows => {
                let exe = Path::new(WINDOWS_DIR).join("minio.exe");
                if self.ctx.exists(&exe).await {
                    Ok(Detection::present("MinIO (Windows)"))
                } else {
                    Ok(Detection::absent())
                }
            }
            OsKind::Other => Ok(Detection::absent()),
        }
    }

    async fn install_packages(&self) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => self.download_linux().await,
            OsKind::Windows => {
                self.ctx.create_dir(Path::new(WINDOWS_DIR)).await?;
                let script = format!(
                    "Invoke-WebRequest -Uri '{WINDOWS_DOWNLOAD_URL}' -OutFile '{WINDOWS_DIR}\\minio.exe'"
                );
                Ok(host::powershell_long(&self.ctx, &script).await.success)
            }
            OsKind::Other => Ok(false),
        }
    }

    async fn configure(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        let (access_key, secret_key) = self.resolve_credentials(config).await;
        match self.ctx.os {
            OsKind::Linux => {
                self.ctx.create_dir(&self.ctx.storage.minio_data_dir).await?;
                self.ctx.create_dir(&self.ctx.storage.minio_config_dir).await?;
                self.configure_linux(config, &access_key, &secret_key).await
            }
            OsKind::Windows => self.configure_windows(&access_key, &secret_key).await,
            OsKind::Other => Ok(false),
        }
    }

    async fn start_service(&self) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Windows => {
                let script = format!("Start-Process -FilePath '{WINDOWS_DIR}\\start-minio.bat' -WindowStyle Hidden");
                Ok(host::powershell(&self.ctx, &script).await.success)
            }
            _ => Ok(UNITS.start(&self.ctx).await),
        }
    }

    async fn stop_service(&self) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Windows => Ok(host::powershell(&self.ctx, "Stop-Process -Name minio -Force").await.success),
            _ => Ok(UNITS.stop(&self.ctx).await),
        }
    }

    async fn restart_service(&self) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Windows => {
                self.stop_service().await?;
                self.start_service().await
            }
            _ => Ok(UNITS.restart(&self.ctx).await),
        }
    }

    async fn get_status(&self) -> Result<ServiceStatus, InstallerError> {
        match self.ctx.os {
            OsKind::Windows => {
                let out = host::powershell(&self.ctx, "Get-Process -Name minio -ErrorAction SilentlyContinue").await;
                Ok(ServiceStatus { is_running: out.success && !out.stdout.trim().is_empty(), ..ServiceStatus::stopped() })
            }
            _ => Ok(UNITS.status(&self.ctx).await),
        }
    }

    async fn uninstall(&self) -> Result<bool, InstallerError> {
        self.stop_service().await?;
        match self.ctx.os {
            OsKind::Linux => {
                let install_dir = self.ctx.storage.minio_install_dir.display().to_string();
                self.ctx.run(&["rm", "-f", UNIT_PATH]).await;
                host::systemd_daemon_reload(&self.ctx).await;
                self.ctx.run(&["rm", "-f", BIN_LINK]).await;
                // data and config directories are kept
                Ok(self.ctx.run(&["rm", "-rf", install_dir.as_str()]).await.success)
            }
            OsKind::Windows => {
                let script = format!("Remove-Item -Path '{WINDOWS_DIR}' -Recurse -Force");
                Ok(host::powershell_long(&self.ctx, &script).await.success)
            }
            OsKind::Other => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::test_support::ScriptedExecutor;
    use serde_json::json;

    #[test]
    fn generated_keys_are_alphanumeric() {
        let key = generate_key(SECRET_KEY_LEN);
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_key(ACCESS_KEY_LEN), generate_key(ACCESS_KEY_LEN));
    }

    #[tokio::test]
    async fn download_falls_back_to_curl() {
        let exec = ScriptedExecutor::new().respond("wget", CommandOutput::failed(4, "network failure"));
        let s3 = S3Installer::new(exec.context(OsKind::Linux));
        assert!(s3.install_packages().await.unwrap());
        assert!(exec.ran("curl -fsSL -o /opt/minio/minio"));
        assert!(exec.ran("chmod +x /opt/minio/minio"));
        assert!(exec.ran("ln -sf /opt/minio/minio /usr/local/bin/minio"));
        assert!(exec.ran("useradd -r -s /sbin/nologin minio-user"));
    }

    #[tokio::test]
    async fn download_failure_reports_failure() {
        let exec = ScriptedExecutor::new()
            .respond("wget", CommandOutput::failed(4, "network failure"))
            .respond("curl", CommandOutput::failed(6, "could not resolve host"));
        let s3 = S3Installer::new(exec.context(OsKind::Linux));
        assert!(!s3.install_packages().await.unwrap());
        assert!(!exec.ran("chmod"));
    }

    #[tokio::test]
    async fn configure_generates_credentials_and_unit() {
        let exec = ScriptedExecutor::new();
        let s3 = S3Installer::new(exec.context(OsKind::Linux));
        let cfg = ProtocolConfig::new(Some(9000), false, serde_json::Map::new());
        assert!(s3.configure(&cfg).await.unwrap());

        let env = exec.file("/etc/minio/minio.env").unwrap();
        let user = env.lines().find_map(|l| l.strip_prefix("MINIO_ROOT_USER=")).unwrap();
        let password = env.lines().find_map(|l| l.strip_prefix("MINIO_ROOT_PASSWORD=")).unwrap();
        assert_eq!(user.len(), ACCESS_KEY_LEN);
        assert_eq!(password.len(), SECRET_KEY_LEN);
        assert!(env.contains("MINIO_VOLUMES=/opt/minio/data"));

        let unit = exec.file(UNIT_PATH).unwrap();
        assert!(unit.contains("EnvironmentFile=/etc/minio/minio.env"));
        assert!(unit.contains("ExecStart=/opt/minio/minio server"));
        assert!(exec.ran("systemctl daemon-reload"));
        assert!(exec.file("/etc/minio/credentials.txt").unwrap().contains(user));
    }

    #[tokio::test]
    async fn configure_keeps_supplied_credentials() {
        let exec = ScriptedExecutor::new();
        let s3 = S3Installer::new(exec.context(OsKind::Linux));
        let values = json!({ "access_key": "admin", "secret_key": "supersecret", "console_port": 9101 });
        let cfg = ProtocolConfig::new(Some(9100), false, values.as_object().cloned().unwrap());
        assert!(s3.configure(&cfg).await.unwrap());
        let env = exec.file("/etc/minio/minio.env").unwrap();
        assert!(env.contains("MINIO_ROOT_USER=admin\n"));
        assert!(env.contains("MINIO_ROOT_PASSWORD=supersecret\n"));
        assert!(env.contains("--address :9100 --console-address :9101"));
    }

    #[tokio::test]
    async fn configure_keeps_existing_credentials() {
        let exec = ScriptedExecutor::new();
        let s3 = S3Installer::new(exec.context(OsKind::Linux));
        let root_line = |prefix: &str| {
            let env = exec.file("/etc/minio/minio.env").unwrap();
            env.lines().find_map(|l| l.strip_prefix(prefix)).unwrap().to_string()
        };

        assert!(s3.configure(&ProtocolConfig::new(Some(9000), false, serde_json::Map::new())).await.unwrap());
        let (user, password) = (root_line("MINIO_ROOT_USER="), root_line("MINIO_ROOT_PASSWORD="));

        assert!(s3.configure(&ProtocolConfig::new(Some(9100), false, serde_json::Map::new())).await.unwrap());
        assert_eq!(root_line("MINIO_ROOT_USER="), user);
        assert_eq!(root_line("MINIO_ROOT_PASSWORD="), password);
        assert!(exec.file("/etc/minio/minio.env").unwrap().contains("--address :9100"));
    }

    #[tokio::test]
    async fn configure_reads_credentials_left_by_a_previous_install() {
        let exec = ScriptedExecutor::new()
            .with_file("/etc/minio/minio.env", "MINIO_ROOT_USER=olduser\nMINIO_ROOT_PASSWORD=oldpassword\n");
        let s3 = S3Installer::new(exec.context(OsKind::Linux));
        let values = json!({ "secret_key": "rotated" });
        assert!(s3.configure(&ProtocolConfig::new(None, false, values.as_object().cloned().unwrap())).await.unwrap());
        let env = exec.file("/etc/minio/minio.env").unwrap();
        assert!(env.contains("MINIO_ROOT_USER=olduser\n"));
        assert!(env.contains("MINIO_ROOT_PASSWORD=rotated\n"));
    }

    #[test]
    fn windows_script_credentials_parse() {
        let (user, password) = parse_credentials("@echo off\r\nset MINIO_ROOT_USER=win\r\nset MINIO_ROOT_PASSWORD=pw\r\n");
        assert_eq!(user.as_deref(), Some("win"));
        assert_eq!(password.as_deref(), Some("pw"));
        assert_eq!(parse_credentials("MINIO_VOLUMES=/data\n"), (None, None));
    }

    #[tokio::test]
    async fn uninstall_removes_unit_and_binary() {
        let exec = ScriptedExecutor::new();
        let s3 = S3Installer::new(exec.context(OsKind::Linux));
        assert!(s3.uninstall().await.unwrap());
        let cmds = exec.commands();
        assert_eq!(cmds.first().map(String::as_str), Some("systemctl stop minio"));
        assert!(cmds.contains(&"rm -f /etc/systemd/system/minio.service".to_string()));
        assert!(cmds.contains(&"rm -rf /opt/minio".to_string()));
    }
}
