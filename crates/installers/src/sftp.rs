//! SFTP through the OpenSSH server with a chrooted `sftpusers` group.

use std::path::Path;

use async_trait::async_trait;

use crate::host::{self, OsKind, Packages, ServiceUnits};
use crate::plugin::{Detection, Installer, InstallerContext, InstallerError, ProtocolConfig, ServiceStatus};

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";
const SENTINEL: &str = "# File Server SFTP Configuration";
const SFTP_GROUP: &str = "sftpusers";
const PACKAGES: Packages = Packages::same(&["openssh-server"]);
const UNITS: ServiceUnits = ServiceUnits { linux: &["sshd"], windows: Some("sshd") };
const WINDOWS_CAPABILITY: &str = "OpenSSH.Server~~~~0.0.1.0";

pub struct SftpInstaller {
    ctx: InstallerContext,
}

impl SftpInstaller {
    pub fn new(ctx: InstallerContext) -> Self {
        Self { ctx }
    }

    fn match_block(&self) -> String {
        format!(
            "\n\n{SENTINEL}\n\
             Subsystem sftp internal-sftp\n\
             \n\
             Match Group {SFTP_GROUP}\n\
             \x20   ChrootDirectory {}/%u\n\
             \x20   ForceCommand internal-sftp\n\
             \x20   AllowTcpForwarding no\n\
             \x20   X11Forwarding no\n\
             \x20   PasswordAuthentication yes\n",
            self.ctx.storage.sftp_root.display()
        )
    }

    async fn configure_openssh(&self) -> Result<bool, InstallerError> {
        let path = Path::new(SSHD_CONFIG);
        self.ctx.backup(path).await;
        // an unreadable config is treated as empty, the block is still appended
        let existing = self.ctx.read_file(path).await.unwrap_or_default();
        if !existing.contains(SENTINEL) {
            let updated = format!("{existing}{}", self.match_block());
            self.ctx.write_file(path, &updated).await?;
        }
        // exits 9 when the group already exists
        self.ctx.run(&["groupadd", SFTP_GROUP]).await;
        self.ctx.create_dir(&self.ctx.storage.sftp_root).await?;
        Ok(true)
    }
}

#[async_trait]
impl Installer for SftpInstaller {
    fn protocol(&self) -> &str {
        "sftp"
    }

    async fn detect_existing(&self) -> Result<Detection, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => {
                let Some(path) = self.ctx.which("sshd").await else {
                    return Ok(Detection::absent());
                };
                let version = self.ctx.run(&["ssh", "-V"]).await.text();
                if version.is_empty() {
                    Ok(Detection::present(path.display().to_string()))
                } else {
                    Ok(Detection::present(version))
                }
            }
            OsKind::Windows => {
                let out = host::powershell(
                    &self.ctx,
                    "(Get-WindowsCapability -Online | Where-Object Name -like 'OpenSSH.Server*').State",
                )
                .await;
                if out.success && out.stdout.contains("Installed") && !out.stdout.contains("NotPresent") {
                    Ok(Detection::present("OpenSSH Server"))
                } else {
                    Ok(Detection::absent())
                }
            }
            OsKind::Other => Ok(Detection::absent()),
        }
    }

    async fn install_packages(&self) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => Ok(host::install_packages(&self.ctx, PACKAGES).await),
            OsKind::Windows => {
                let script = format!("Add-WindowsCapability -Online -Name {WINDOWS_CAPABILITY}");
                Ok(host::powershell_long(&self.ctx, &script).await.success)
            }
            OsKind::Other => Ok(false),
        }
    }

    async fn configure(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => self.configure_openssh().await,
            OsKind::Windows => {
                let port = config.port.unwrap_or(22);
                let script = format!(
                    "if (-not (Get-NetFirewallRule -Name sshd -ErrorAction SilentlyContinue)) {{ \
                     New-NetFirewallRule -Name sshd -DisplayName 'OpenSSH Server (sshd)' -Enabled True \
                     -Direction Inbound -Protocol TCP -Action Allow -LocalPort {port} }}"
                );
                Ok(host::powershell(&self.ctx, &script).await.success)
            }
            OsKind::Other => Ok(false),
        }
    }

    async fn start_service(&self) -> Result<bool, InstallerError> {
        Ok(UNITS.start(&self.ctx).await)
    }

    async fn stop_service(&self) -> Result<bool, InstallerError> {
        Ok(UNITS.stop(&self.ctx).await)
    }

    async fn restart_service(&self) -> Result<bool, InstallerError> {
        Ok(UNITS.restart(&self.ctx).await)
    }

    async fn get_status(&self) -> Result<ServiceStatus, InstallerError> {
        Ok(UNITS.status(&self.ctx).await)
    }

    async fn uninstall(&self) -> Result<bool, InstallerError> {
        UNITS.stop(&self.ctx).await;
        match self.ctx.os {
            OsKind::Linux => Ok(host::remove_packages(&self.ctx, PACKAGES).await),
            OsKind::Windows => {
                let script = format!("Remove-WindowsCapability -Online -Name {WINDOWS_CAPABILITY}");
                Ok(host::powershell_long(&self.ctx, &script).await.success)
            }
            OsKind::Other => Ok(false),
        }
    }
}
