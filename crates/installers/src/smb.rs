//! SMB/CIFS through Samba (`smbd` + `nmbd`) on Linux, the built-in LanmanServer on Windows.

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info};

use crate::host::{self, OsKind, Packages, ServiceUnits};
use crate::plugin::{Detection, Installer, InstallerContext, InstallerError, ProtocolConfig, ServiceStatus};

const SMB_CONF: &str = "/etc/samba/smb.conf";
const INSTALL: Packages = Packages { apt: &["samba", "samba-common-bin"], rpm: &["samba", "samba-client"] };
const REMOVE: Packages = Packages { apt: &["samba", "samba-common-bin"], rpm: &["samba"] };
const UNITS: ServiceUnits = ServiceUnits { linux: &["smbd", "nmbd"], windows: Some("LanmanServer") };

pub struct SmbInstaller {
    ctx: InstallerContext,
}

impl SmbInstaller {
    pub fn new(ctx: InstallerContext) -> Self {
        Self { ctx }
    }

    async fn configure_samba(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        let path = Path::new(SMB_CONF);
        self.ctx.backup(path).await;
        self.ctx.write_file(path, &render_smb_conf(config)).await?;

        let check = self.ctx.run(&["testparm", "-s"]).await;
        if !check.success {
            error!(stderr = %check.stderr.trim(), "samba configuration test failed");
            return Ok(false);
        }
        Ok(true)
    }
}

fn render_smb_conf(config: &ProtocolConfig) -> String {
    let workgroup = config.get_str("workgroup").unwrap_or("WORKGROUP");
    let server_string = config.get_str("server_string").unwrap_or("File Server");
    let netbios_name = config.get_str("netbios_name").unwrap_or("fileserver");
    let mut out = format!(
        "[global]\n\
         \x20  workgroup = {workgroup}\n\
         \x20  server string = {server_string}\n\
         \x20  netbios name = {netbios_name}\n\
         \x20  security = user\n\
         \x20  map to guest = bad user\n\
         \x20  dns proxy = no\n\
         \x20  log file = /var/log/samba/log.%m\n\
         \x20  max log size = 1000\n\
         \x20  log level = 1\n\
         \x20  socket options = TCP_NODELAY IPTOS_LOWDELAY SO_RCVBUF=131072 SO_SNDBUF=131072\n\
         \x20  dead time = 15\n\
         \x20  getwd cache = yes\n"
    );
    if let Some(port) = config.port {
        out.push_str(&format!("   smb ports = {port}\n"));
    }
    if config.ssl_enabled {
        out.push_str("   server smb encrypt = required\n");
    }
    out
}

#[async_trait]
impl Installer for SmbInstaller {
    fn protocol(&self) -> &str {
        "smb"
    }

    async fn detect_existing(&self) -> Result<Detection, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => {
                let Some(path) = self.ctx.which("smbd").await else {
                    return Ok(Detection::absent());
                };
                let version = self.ctx.run(&["smbd", "--version"]).await;
                if version.success && !version.stdout.trim().is_empty() {
                    Ok(Detection::present(version.stdout.trim()))
                } else {
                    Ok(Detection::present(path.display().to_string()))
                }
            }
            OsKind::Windows => Ok(Detection::present("Built-in SMB Server")),
            OsKind::Other => Ok(Detection::absent()),
        }
    }

    async fn install_packages(&self) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => Ok(host::install_packages(&self.ctx, INSTALL).await),
            OsKind::Windows => Ok(true),
            OsKind::Other => Ok(false),
        }
    }

    async fn configure(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => self.configure_samba(config).await,
            OsKind::Windows => Ok(host::powershell(
                &self.ctx,
                "Set-SmbServerConfiguration -EnableSMB2Protocol $true -Force",
            )
            .await
            .success),
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
        match self.ctx.os {
            OsKind::Linux => {
                UNITS.stop(&self.ctx).await;
                Ok(host::remove_packages(&self.ctx, REMOVE).await)
            }
            OsKind::Windows => {
                info!("SMB is built into Windows and cannot be uninstalled");
                Ok(false)
            }
            OsKind::Other => Ok(false),
        }
    }
}
