//! NFS exports through the kernel NFS server. Linux only.

use std::path::Path;

use async_trait::async_trait;
use tracing::error;

use crate::host::{self, OsKind, Packages, ServiceUnits};
use crate::plugin::{Detection, Installer, InstallerContext, InstallerError, ProtocolConfig, ServiceStatus};

const EXPORTS: &str = "/etc/exports";
const PACKAGES: Packages = Packages { apt: &["nfs-kernel-server"], rpm: &["nfs-utils"] };
// `nfs-server` is the unit name on both Debian and RHEL families
const UNITS: ServiceUnits = ServiceUnits { linux: &["nfs-server"], windows: None };

pub struct NfsInstaller {
    ctx: InstallerContext,
}

impl NfsInstaller {
    pub fn new(ctx: InstallerContext) -> Self {
        Self { ctx }
    }

    fn render_exports(&self, config: &ProtocolConfig) -> String {
        let clients = config.get_str("clients").unwrap_or(self.ctx.storage.nfs_clients.as_str());
        format!(
            "# exports managed by file-server\n{} {clients}\n",
            self.ctx.storage.nfs_export_root.display()
        )
    }
}

#[async_trait]
impl Installer for NfsInstaller {
    fn protocol(&self) -> &str {
        "nfs"
    }

    async fn detect_existing(&self) -> Result<Detection, InstallerError> {
        if self.ctx.os != OsKind::Linux {
            return Ok(Detection::absent());
        }
        match self.ctx.which("exportfs").await {
            Some(path) => Ok(Detection::present(path.display().to_string())),
            None => Ok(Detection::absent()),
        }
    }

    async fn install_packages(&self) -> Result<bool, InstallerError> {
        if self.ctx.os != OsKind::Linux {
            return Ok(false);
        }
        Ok(host::install_packages(&self.ctx, PACKAGES).await)
    }

    async fn configure(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        if self.ctx.os != OsKind::Linux {
            return Ok(false);
        }
        self.ctx.create_dir(&self.ctx.storage.nfs_export_root).await?;
        let path = Path::new(EXPORTS);
        self.ctx.backup(path).await;
        self.ctx.write_file(path, &self.render_exports(config)).await?;

        let reload = self.ctx.run(&["exportfs", "-ra"]).await;
        if !reload.success {
            error!(stderr = %reload.stderr.trim(), "exportfs rejected /etc/exports");
            return Ok(false);
        }
        Ok(true)
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
        if self.ctx.os != OsKind::Linux {
            return Ok(false);
        }
        UNITS.stop(&self.ctx).await;
        Ok(host::remove_packages(&self.ctx, PACKAGES).await)
    }
}
