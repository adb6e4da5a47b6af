//! Package manager and service manager helpers shared by the installers.

use tracing::{info, warn};

use crate::executor::CommandOutput;
use crate::plugin::{InstallerContext, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Linux,
    Windows,
    Other,
}

impl OsKind {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => OsKind::Linux,
            "windows" => OsKind::Windows,
            _ => OsKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Yum,
    Dnf,
}

/// Package names per package-manager family.
#[derive(Debug, Clone, Copy)]
pub struct Packages {
    pub apt: &'static [&'static str],
    pub rpm: &'static [&'static str],
}

impl Packages {
    pub const fn same(names: &'static [&'static str]) -> Self {
        Self { apt: names, rpm: names }
    }

    fn for_manager(&self, pm: PackageManager) -> &'static [&'static str] {
        match pm {
            PackageManager::Apt => self.apt,
            PackageManager::Yum | PackageManager::Dnf => self.rpm,
        }
    }
}

impl PackageManager {
    /// Look for apt-get, then yum, then dnf.
    pub async fn detect(ctx: &InstallerContext) -> Option<Self> {
        for pm in [PackageManager::Apt, PackageManager::Yum, PackageManager::Dnf] {
            if ctx.which(pm.binary()).await.is_some() {
                return Some(pm);
            }
        }
        None
    }

    pub fn binary(self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Yum => "yum",
            PackageManager::Dnf => "dnf",
        }
    }

    pub async fn install(self, ctx: &InstallerContext, packages: &[&str]) -> bool {
        if self == PackageManager::Apt {
            // a stale index only matters if the install itself fails
            ctx.run_long(&["apt-get", "update"]).await;
        }
        let mut argv = vec![self.binary(), "install", "-y"];
        argv.extend_from_slice(packages);
        ctx.run_long(&argv).await.success
    }

    pub async fn remove(self, ctx: &InstallerContext, packages: &[&str]) -> bool {
        let mut argv = vec![self.binary(), "remove", "-y"];
        argv.extend_from_slice(packages);
        ctx.run_long(&argv).await.success
    }
}

pub async fn install_packages(ctx: &InstallerContext, packages: Packages) -> bool {
    let Some(pm) = PackageManager::detect(ctx).await else {
        warn!("no supported package manager found (apt-get, yum, dnf)");
        return false;
    };
    let names = packages.for_manager(pm);
    info!(manager = pm.binary(), packages = %names.join(" "), "installing_packages");
    pm.install(ctx, names).await
}

pub async fn remove_packages(ctx: &InstallerContext, packages: Packages) -> bool {
    let Some(pm) = PackageManager::detect(ctx).await else {
        warn!("no supported package manager found (apt-get, yum, dnf)");
        return false;
    };
    let names = packages.for_manager(pm);
    info!(manager = pm.binary(), packages = %names.join(" "), "removing_packages");
    pm.remove(ctx, names).await
}

pub async fn powershell(ctx: &InstallerContext, script: &str) -> CommandOutput {
    ctx.run(&["powershell", "-NoProfile", "-NonInteractive", "-Command", script]).await
}

pub async fn powershell_long(ctx: &InstallerContext, script: &str) -> CommandOutput {
    ctx.run_long(&["powershell", "-NoProfile", "-NonInteractive", "-Command", script]).await
}

/// Start every unit in order; on success each is enabled at boot.
pub async fn systemd_start(ctx: &InstallerContext, units: &[&str]) -> bool {
    let mut ok = true;
    for &unit in units {
        ok &= ctx.run(&["systemctl", "start", unit]).await.success;
    }
    if ok {
        for &unit in units {
            if !ctx.run(&["systemctl", "enable", unit]).await.success {
                warn!(unit = %unit, "systemctl enable failed; service will not start at boot");
            }
        }
    }
    ok
}

pub async fn systemd_stop(ctx: &InstallerContext, units: &[&str]) -> bool {
    let mut ok = true;
    for &unit in units {
        ok &= ctx.run(&["systemctl", "stop", unit]).await.success;
    }
    ok
}

pub async fn systemd_restart(ctx: &InstallerContext, units: &[&str]) -> bool {
    let mut ok = true;
    for &unit in units {
        ok &= ctx.run(&["systemctl", "restart", unit]).await.success;
    }
    ok
}

pub async fn systemd_daemon_reload(ctx: &InstallerContext) -> bool {
    ctx.run(&["systemctl", "daemon-reload"]).await.success
}

/// Running state, main PID and uptime of a systemd unit.
pub async fn systemd_status(ctx: &InstallerContext, unit: &str) -> ServiceStatus {
    let active = ctx.run(&["systemctl", "is-active", unit]).await;
    if active.stdout.trim() != "active" {
        return ServiceStatus::stopped();
    }
    let pid = main_pid(ctx, unit).await;
    let uptime_seconds = match pid {
        Some(pid) => process_uptime(ctx, pid).await,
        None => None,
    };
    ServiceStatus { is_running: true, pid, uptime_seconds }
}

async fn main_pid(ctx: &InstallerContext, unit: &str) -> Option<u32> {
    let out = ctx.run(&["systemctl", "show", "-p", "MainPID", unit]).await;
    if !out.success {
        return None;
    }
    parse_main_pid(&out.stdout)
}

fn parse_main_pid(stdout: &str) -> Option<u32> {
    let value = stdout.trim().rsplit('=').next()?;
    match value.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(pid) => Some(pid),
    }
}

async fn process_uptime(ctx: &InstallerContext, pid: u32) -> Option<u64> {
    let pid = pid.to_string();
    let out = ctx.run(&["ps", "-o", "etimes=", "-p", pid.as_str()]).await;
    if !out.success {
        return None;
    }
    out.stdout.trim().parse::<u64>().ok()
}

pub async fn windows_service_start(ctx: &InstallerContext, name: &str) -> bool {
    let script = format!("Set-Service -Name {name} -StartupType Automatic; Start-Service {name}");
    powershell(ctx, &script).await.success
}

pub async fn windows_service_stop(ctx: &InstallerContext, name: &str) -> bool {
    powershell(ctx, &format!("Stop-Service {name}")).await.success
}

pub async fn windows_service_restart(ctx: &InstallerContext, name: &str) -> bool {
    powershell(ctx, &format!("Restart-Service {name}")).await.success
}

pub async fn windows_service_status(ctx: &InstallerContext, name: &str) -> ServiceStatus {
    let out = powershell(ctx, &format!("(Get-Service {name}).Status")).await;
    ServiceStatus { is_running: out.success && out.stdout.contains("Running"), ..ServiceStatus::stopped() }
}

/// Where a protocol's service lives on each platform.
#[derive(Debug, Clone, Copy)]
pub struct ServiceUnits {
    /// systemd units, controlled in order; the first one is the one reported by status.
    pub linux: &'static [&'static str],
    pub windows: Option<&'static str>,
}

impl ServiceUnits {
    pub async fn start(&self, ctx: &InstallerContext) -> bool {
        match (ctx.os, self.windows) {
            (OsKind::Linux, _) => systemd_start(ctx, self.linux).await,
            (OsKind::Windows, Some(name)) => windows_service_start(ctx, name).await,
            _ => false,
        }
    }

    pub async fn stop(&self, ctx: &InstallerContext) -> bool {
        match (ctx.os, self.windows) {
            (OsKind::Linux, _) => systemd_stop(ctx, self.linux).await,
            (OsKind::Windows, Some(name)) => windows_service_stop(ctx, name).await,
            _ => false,
        }
    }

    pub async fn restart(&self, ctx: &InstallerContext) -> bool {
        match (ctx.os, self.windows) {
            (OsKind::Linux, _) => systemd_restart(ctx, self.linux).await,
            (OsKind::Windows, Some(name)) => windows_service_restart(ctx, name).await,
            _ => false,
        }
    }

    pub async fn status(&self, ctx: &InstallerContext) -> ServiceStatus {
        match (ctx.os, self.windows, self.linux.first()) {
            (OsKind::Linux, _, Some(unit)) => systemd_status(ctx, unit).await,
            (OsKind::Windows, Some(name), _) => windows_service_status(ctx, name).await,
            _ => ServiceStatus::stopped(),
        }
    }
}
