//! FTP/FTPS through vsftpd on Linux, the IIS FTP role on Windows.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::host::{self, OsKind, Packages, ServiceUnits};
use crate::plugin::{Detection, Installer, InstallerContext, InstallerError, ProtocolConfig, ServiceStatus};

const CONFIG_PATH: &str = "/etc/vsftpd.conf";
const USERLIST_PATH: &str = "/etc/vsftpd.userlist";
const SECURE_CHROOT_DIR: &str = "/var/run/vsftpd/empty";
const DEFAULT_CERT_PATH: &str = "/etc/ssl/certs/vsftpd.pem";
const PACKAGES: Packages = Packages::same(&["vsftpd"]);
const UNITS: ServiceUnits = ServiceUnits { linux: &["vsftpd"], windows: Some("ftpsvc") };

pub struct FtpInstaller {
    ctx: InstallerContext,
}

impl FtpInstaller {
    pub fn new(ctx: InstallerContext) -> Self {
        Self { ctx }
    }

    async fn configure_vsftpd(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        let cert_path = config.get_str("ssl_cert").unwrap_or(DEFAULT_CERT_PATH);
        let rendered = render_vsftpd_conf(config, cert_path);
        self.ctx.write_file(Path::new(CONFIG_PATH), &rendered).await?;

        let userlist = Path::new(USERLIST_PATH);
        if !self.ctx.exists(userlist).await {
            self.ctx.write_file(userlist, "").await?;
        }
        self.ctx.create_dir(Path::new(SECURE_CHROOT_DIR)).await?;

        if config.ssl_enabled && !self.ctx.exists(Path::new(cert_path)).await {
            info!(cert = %cert_path, "generating self-signed certificate for vsftpd");
            let generated = self
                .ctx
                .run(&[
                    "openssl", "req", "-x509", "-nodes", "-days", "365", "-newkey", "rsa:2048",
                    "-keyout", cert_path, "-out", cert_path, "-subj", "/CN=FTP Server",
                ])
                .await;
            if !generated.success {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn configure_iis(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        let port = config.port.unwrap_or(21);
        let root = self.ctx.storage.base_path.join("ftp");
        self.ctx.create_dir(&root).await?;
        let script = format!(
            "Import-Module WebAdministration; \
             if (-not (Get-WebSite -Name 'FileServerFTP')) {{ \
             New-WebFtpSite -Name 'FileServerFTP' -Port {port} -PhysicalPath '{}' }}",
            root.display()
        );
        Ok(host::powershell(&self.ctx, &script).await.success)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}

fn render_vsftpd_conf(config: &ProtocolConfig, cert_path: &str) -> String {
    let ssl = yes_no(config.ssl_enabled);
    let force = yes_no(config.ssl_enabled && config.get_bool("force_ssl"));
    let port = config.port.unwrap_or(21);
    let mut out = format!(
        "# vsftpd configuration managed by file-server\n\
         listen=YES\n\
         listen_ipv6=NO\n\
         listen_port={port}\n\
         anonymous_enable=NO\n\
         local_enable=YES\n\
         write_enable=YES\n\
         local_umask=022\n\
         dirmessage_enable=YES\n\
         use_localtime=YES\n\
         xferlog_enable=YES\n\
         connect_from_port_20=YES\n\
         chroot_local_user=YES\n\
         allow_writeable_chroot=YES\n\
         secure_chroot_dir={SECURE_CHROOT_DIR}\n\
         pam_service_name=vsftpd\n\
         pasv_enable=YES\n\
         pasv_min_port=40000\n\
         pasv_max_port=50000\n\
         userlist_enable=YES\n\
         userlist_file={USERLIST_PATH}\n\
         userlist_deny=NO\n\
         \n\
         ssl_enable={ssl}\n\
         allow_anon_ssl=NO\n\
         force_local_data_ssl={force}\n\
         force_local_logins_ssl={force}\n\
         ssl_tlsv1={ssl}\n\
         ssl_sslv2=NO\n\
         ssl_sslv3=NO\n\
         require_ssl_reuse=NO\n\
         ssl_ciphers=HIGH\n"
    );
    if config.ssl_enabled {
        out.push_str(&format!("rsa_cert_file={cert_path}\nrsa_private_key_file={cert_path}\n"));
    }
    out.push_str("\nxferlog_std_format=NO\nlog_ftp_protocol=YES\n");
    out
}

#[async_trait]
impl Installer for FtpInstaller {
    fn protocol(&self) -> &str {
        "ftp"
    }

    async fn detect_existing(&self) -> Result<Detection, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => {
                let Some(path) = self.ctx.which("vsftpd").await else {
                    return Ok(Detection::absent());
                };
                // vsftpd -v prints its banner on stderr and may exit non-zero
                let version = self.ctx.run(&["vsftpd", "-v"]).await.text();
                if version.is_empty() {
                    Ok(Detection::present(path.display().to_string()))
                } else {
                    Ok(Detection::present(version))
                }
            }
            OsKind::Windows => {
                let out = host::powershell(&self.ctx, "(Get-WindowsFeature -Name Web-Ftp-Server).Installed").await;
                if out.success && out.stdout.trim().eq_ignore_ascii_case("true") {
                    Ok(Detection::present("IIS FTP"))
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
            OsKind::Windows => Ok(host::powershell_long(
                &self.ctx,
                "Install-WindowsFeature -Name Web-Ftp-Server -IncludeManagementTools",
            )
            .await
            .success),
            OsKind::Other => Ok(false),
        }
    }

    async fn configure(&self, config: &ProtocolConfig) -> Result<bool, InstallerError> {
        match self.ctx.os {
            OsKind::Linux => self.configure_vsftpd(config).await,
            OsKind::Windows => self.configure_iis(config).await,
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
                Ok(host::powershell_long(&self.ctx, "Uninstall-WindowsFeature -Name Web-Ftp-Server").await.success)
            }
            OsKind::Other => Ok(false),
        }
    }
}
