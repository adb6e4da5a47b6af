//! Placeholder installer for protocols that have no host integration yet (WebDAV, NextCloud).
//! Every operation fails deterministically so a lifecycle request lands in a clear state.

use async_trait::async_trait;
use tracing::warn;

use crate::plugin::{Detection, Installer, InstallerError, ProtocolConfig, ServiceStatus};

pub struct NotImplementedInstaller {
    protocol: String,
}

impl NotImplementedInstaller {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self { protocol: protocol.into() }
    }
}

#[async_trait]
impl Installer for NotImplementedInstaller {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn detect_existing(&self) -> Result<Detection, InstallerError> {
        Ok(Detection::absent())
    }

    async fn install_packages(&self) -> Result<bool, InstallerError> {
        warn!(protocol = %self.protocol, "installer not yet implemented");
        Ok(false)
    }

    async fn configure(&self, _config: &ProtocolConfig) -> Result<bool, InstallerError> {
        Ok(false)
    }

    async fn start_service(&self) -> Result<bool, InstallerError> {
        Ok(false)
    }

    async fn stop_service(&self) -> Result<bool, InstallerError> {
        Ok(false)
    }

    async fn restart_service(&self) -> Result<bool, InstallerError> {
        Ok(false)
    }

    async fn get_status(&self) -> Result<ServiceStatus, InstallerError> {
        Ok(ServiceStatus::stopped())
    }

    async fn uninstall(&self) -> Result<bool, InstallerError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_operation_fails() {
        let stub = NotImplementedInstaller::new("webdav");
        assert_eq!(stub.protocol(), "webdav");
        assert!(!stub.detect_existing().await.unwrap().installed);
        assert!(!stub.install_packages().await.unwrap());
        assert!(!stub.configure(&ProtocolConfig::default()).await.unwrap());
        assert!(!stub.start_service().await.unwrap());
        assert!(!stub.get_status().await.unwrap().is_running);
        assert!(!stub.uninstall().await.unwrap());
    }
}
