use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::ftp::FtpInstaller;
use crate::nfs::NfsInstaller;
use crate::plugin::{Installer, InstallerContext};
use crate::s3::S3Installer;
use crate::sftp::SftpInstaller;
use crate::smb::SmbInstaller;
use crate::stub::NotImplementedInstaller;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),
}

pub type InstallerFactory = Arc<dyn Fn(&InstallerContext) -> Arc<dyn Installer> + Send + Sync>;

/// Protocol identifier -> installer factory. Built once at startup; every `resolve`
/// hands out a fresh, stateless installer.
#[derive(Clone)]
pub struct InstallerRegistry {
    ctx: InstallerContext,
    factories: BTreeMap<String, InstallerFactory>,
    stubs: HashSet<String>,
}

impl InstallerRegistry {
    pub fn new(ctx: InstallerContext) -> Self {
        Self { ctx, factories: BTreeMap::new(), stubs: HashSet::new() }
    }

    /// Registry with every supported protocol family.
    pub fn with_defaults(ctx: InstallerContext) -> Self {
        let mut reg = Self::new(ctx);
        reg.register("ftp", |ctx| Arc::new(FtpInstaller::new(ctx.clone())));
        reg.register("sftp", |ctx| Arc::new(SftpInstaller::new(ctx.clone())));
        reg.register("smb", |ctx| Arc::new(SmbInstaller::new(ctx.clone())));
        reg.register("s3", |ctx| Arc::new(S3Installer::new(ctx.clone())));
        reg.register("nfs", |ctx| Arc::new(NfsInstaller::new(ctx.clone())));
        reg.register_stub("webdav");
        reg.register_stub("nextcloud");
        reg
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&InstallerContext) -> Arc<dyn Installer> + Send + Sync + 'static,
    {
        self.stubs.remove(name);
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a protocol whose installer is not implemented yet.
    pub fn register_stub(&mut self, name: &str) {
        let owned = name.to_string();
        self.factories.insert(
            name.to_string(),
            Arc::new(move |_ctx: &InstallerContext| -> Arc<dyn Installer> { Arc::new(NotImplementedInstaller::new(owned.clone())) }),
        );
        self.stubs.insert(name.to_string());
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Installer>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownProtocol(name.to_string()))?;
        Ok(factory(&self.ctx))
    }

    pub fn is_stub(&self, name: &str) -> bool {
        self.stubs.contains(name)
    }

    /// Registered identifiers in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
