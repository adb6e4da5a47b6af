//! Protocol installers: everything that touches the host operating system.
//! - `executor` runs external commands and mediates filesystem access.
//! - `host` wraps package managers and service managers on top of the executor.
//! - One `Installer` implementation per protocol family, looked up through `registry`.

pub mod executor;
pub mod host;
pub mod metrics;
pub mod plugin;
pub mod registry;

pub mod ftp;
pub mod nfs;
pub mod s3;
pub mod sftp;
pub mod smb;
pub mod stub;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use executor::{CommandOutput, Executor, SystemExecutor};
pub use host::OsKind;
pub use plugin::{Detection, Installer, InstallerContext, InstallerError, ProtocolConfig, ServiceStatus};
pub use registry::{InstallerRegistry, RegistryError};
