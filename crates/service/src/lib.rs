//! Service layer for protocol lifecycle management on top of `models` and `installers`.
//! - `protocol` abstracts persistence of protocol records behind a repository trait.
//! - `lifecycle` owns the state machine and drives installers through it.
//! - `jobs` runs long install/uninstall work in the background.

pub mod errors;
pub mod jobs;
pub mod lifecycle;
pub mod metrics;
pub mod protocol;
