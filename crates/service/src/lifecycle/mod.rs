//! Protocol lifecycle: the state machine, per-protocol exclusion and the orchestrator
//! that drives installers and persists every transition.

pub mod locks;
pub mod orchestrator;
pub mod state;

pub use orchestrator::{ConfigUpdate, InstallOutcome, LifecycleOrchestrator, StatusReport, UninstallOutcome};
pub use state::{transition, LifecycleEvent};

#[cfg(test)]
mod tests;
