use models::protocol::{Model, ProtocolStatus};
use sea_orm::prelude::DateTimeWithTimeZone;

/// Something that happened to a protocol, as recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    InstallStarted,
    UninstallStarted,
    /// Install found the software already present; it is adopted but left stopped.
    DetectedExisting,
    Installed { started: bool },
    Started,
    Restarted,
    Stopped,
    Uninstalled,
    Failed(String),
    ConfigUpdated {
        config: Option<serde_json::Value>,
        port: Option<i32>,
        ssl_enabled: Option<bool>,
    },
    /// A background job was lost with the previous process.
    Interrupted,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::InstallStarted => "install_started",
            LifecycleEvent::UninstallStarted => "uninstall_started",
            LifecycleEvent::DetectedExisting => "detected_existing",
            LifecycleEvent::Installed { .. } => "installed",
            LifecycleEvent::Started => "started",
            LifecycleEvent::Restarted => "restarted",
            LifecycleEvent::Stopped => "stopped",
            LifecycleEvent::Uninstalled => "uninstalled",
            LifecycleEvent::Failed(_) => "failed",
            LifecycleEvent::ConfigUpdated { .. } => "config_updated",
            LifecycleEvent::Interrupted => "interrupted",
        }
    }
}

/// Next record after `event`. Pure: the caller persists the result.
///
/// Every transition bumps `updated_at` and `version`. A record landing in any state
/// other than ERROR has its `error_message` cleared; RUNNING always implies installed
/// and UNINSTALLED always implies not installed and not enabled.
pub fn transition(current: &Model, event: LifecycleEvent, now: DateTimeWithTimeZone) -> Model {
    let mut next = current.clone();
    match event {
        LifecycleEvent::InstallStarted => next.status = ProtocolStatus::Installing,
        LifecycleEvent::UninstallStarted => next.status = ProtocolStatus::Uninstalling,
        LifecycleEvent::DetectedExisting => {
            next.status = ProtocolStatus::Stopped;
            next.is_installed = true;
            next.is_enabled = false;
        }
        LifecycleEvent::Installed { started } => {
            next.status = if started { ProtocolStatus::Running } else { ProtocolStatus::Stopped };
            next.is_installed = true;
            next.is_enabled = started;
        }
        LifecycleEvent::Started | LifecycleEvent::Restarted => {
            next.status = ProtocolStatus::Running;
            next.is_enabled = true;
        }
        LifecycleEvent::Stopped => {
            next.status = ProtocolStatus::Stopped;
            next.is_enabled = false;
        }
        LifecycleEvent::Uninstalled => {
            next.status = ProtocolStatus::Uninstalled;
            next.is_installed = false;
            next.is_enabled = false;
            next.installed_at = None;
        }
        LifecycleEvent::Failed(message) => {
            next.status = ProtocolStatus::Error;
            let message = message.trim();
            next.error_message = Some(if message.is_empty() { "operation failed".to_string() } else { message.to_string() });
        }
        LifecycleEvent::ConfigUpdated { config, port, ssl_enabled } => {
            if config.is_some() {
                next.config_json = config;
            }
            if port.is_some() {
                next.port = port;
            }
            if let Some(ssl) = ssl_enabled {
                next.ssl_enabled = ssl;
            }
        }
        LifecycleEvent::Interrupted => {
            let during = if current.status == ProtocolStatus::Uninstalling { "uninstall" } else { "install" };
            next.status = ProtocolStatus::Error;
            next.error_message = Some(format!("{during} interrupted by a service restart; retry the operation"));
        }
    }

    if next.status == ProtocolStatus::Running {
        next.is_installed = true;
    }
    if next.is_installed && next.installed_at.is_none() {
        next.installed_at = Some(now);
    }
    if next.status != ProtocolStatus::Error {
        next.error_message = None;
    }
    next.updated_at = now;
    next.version = current.version + 1;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn row(status: ProtocolStatus, installed: bool) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "ftp".into(),
            display_name: "FTP/FTPS".into(),
            is_enabled: false,
            is_installed: installed,
            port: Some(21),
            ssl_enabled: false,
            config_json: None,
            status,
            error_message: None,
            installed_at: None,
            updated_at: Utc::now().into(),
            version: 4,
        }
    }

    fn now() -> DateTimeWithTimeZone {
        Utc::now().into()
    }

    #[test]
    fn every_transition_bumps_version() {
        let current = row(ProtocolStatus::Stopped, true);
        let next = transition(&current, LifecycleEvent::Started, now());
        assert_eq!(next.version, 5);
        assert!(next.updated_at >= current.updated_at);
    }

    #[test]
    fn install_success_runs_and_enables() {
        let next = transition(&row(ProtocolStatus::Installing, false), LifecycleEvent::Installed { started: true }, now());
        assert_eq!(next.status, ProtocolStatus::Running);
        assert!(next.is_installed && next.is_enabled);
        assert!(next.installed_at.is_some());
    }

    #[test]
    fn install_without_start_is_stopped_and_disabled() {
        let next = transition(&row(ProtocolStatus::Installing, false), LifecycleEvent::Installed { started: false }, now());
        assert_eq!(next.status, ProtocolStatus::Stopped);
        assert!(next.is_installed);
        assert!(!next.is_enabled);
    }

    #[test]
    fn detected_existing_is_adopted_stopped() {
        let next = transition(&row(ProtocolStatus::Installing, false), LifecycleEvent::DetectedExisting, now());
        assert_eq!(next.status, ProtocolStatus::Stopped);
        assert!(next.is_installed);
    }

    #[test]
    fn failure_keeps_install_flag_and_records_message() {
        let next = transition(&row(ProtocolStatus::Installing, false), LifecycleEvent::Failed("  ".into()), now());
        assert_eq!(next.status, ProtocolStatus::Error);
        assert!(!next.is_installed);
        assert_eq!(next.error_message.as_deref(), Some("operation failed"));
    }

    #[test]
    fn leaving_error_clears_message() {
        let mut current = row(ProtocolStatus::Error, true);
        current.error_message = Some("restart failed".into());
        let next = transition(&current, LifecycleEvent::Started, now());
        assert_eq!(next.status, ProtocolStatus::Running);
        assert!(next.error_message.is_none());
    }

    #[test]
    fn uninstall_resets_flags() {
        let mut current = row(ProtocolStatus::Uninstalling, true);
        current.is_enabled = true;
        current.installed_at = Some(now());
        let next = transition(&current, LifecycleEvent::Uninstalled, now());
        assert_eq!(next.status, ProtocolStatus::Uninstalled);
        assert!(!next.is_installed && !next.is_enabled);
        assert!(next.installed_at.is_none());
    }

    #[test]
    fn config_update_keeps_status_and_unset_fields() {
        let current = row(ProtocolStatus::Running, true);
        let next = transition(
            &current,
            LifecycleEvent::ConfigUpdated { config: Some(serde_json::json!({ "force_ssl": true })), port: None, ssl_enabled: Some(true) },
            now(),
        );
        assert_eq!(next.status, ProtocolStatus::Running);
        assert_eq!(next.port, Some(21));
        assert!(next.ssl_enabled);
        assert_eq!(next.config_map().get("force_ssl"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn interrupted_uninstall_names_the_operation() {
        let next = transition(&row(ProtocolStatus::Uninstalling, true), LifecycleEvent::Interrupted, now());
        assert_eq!(next.status, ProtocolStatus::Error);
        assert!(next.error_message.unwrap().starts_with("uninstall interrupted"));
    }
}
