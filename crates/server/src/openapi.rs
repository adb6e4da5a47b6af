use utoipa::OpenApi;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema)]
pub struct HealthResponse { pub status: String }

/// Stored protocol record.
#[derive(ToSchema)]
pub struct ProtocolDoc {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub is_enabled: bool,
    pub is_installed: bool,
    pub port: Option<i32>,
    pub ssl_enabled: bool,
    #[schema(value_type = Option<Object>)]
    pub config_json: Option<serde_json::Value>,
    /// uninstalled, installing, uninstalling, stopped, running or error
    pub status: String,
    pub error_message: Option<String>,
    pub installed_at: Option<String>,
    pub updated_at: String,
    pub version: i32,
}

#[derive(ToSchema)]
pub struct StatusDoc {
    pub protocol: String,
    pub status: String,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
    pub port: Option<i32>,
    pub error_message: Option<String>,
}

#[derive(ToSchema)]
pub struct ConfigUpdateDoc {
    #[schema(value_type = Option<Object>)]
    pub config: Option<serde_json::Value>,
    pub port: Option<i32>,
    pub ssl_enabled: Option<bool>,
}

#[derive(ToSchema)]
pub struct JobDoc {
    pub id: Uuid,
    pub tag: String,
    pub kind: String,
    /// queued, running, succeeded or failed
    pub state: String,
    pub error: Option<String>,
    pub submitted_at: String,
    pub finished_at: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::protocols::list,
        crate::routes::protocols::get,
        crate::routes::protocols::status,
        crate::routes::protocols::install,
        crate::routes::protocols::uninstall,
        crate::routes::protocols::start,
        crate::routes::protocols::stop,
        crate::routes::protocols::restart,
        crate::routes::protocols::update_config,
        crate::routes::jobs::get,
    ),
    components(
        schemas(
            HealthResponse,
            ProtocolDoc,
            StatusDoc,
            ConfigUpdateDoc,
            JobDoc,
        )
    ),
    tags(
        (name = "health"),
        (name = "protocols"),
        (name = "jobs")
    )
)]
pub struct ApiDoc;
