use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use common::utils::logging::{init_logging_default, init_logging_json};
use configs::AppConfig;
use installers::{Executor, InstallerContext, InstallerRegistry, SystemExecutor};
use service::jobs::JobPool;
use service::lifecycle::LifecycleOrchestrator;
use service::protocol::{ProtocolRepository, SeaOrmProtocolRepository};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::routes;

/// Directory for the default SQLite database and other local state.
const DATA_DIR: &str = "data";

pub type Orchestrator = LifecycleOrchestrator<SeaOrmProtocolRepository>;

#[derive(Clone)]
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    /// Required in `X-API-Key` on mutating routes when set.
    pub admin_key: Option<Arc<str>>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, admin_key: Option<String>) -> Self {
        Self { orchestrator, admin_key: admin_key.map(Arc::from) }
    }
}

/// `LOG_FORMAT=json` switches to JSON lines; otherwise compact text.
pub fn init_logging() {
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => init_logging_json(),
        _ => init_logging_default(),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// Connect and migrate the database, seed the catalog, recover interrupted jobs and wire
/// the orchestrator around `registry`.
pub async fn build_state(cfg: &AppConfig, registry: InstallerRegistry) -> anyhow::Result<ServerState> {
    let db = models::db::connect_with_config(&cfg.database).await?;
    models::db::migrate(&db).await?;

    let repo = Arc::new(SeaOrmProtocolRepository::new(db));
    let seeded = repo.seed_defaults().await?;
    info!(seeded, "protocol catalog ready");

    let jobs = JobPool::from_config(&cfg.lifecycle);
    let orchestrator = Arc::new(LifecycleOrchestrator::new(repo, Arc::new(registry), jobs));
    let recovered = orchestrator.recover_interrupted().await?;
    if recovered > 0 {
        warn!(recovered, "protocols left mid-operation by a previous run were marked as error");
    }

    if cfg.admin.api_key.is_none() {
        warn!("no admin api key configured; mutating routes are open");
    }
    Ok(ServerState::new(orchestrator, cfg.admin.api_key.clone()))
}

/// Public entry: build the app and run the HTTP server. Expects `.env` loaded and
/// logging initialised by the caller.
pub async fn run() -> anyhow::Result<()> {
    let cfg = AppConfig::load_or_default()?;
    common::env::ensure_env(DATA_DIR, &cfg.storage.base_path).await?;

    let executor = Arc::new(SystemExecutor::new(cfg.lifecycle.command_timeout()));
    info!(executor = executor.name(), "host executor ready");
    let ctx = InstallerContext::new(executor, Arc::new(cfg.storage.clone()), &cfg.lifecycle);
    let registry = InstallerRegistry::with_defaults(ctx);
    info!(installers = ?registry.names(), "installer registry ready");

    let state = build_state(&cfg, registry).await?;
    let app: Router = routes::build_router(state, build_cors());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, "starting file server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
