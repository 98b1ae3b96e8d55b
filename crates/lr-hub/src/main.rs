use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lr_core::MaintenanceMode;
use lr_store::LogStore;

mod api;
mod auth;
mod otlp;
mod vacuum;

use api::{problem, ApiResult};

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "lr-hub", version = "0.1.0", about = "LOGNROLL log hub")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:4318")]
    bind: String,

    /// Path to the SQLite database
    #[arg(long, default_value = "lognroll.db")]
    database: PathBuf,

    /// Path to config file
    #[arg(long, default_value = "lognroll.toml")]
    config: PathBuf,
}

// =============================================================================
// Config
// =============================================================================

#[derive(Deserialize, Default, Clone)]
struct Config {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    search: SearchConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    auth: auth::AuthConfig,
}

#[derive(Deserialize, Clone)]
struct ServerConfig {
    #[serde(default = "default_ui_dir")]
    ui_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ui_dir: default_ui_dir(),
        }
    }
}

#[derive(Deserialize, Clone)]
struct SearchConfig {
    #[serde(default = "default_page_size")]
    default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    max_page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl SearchConfig {
    /// Requested page size, defaulted and capped. Zero means the cap.
    fn page_size(&self, requested: Option<usize>) -> usize {
        let max = self.max_page_size.max(1);
        match requested.unwrap_or(self.default_page_size) {
            0 => max,
            n => n.min(max),
        }
    }
}

#[derive(Deserialize, Default, Clone)]
struct StoreConfig {
    /// Logs older than this are removed by vacuum.
    #[serde(default)]
    retention_days: Option<u64>,
}

impl StoreConfig {
    fn retention(&self) -> Option<Duration> {
        self.retention_days
            .map(|days| Duration::from_secs(days.saturating_mul(24 * 60 * 60)))
    }
}

fn default_ui_dir() -> PathBuf {
    PathBuf::from("ui/dist")
}
fn default_page_size() -> usize {
    30
}
fn default_max_page_size() -> usize {
    1000
}

fn load_config(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(path).map(|content| toml::from_str::<Config>(&content)) {
        Ok(Ok(config)) => config,
        Ok(Err(e)) => {
            tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
            Config::default()
        }
        Err(e) => {
            tracing::warn!("Cannot read config {:?}: {}", path, e);
            Config::default()
        }
    }
}

// =============================================================================
// Application State
// =============================================================================

struct AppState {
    store: Arc<LogStore>,
    maintenance: Arc<MaintenanceMode>,
    auth_layer: Arc<auth::AuthLayer>,
    config: Config,
}

fn app(state: Arc<AppState>) -> Router {
    let ui_dir = state.config.server.ui_dir.clone();

    Router::new()
        .route("/v1/logs", post(api::ingest_logs))
        .route("/api/logs", get(api::search_logs).delete(api::delete_logs))
        .route("/api/logs/count", get(api::count_logs))
        .route("/api/logs/volumes", get(api::log_volumes))
        .route("/api/logs/vacuum", post(api::start_vacuum))
        .route("/api/maintenance", get(api::maintenance_status))
        .route("/api/maintenance/enable", post(api::enable_maintenance))
        .route("/api/maintenance/disable", post(api::disable_maintenance))
        // Layers wrap the routes above only; the UI fallback stays public.
        // The last layer added runs first: auth, then the maintenance gate.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            maintenance_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .fallback_service(ServeDir::new(ui_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "lr_hub=info,lr_store=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = load_config(&args.config);

    let store = match LogStore::open(&args.database) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open database at {:?}: {}", args.database, e);
            std::process::exit(1);
        }
    };

    let auth_layer = Arc::new(auth::AuthLayer::from_config(&config.auth));
    if !auth_layer.is_enabled() {
        tracing::warn!("No API tokens configured, authentication is disabled");
    }

    let state = Arc::new(AppState {
        store,
        maintenance: Arc::new(MaintenanceMode::new()),
        auth_layer,
        config,
    });

    let addr: SocketAddr = match args.bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {}", args.bind, e);
            std::process::exit(1);
        }
    };

    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  📜 LOGNROLL v0.1.0");
    tracing::info!("  UI:         http://{}", addr);
    tracing::info!("  Search API: http://{}/api/logs", addr);
    tracing::info!("  OTLP:       http://{}/v1/logs", addr);
    tracing::info!("  Database:   {:?}", args.database);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app(state)).await {
        tracing::error!("Server error: {}", e);
    }
}

// =============================================================================
// Middleware
// =============================================================================

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> ApiResult<Response> {
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    let scope = match auth::required_scope(&path, &method) {
        Some(scope) if state.auth_layer.is_enabled() && method != Method::OPTIONS => scope,
        _ => return Ok(next.run(req).await),
    };

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok());

    match auth_header.and_then(|header| header.strip_prefix("Bearer ")) {
        Some(token) => match state.auth_layer.validate_token(token) {
            Some(key) if state.auth_layer.has_scope(key, scope) => Ok(next.run(req).await),
            Some(key) => {
                tracing::warn!("Insufficient scope for {} {} (key '{}')", method, path, key.label);
                Err(problem(StatusCode::FORBIDDEN, "Insufficient scope"))
            }
            None => {
                tracing::warn!("Invalid API key for {}", path);
                Err(problem(StatusCode::UNAUTHORIZED, "Invalid API key"))
            }
        },
        None => {
            tracing::warn!("Missing Authorization header for {}", path);
            Err(problem(StatusCode::UNAUTHORIZED, "Missing bearer token"))
        }
    }
}

async fn maintenance_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> ApiResult<Response> {
    if state.maintenance.blocks(req.uri().path()) {
        return Err(problem(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service is under maintenance",
        ));
    }
    Ok(next.run(req).await)
}
