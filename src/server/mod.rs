//! REST API server for funnel analysis

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use handlers::{ParseRequest, ParseResponse};
pub use routes::create_router;
pub use state::AppState;

use crate::analysis::RuleTable;
use crate::engine::{AnalysisEngine, EngineConfig};
use crate::error::ConfigError;
use crate::runner::TraversalLimits;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: "127.0.0.1")
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Rule table file; the embedded table is used when unset
    pub rules_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            rules_path: None,
            engine: EngineConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Creates a new server configuration
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerConfig {
            host: host.into(),
            port,
            ..ServerConfig::default()
        }
    }

    /// Reads `HOST`, `PORT`, `ANALYSIS_RULES`, `MAX_TRAVERSAL_STEPS`,
    /// `MAX_TRAVERSAL_MS` and `MAX_SCENARIO_WORKERS`, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();
        let limits = defaults.engine.limits;
        ServerConfig {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            rules_path: std::env::var("ANALYSIS_RULES").ok().map(PathBuf::from),
            engine: EngineConfig {
                limits: TraversalLimits::new(
                    env_or("MAX_TRAVERSAL_STEPS", limits.max_steps),
                    Duration::from_millis(env_or(
                        "MAX_TRAVERSAL_MS",
                        limits.max_duration.as_millis() as u64,
                    )),
                ),
                max_workers: env_or("MAX_SCENARIO_WORKERS", defaults.engine.max_workers),
                ..defaults.engine
            },
        }
    }

    /// Loads the rule table and builds the engine.
    pub fn build_engine(&self) -> Result<AnalysisEngine, ConfigError> {
        let rules = match &self.rules_path {
            Some(path) => RuleTable::from_path(path)?,
            None => RuleTable::embedded()?,
        };
        AnalysisEngine::new(rules, self.engine)
    }
}

/// Runs the API server
///
/// # Arguments
/// * `config` - Server configuration
///
/// # Returns
/// Returns an error if the rule table is invalid, the server fails to start
/// or encounters a fatal error
///
/// # Example
/// ```rust,no_run
/// use funnel_analytics::server::{run_server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     run_server(ServerConfig::from_env()).await?;
///     Ok(())
/// }
/// ```
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls levels; info by default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();

    let engine = config.build_engine()?;
    tracing::info!(
        rules = engine.rules().rules.len(),
        max_steps = config.engine.limits.max_steps,
        max_workers = config.engine.max_workers,
        "Analysis engine ready"
    );

    let state = Arc::new(AppState::new(engine));
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
