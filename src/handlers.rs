//! HTTP boundary: shared state, router and handlers

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::analysis::{
    client_from_config, try_parse_json, AnalysisOrchestrator, FilePromptStore, PromptStore,
    SqliteAuditSink,
};
use crate::auth::{AuthService, JwtAuth, LoginRequest, RefreshRequest, TokenPair, TokenService};
use crate::config::{Config, ALLOWED_MODELS};
use crate::database::DatabaseManager;
use crate::error::{AnalysisError, ApiError};
use crate::models::{AnalyzeJsonResponse, AnalyzeMarkdownResponse, AnalyzeRequest, OutputFormat};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseManager,
    pub auth: Arc<AuthService>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub prompts: Arc<dyn PromptStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: DatabaseManager,
        auth: Arc<AuthService>,
        orchestrator: Arc<AnalysisOrchestrator>,
        prompts: Arc<dyn PromptStore>,
    ) -> Self {
        Self {
            config,
            db,
            auth,
            orchestrator,
            prompts,
            started_at: Instant::now(),
        }
    }

    /// Wire the production collaborators: SQLite-backed credential store and
    /// audit sink, file prompt store, backend client picked from config.
    pub fn from_config(config: Arc<Config>, db: DatabaseManager) -> Self {
        let tokens = TokenService::new(&config.security);
        let auth = Arc::new(AuthService::new(tokens, Arc::new(db.clone())));

        let prompts: Arc<dyn PromptStore> = Arc::new(FilePromptStore::new(&config.prompt.path));
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            prompts.clone(),
            client_from_config(&config.generation),
            Arc::new(SqliteAuditSink::new(db.clone())),
            config.generation.timeout(),
        ));

        Self::new(config, db, auth, orchestrator, prompts)
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/diag", get(diag))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/analyze", post(analyze))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            // credentialed CORS cannot use a wildcard origin
            Ok(_) if origin == "*" => {
                warn!("Ignoring wildcard CORS origin; list origins explicitly");
                None
            }
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "AI Security Analyst Assistant",
        "status": "ok",
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub model: String,
    pub allowed_models: Vec<&'static str>,
    pub prompt_exists: bool,
    pub database: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.db.health_check().await {
        "ok"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        model: state.orchestrator.model().to_string(),
        allowed_models: ALLOWED_MODELS.to_vec(),
        prompt_exists: state.prompts.exists().await,
        database,
    })
}

/// Configuration diagnostics. Reports only whether a key is present.
async fn diag(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "model": state.orchestrator.model(),
        "api_key_present": state.orchestrator.backend_available(),
        "prompt_exists": state.prompts.exists().await,
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state.auth.login(&request.username, &request.password).await?;
    Ok(Json(pair))
}

async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state.auth.refresh(&request.refresh_token).await?;
    Ok(Json(pair))
}

async fn analyze(
    State(state): State<AppState>,
    auth: JwtAuth,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Response, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;

    info!(
        user = %auth.claims.sub,
        format = %request.output_format,
        schema = %request.schema,
        "Analysis requested"
    );

    let text = state.orchestrator.run(&request).await?;

    match request.output_format {
        OutputFormat::Json => {
            let data = try_parse_json(&text).map_err(|diagnostic| {
                debug!("Backend output rejected: {}", diagnostic);
                AnalysisError::MalformedGenerationOutput(diagnostic)
            })?;
            Ok(Json(AnalyzeJsonResponse { data }).into_response())
        }
        OutputFormat::Markdown => Ok(Json(AnalyzeMarkdownResponse { markdown: text }).into_response()),
    }
}
