//! AI Security Analyst Assistant
//!
//! JWT-protected analysis service: an analyst logs in, submits security logs,
//! access records or policy text, and receives a structured (JSON) or
//! narrative (Markdown) assessment produced by a text-generation backend.
//! Each completed analysis leaves a truncated audit row in SQLite.
//!
//! # Modules
//!
//! - `auth`: token issuing/verification, login and refresh, bearer extractor
//! - `analysis`: prompt assembly, generation client, audit sink, orchestrator
//! - `config`: TOML/env configuration and validation
//! - `database`: SQLite pool, schema bootstrap, user provisioning
//! - `error`: subsystem error enums and the HTTP `ApiError`
//! - `handlers`: application state and router
//! - `models`: request/response and user records

pub mod analysis;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;

pub use analysis::{try_parse_json, AnalysisOrchestrator};
pub use auth::{AuthService, JwtAuth, TokenPair, TokenService, TokenType};
pub use config::Config;
pub use database::DatabaseManager;
pub use error::{AnalysisError, ApiError, AuthError, GenerationError, StoreError};
pub use handlers::{create_router, AppState};
pub use models::{AnalyzeRequest, OutputFormat};
