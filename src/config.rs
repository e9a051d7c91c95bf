//! Configuration for the analyst service
//! Built once at startup from defaults, an optional TOML file and the environment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Signing secret used when none is supplied. Accepted only in development.
pub const DEFAULT_JWT_SECRET: &str = "dev-secret";

/// Fixed issuer stamped on every token.
pub const TOKEN_ISSUER: &str = "aisa.local";

/// Generation models this deployment is allowed to call.
pub const ALLOWED_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-5-search-api-2025-10-14",
    "gpt-audio-mini-2025-10-06",
];

/// Model used when the configured one is missing or not allowed.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Upper bound for either token lifetime: one year.
pub const MAX_TOKEN_MINUTES: i64 = 525_600;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// SQLite database configuration
    pub database: DatabaseConfig,
    /// Token signing configuration
    pub security: SecurityConfig,
    /// Generation backend configuration
    pub generation: GenerationConfig,
    /// Static system prompt location
    pub prompt: PromptConfig,
}

/// Deployment environment; decides whether insecure defaults are tolerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow::anyhow!("Unknown environment: {}", other)),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

/// SQLite database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: PathBuf,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,
}

/// Token signing configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC secret for token signatures
    pub jwt_secret: String,
    /// Access token lifetime in minutes
    pub access_token_minutes: i64,
    /// Refresh token lifetime in minutes
    pub refresh_token_minutes: i64,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_minutes", &self.refresh_token_minutes)
            .finish()
    }
}

/// Generation backend configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Backend API key; absent means the backend is unavailable
    pub api_key: Option<String>,
    /// Model identifier, constrained to `ALLOWED_MODELS`
    pub model: String,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Deadline for a single backend call in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Static system prompt location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Path of the system prompt file
    pub path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cors_origins = ["localhost", "127.0.0.1"]
            .iter()
            .flat_map(|host| {
                std::iter::once(format!("http://{}", host)).chain(
                    [8000, 3000, 5000, 8501]
                        .iter()
                        .map(move |port| format!("http://{}:{}", host, port)),
                )
            })
            .collect();

        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            environment: Environment::Development,
            cors_origins,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/app.db"),
            max_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_token_minutes: 60,
            refresh_token_minutes: 1440,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 60,
            temperature: 0.2,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("prompts/system_prompt.txt"),
        }
    }
}

impl SecurityConfig {
    /// Whether the insecure built-in secret is in use
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl GenerationConfig {
    /// Backend call deadline as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether a non-blank API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Restrict a requested model to the allow-list, falling back to the default.
pub fn resolve_model(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(model) if ALLOWED_MODELS.contains(&model) => model.to_string(),
        Some(model) => {
            warn!(
                "Model '{}' is not in the allow-list, falling back to {}",
                model, DEFAULT_MODEL
            );
            DEFAULT_MODEL.to_string()
        }
        None => DEFAULT_MODEL.to_string(),
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    /// The caller validates once all overrides are in place.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("ANALYST_SERVER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("ANALYST_SERVER_PORT") {
            self.server.port = port.parse().context("Invalid ANALYST_SERVER_PORT")?;
        }

        if let Some(env) = var("ANALYST_ENVIRONMENT") {
            self.server.environment = env.parse().context("Invalid ANALYST_ENVIRONMENT")?;
        }

        if let Some(origins) = var("ANALYST_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(path) = var("ANALYST_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = var("ANALYST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = max
                .parse()
                .context("Invalid ANALYST_DATABASE_MAX_CONNECTIONS")?;
        }

        if let Some(secret) = var("JWT_SECRET") {
            self.security.jwt_secret = secret;
        }

        if let Some(minutes) = var("JWT_ACCESS_MIN") {
            self.security.access_token_minutes =
                minutes.parse().context("Invalid JWT_ACCESS_MIN")?;
        }

        if let Some(minutes) = var("JWT_REFRESH_MIN") {
            self.security.refresh_token_minutes =
                minutes.parse().context("Invalid JWT_REFRESH_MIN")?;
        }

        if let Some(key) = var("OPENAI_API_KEY") {
            self.generation.api_key = Some(key);
        }

        if let Some(model) = var("OPENAI_MODEL") {
            self.generation.model = model;
        }

        if let Some(url) = var("OPENAI_BASE_URL") {
            self.generation.base_url = url;
        }

        if let Some(secs) = var("OPENAI_TIMEOUT_SECS") {
            self.generation.timeout_secs = secs.parse().context("Invalid OPENAI_TIMEOUT_SECS")?;
        }

        if let Some(path) = var("ANALYST_PROMPT_PATH") {
            self.prompt.path = PathBuf::from(path);
        }

        Ok(())
    }

    /// Validate configuration values and normalise the model identifier
    pub fn validate(&mut self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Database path cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("Database max_connections cannot be 0"));
        }

        if self.security.access_token_minutes <= 0 || self.security.refresh_token_minutes <= 0 {
            return Err(anyhow::anyhow!("Token lifetimes must be positive"));
        }

        if self.security.refresh_token_minutes > MAX_TOKEN_MINUTES {
            return Err(anyhow::anyhow!(
                "Token lifetimes cannot exceed {} minutes",
                MAX_TOKEN_MINUTES
            ));
        }

        if self.security.access_token_minutes >= self.security.refresh_token_minutes {
            return Err(anyhow::anyhow!(
                "Access token lifetime must be shorter than refresh token lifetime"
            ));
        }

        if self.generation.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Generation timeout cannot be 0"));
        }

        if self.server.environment == Environment::Production {
            if self.security.uses_default_secret() {
                return Err(anyhow::anyhow!(
                    "JWT_SECRET must be set explicitly in production"
                ));
            }
            if self.security.jwt_secret.len() < 32 {
                return Err(anyhow::anyhow!(
                    "JWT secret must be at least 32 characters long in production"
                ));
            }
        } else if self.security.uses_default_secret() {
            warn!("Using the built-in development JWT secret; set JWT_SECRET before deploying");
        }

        self.generation.model = resolve_model(Some(&self.generation.model));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::default();
        config.apply_vars(|key| map.get(key).cloned())?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = apply(&[]).unwrap();
        assert_eq!(config.security.access_token_minutes, 60);
        assert_eq!(config.security.refresh_token_minutes, 1440);
        assert_eq!(config.generation.model, DEFAULT_MODEL);
        assert!(config.security.uses_default_secret());
        assert!(!config.generation.has_api_key());
        assert!(config
            .server
            .cors_origins
            .contains(&"http://127.0.0.1:8501".to_string()));
    }

    #[test]
    fn test_env_overrides() {
        let config = apply(&[
            ("JWT_SECRET", "override-secret"),
            ("JWT_ACCESS_MIN", "15"),
            ("JWT_REFRESH_MIN", "120"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-5-search-api-2025-10-14"),
            ("ANALYST_CORS_ORIGINS", "http://a.example, http://b.example"),
        ])
        .unwrap();

        assert_eq!(config.security.jwt_secret, "override-secret");
        assert_eq!(config.security.access_token_minutes, 15);
        assert_eq!(config.security.refresh_token_minutes, 120);
        assert!(config.generation.has_api_key());
        assert_eq!(config.generation.model, "gpt-5-search-api-2025-10-14");
        assert_eq!(config.server.cors_origins.len(), 2);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let config = apply(&[("OPENAI_MODEL", "gpt-unknown")]).unwrap();
        assert_eq!(config.generation.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_number_rejected() {
        assert!(apply(&[("JWT_ACCESS_MIN", "sixty")]).is_err());
    }

    #[test]
    fn test_production_rejects_default_secret() {
        assert!(apply(&[("ANALYST_ENVIRONMENT", "production")]).is_err());
        assert!(apply(&[
            ("ANALYST_ENVIRONMENT", "production"),
            ("JWT_SECRET", "short"),
        ])
        .is_err());
        assert!(apply(&[
            ("ANALYST_ENVIRONMENT", "production"),
            ("JWT_SECRET", "a-production-secret-of-sufficient-length"),
        ])
        .is_ok());
    }

    #[test]
    fn test_lifetime_above_one_year_rejected() {
        assert!(apply(&[("JWT_REFRESH_MIN", "1000000000000")]).is_err());
        assert!(apply(&[("JWT_REFRESH_MIN", "525601")]).is_err());
        assert!(apply(&[("JWT_REFRESH_MIN", "525600")]).is_ok());
    }

    #[test]
    fn test_from_file_defers_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("analyst.toml");
        std::fs::write(&path, "[server]\nport = 0\n").unwrap();

        let mut config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 0);
        assert!(config.validate().is_err());

        config.server.port = 8080;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_access_must_be_shorter_than_refresh() {
        assert!(apply(&[("JWT_ACCESS_MIN", "2000")]).is_err());
    }

    #[test]
    fn test_toml_sections_default() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [generation]
            model = "gpt-audio-mini-2025-10-06"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.generation.model, "gpt-audio-mini-2025-10-06");
        assert_eq!(config.security.refresh_token_minutes, 1440);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.generation.api_key = Some("sk-very-secret".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains(DEFAULT_JWT_SECRET));
    }
}
