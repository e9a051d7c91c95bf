#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use security_analyst::analysis::{
    AnalysisOrchestrator, AuditRecord, AuditSink, ChatMessage, GenerationClient, PromptStore,
    SqliteAuditSink,
};
use security_analyst::auth::{AuthService, TokenPair, TokenService};
use security_analyst::config::{Config, DatabaseConfig};
use security_analyst::database::DatabaseManager;
use security_analyst::error::{AnalysisError, GenerationError, StoreError};
use security_analyst::handlers::{create_router, AppState};

pub const SYSTEM_PROMPT: &str = "You are a senior security analyst.";
pub const USERNAME: &str = "realuser";
pub const PASSWORD: &str = "correct horse battery";

/// What the stub backend answers.
#[derive(Clone)]
pub enum StubReply {
    Text(String),
    Fail,
    Unavailable,
}

/// Deterministic generation backend.
pub struct StubGenerationClient {
    reply: StubReply,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl StubGenerationClient {
    pub fn new(reply: StubReply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(StubReply::Text(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for StubGenerationClient {
    fn model(&self) -> &str {
        "gpt-3.5-turbo"
    }

    fn is_available(&self) -> bool {
        !matches!(self.reply, StubReply::Unavailable)
    }

    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        match &self.reply {
            StubReply::Text(text) => Ok(text.clone()),
            StubReply::Fail => Err(GenerationError::CallFailed("connection reset by peer".into())),
            StubReply::Unavailable => Err(GenerationError::Unavailable("no API key".into())),
        }
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    pub records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn write(&self, _record: &AuditRecord) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "audit store offline",
        )))
    }
}

pub struct StaticPromptStore(pub Option<String>);

impl StaticPromptStore {
    pub fn present() -> Self {
        Self(Some(SYSTEM_PROMPT.to_string()))
    }

    pub fn missing() -> Self {
        Self(None)
    }
}

#[async_trait]
impl PromptStore for StaticPromptStore {
    async fn load(&self) -> Result<String, AnalysisError> {
        self.0
            .clone()
            .ok_or_else(|| AnalysisError::PromptUnavailable("prompt not found".into()))
    }

    async fn exists(&self) -> bool {
        self.0.is_some()
    }
}

/// Temp-directory SQLite database with the schema in place.
pub async fn temp_database() -> (TempDir, DatabaseManager) {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("app.db"),
        ..DatabaseConfig::default()
    };
    let db = DatabaseManager::connect(&config).await.unwrap();
    db.init_schema().await.unwrap();
    (dir, db)
}

pub struct TestApp {
    _dir: TempDir,
    pub db: DatabaseManager,
    pub state: AppState,
    pub router: Router,
    pub client: Arc<StubGenerationClient>,
}

pub struct TestAppBuilder {
    client: StubGenerationClient,
    prompts: StaticPromptStore,
    audit: Option<Arc<dyn AuditSink>>,
}

impl TestAppBuilder {
    pub fn new(client: StubGenerationClient) -> Self {
        Self {
            client,
            prompts: StaticPromptStore::present(),
            audit: None,
        }
    }

    pub fn prompts(mut self, prompts: StaticPromptStore) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the app with one active and one inactive user provisioned.
    /// Without an explicit sink, audits go to the SQLite `analyses` table.
    pub async fn build(self) -> TestApp {
        let (dir, db) = temp_database().await;
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        db.create_user(USERNAME, &hash, "admin", true).await.unwrap();
        db.create_user("dormant", &hash, "analyst", false).await.unwrap();

        let config = Arc::new(Config::default());
        let tokens = TokenService::new(&config.security);
        let auth = Arc::new(AuthService::new(tokens, Arc::new(db.clone())));

        let client = Arc::new(self.client);
        let prompts: Arc<dyn PromptStore> = Arc::new(self.prompts);
        let audit: Arc<dyn AuditSink> = match self.audit {
            Some(audit) => audit,
            None => Arc::new(SqliteAuditSink::new(db.clone())),
        };
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            prompts.clone(),
            client.clone(),
            audit,
            Duration::from_secs(5),
        ));

        let state = AppState::new(config, db.clone(), auth, orchestrator, prompts);
        let router = create_router(state.clone());

        TestApp {
            _dir: dir,
            db,
            state,
            router,
            client,
        }
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), None).await
    }

    pub async fn post_authed(&self, uri: &str, body: Value, token: &str) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), Some(token)).await
    }

    pub async fn login(&self) -> TokenPair {
        let (status, body) = self
            .post(
                "/auth/login",
                serde_json::json!({"username": USERNAME, "password": PASSWORD}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        serde_json::from_value(body).unwrap()
    }

    pub async fn audit_rows(&self) -> Vec<AuditRecord> {
        SqliteAuditSink::new(self.db.clone()).recent(100).await.unwrap()
    }
}
