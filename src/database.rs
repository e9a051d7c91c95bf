//! SQLite connection pool, schema bootstrap and user provisioning

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::User;

const CREATE_USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
"#;

const CREATE_ANALYSES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS analyses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        model TEXT NOT NULL,
        output_format TEXT NOT NULL,
        schema TEXT,
        prompt_chars INTEGER,
        input_preview TEXT,
        response_preview TEXT
    )
"#;

/// Format used for every stored timestamp: ISO-8601 UTC, second precision, trailing `Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Current time in the stored textual form.
pub fn utc_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (and create if missing) the database file behind a small pool.
    ///
    /// Connections are checked out per query and returned immediately.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        info!("SQLite pool opened at {}", config.path.display());

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `users` and `analyses` tables when missing.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_USERS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_ANALYSES_TABLE).execute(&self.pool).await?;
        debug!("Database schema ensured");
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                error!("Database health check failed: {}", e);
                false
            }
        }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, role, is_active, created_at \
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Insert a new user row. The password must already be hashed.
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
        is_active: bool,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, role, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .bind(is_active)
        .bind(utc_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::UserExists(username.to_string())
            }
            other => StoreError::Database(other),
        })?;

        info!("Created user {} with role {}", username, role);
        Ok(result.last_insert_rowid())
    }

    /// Enable or disable an account. Returns whether a row was updated.
    pub async fn set_user_active(&self, username: &str, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE username = ?")
            .bind(active)
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
