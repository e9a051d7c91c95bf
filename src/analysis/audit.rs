//! Append-only audit trail of completed analyses

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::database::{utc_timestamp, DatabaseManager};
use crate::error::StoreError;
use crate::models::AnalyzeRequest;

pub const INPUT_PREVIEW_CHARS: usize = 500;
pub const RESPONSE_PREVIEW_CHARS: usize = 1000;

/// One row of the `analyses` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub created_at: String,
    pub model: String,
    pub output_format: String,
    pub schema: Option<String>,
    pub prompt_chars: i64,
    pub input_preview: String,
    pub response_preview: String,
}

impl AuditRecord {
    /// Build the record for a successful generation, truncating both
    /// previews by character count.
    pub fn new(model: &str, request: &AnalyzeRequest, prompt_chars: usize, response: &str) -> Self {
        Self {
            created_at: utc_timestamp(),
            model: model.to_string(),
            output_format: request.output_format.to_string(),
            schema: request.audit_schema().map(|s| s.to_string()),
            prompt_chars: i64::try_from(prompt_chars).unwrap_or(i64::MAX),
            input_preview: preview(&request.input_text, INPUT_PREVIEW_CHARS),
            response_preview: preview(response, RESPONSE_PREVIEW_CHARS),
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

/// Write `record`, logging and discarding any failure.
///
/// An analysis that already produced text is returned to the caller even
/// when the audit row could not be stored.
pub async fn record(sink: &dyn AuditSink, record: &AuditRecord) {
    if let Err(e) = sink.write(record).await {
        warn!("Failed to write audit record: {}", e);
    }
}

#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    db: DatabaseManager,
}

impl SqliteAuditSink {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    /// Most recent records first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRecord>(
            "SELECT created_at, model, output_format, schema, prompt_chars, \
             input_preview, response_preview \
             FROM analyses ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO analyses \
             (created_at, model, output_format, schema, prompt_chars, input_preview, response_preview) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.created_at)
        .bind(&record.model)
        .bind(&record.output_format)
        .bind(&record.schema)
        .bind(record.prompt_chars)
        .bind(&record.input_preview)
        .bind(&record.response_preview)
        .execute(self.db.pool())
        .await?;

        debug!("Audit record stored ({} format)", record.output_format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::{AnalysisSchema, OutputFormat};
    use tempfile::TempDir;

    async fn sink() -> (TempDir, SqliteAuditSink) {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("audit.db"),
            ..DatabaseConfig::default()
        };
        let db = DatabaseManager::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (dir, SqliteAuditSink::new(db))
    }

    #[test]
    fn test_long_input_preview_is_first_500_chars() {
        let input = "a".repeat(10_000);
        let req = AnalyzeRequest::new(input.clone());
        let rec = AuditRecord::new("gpt-3.5-turbo", &req, 10, "ok");

        assert_eq!(rec.input_preview.chars().count(), 500);
        assert_eq!(rec.input_preview, input[..500]);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let response = "ü".repeat(1_500);
        let req = AnalyzeRequest::new("x");
        let rec = AuditRecord::new("m", &req, 1, &response);
        assert_eq!(rec.response_preview.chars().count(), 1_000);
    }

    #[test]
    fn test_markdown_records_no_schema() {
        let req = AnalyzeRequest::new("x")
            .with_output_format(OutputFormat::Markdown)
            .with_schema(AnalysisSchema::EventSummary);
        let rec = AuditRecord::new("m", &req, 1, "# Report");
        assert_eq!(rec.output_format, "markdown");
        assert_eq!(rec.schema, None);

        let rec = AuditRecord::new("m", &AnalyzeRequest::new("x"), 1, "{}");
        assert_eq!(rec.schema.as_deref(), Some("risk_assessment"));
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let (_dir, sink) = sink().await;
        let req = AnalyzeRequest::new("failed login from 10.0.0.1");
        let rec = AuditRecord::new("gpt-3.5-turbo", &req, 1234, r#"{"risk":"high"}"#);

        sink.write(&rec).await.unwrap();
        sink.write(&rec).await.unwrap();

        let rows = sink.recent(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], rec);
        assert_eq!(rows[0].prompt_chars, 1234);
    }

    #[tokio::test]
    async fn test_record_swallows_failures() {
        let (_dir, sink) = sink().await;
        sqlx::query("DROP TABLE analyses")
            .execute(sink.db.pool())
            .await
            .unwrap();

        let rec = AuditRecord::new("m", &AnalyzeRequest::new("x"), 1, "y");
        assert!(sink.write(&rec).await.is_err());
        record(&sink, &rec).await;
    }
}
