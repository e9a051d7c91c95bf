//! Analysis pipeline: load instruction, assemble prompt, call the backend,
//! record the audit row, hand back raw text.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::audit::{self, AuditRecord, AuditSink};
use super::generation::{ChatMessage, GenerationClient};
use super::prompt::{AssembledPrompt, PromptStore};
use crate::error::AnalysisError;
use crate::models::AnalyzeRequest;

/// Characters of raw backend text echoed in a parse diagnostic.
const RAW_DIAGNOSTIC_CHARS: usize = 500;

#[derive(Clone)]
pub struct AnalysisOrchestrator {
    prompts: Arc<dyn PromptStore>,
    client: Arc<dyn GenerationClient>,
    audit: Arc<dyn AuditSink>,
    deadline: Duration,
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("model", &self.client.model())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl AnalysisOrchestrator {
    pub fn new(
        prompts: Arc<dyn PromptStore>,
        client: Arc<dyn GenerationClient>,
        audit: Arc<dyn AuditSink>,
        deadline: Duration,
    ) -> Self {
        Self {
            prompts,
            client,
            audit,
            deadline,
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn backend_available(&self) -> bool {
        self.client.is_available()
    }

    /// Run one analysis and return the assistant text untouched.
    ///
    /// An audit row is written only after a successful generation, and a
    /// failed audit write does not fail the call.
    pub async fn run(&self, request: &AnalyzeRequest) -> Result<String, AnalysisError> {
        let system_instruction = self.prompts.load().await?;
        let prompt = AssembledPrompt::new(system_instruction, request);

        let messages = [
            ChatMessage::system(prompt.system_instruction.as_str()),
            ChatMessage::user(prompt.user_instruction.as_str()),
        ];

        debug!(
            format = %request.output_format,
            schema = %request.schema,
            prompt_chars = prompt.char_count(),
            "Invoking generation backend"
        );

        let text = match tokio::time::timeout(self.deadline, self.client.invoke(&messages)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AnalysisError::BackendCallFailed(format!(
                    "no response within {}s",
                    self.deadline.as_secs()
                )))
            }
        };

        let record = AuditRecord::new(self.client.model(), request, prompt.char_count(), &text);
        audit::record(self.audit.as_ref(), &record).await;

        info!(
            format = %request.output_format,
            response_chars = text.chars().count(),
            "Analysis completed"
        );

        Ok(text)
    }
}

/// Parse assistant text as a JSON object.
///
/// On failure the error carries the parser message and the first 500
/// characters of the raw text.
pub fn try_parse_json(text: &str) -> Result<Map<String, Value>, String> {
    let raw: String = text.chars().take(RAW_DIAGNOSTIC_CHARS).collect();

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!(
            "Invalid JSON: expected an object, got {}. Raw: {}",
            json_kind(&other),
            raw
        )),
        Err(e) => Err(format!("Invalid JSON: {}. Raw: {}", e, raw)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
