//! Static system instruction and per-request user instruction

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::AnalysisError;
use crate::models::{AnalyzeRequest, InputKind, OutputFormat};

/// Source of the static system instruction. Content is opaque text.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn load(&self) -> Result<String, AnalysisError>;

    /// Whether the instruction source is currently present.
    async fn exists(&self) -> bool;
}

/// System instruction read from a file on every request, so edits take
/// effect without a restart.
#[derive(Debug, Clone)]
pub struct FilePromptStore {
    path: PathBuf,
}

impl FilePromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PromptStore for FilePromptStore {
    async fn load(&self) -> Result<String, AnalysisError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AnalysisError::PromptUnavailable(format!("{}: {}", self.path.display(), e))
        })
    }

    async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}

/// System and user instruction pair sent to the backend. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub system_instruction: String,
    pub user_instruction: String,
}

impl AssembledPrompt {
    pub fn new(system_instruction: String, request: &AnalyzeRequest) -> Self {
        Self {
            system_instruction,
            user_instruction: build_user_instruction(request),
        }
    }

    /// Combined length in characters, as recorded in the audit trail.
    pub fn char_count(&self) -> usize {
        self.system_instruction.chars().count() + self.user_instruction.chars().count()
    }
}

/// Build the user instruction for `request`.
///
/// Deterministic; `input_text` is embedded verbatim.
pub fn build_user_instruction(request: &AnalyzeRequest) -> String {
    let time_window = request.effective_time_window();
    let inputs = render_inputs(&request.effective_inputs());

    match request.output_format {
        OutputFormat::Json => format!(
            "Produce a {} JSON object strictly following the system JSON schema. \
             Context time_window: {}. Inputs: {}. \
             Analyze the following content:\n\n{}",
            request.schema, time_window, inputs, request.input_text
        ),
        OutputFormat::Markdown => format!(
            "Produce a Markdown report using the system Markdown template. \
             Context time_window: {}. Inputs: {}. \
             Analyze the following content:\n\n{}",
            time_window, inputs, request.input_text
        ),
    }
}

fn render_inputs(inputs: &[InputKind]) -> String {
    let quoted: Vec<String> = inputs
        .iter()
        .map(|kind| format!("\"{}\"", kind.as_str()))
        .collect();
    format!("[{}]", quoted.join(", "))
}
