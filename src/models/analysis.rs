//! Analysis request and response shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Time window used in the instruction when the caller gives none.
pub const DEFAULT_TIME_WINDOW: &str = "Not specified";

/// Input kinds assumed when the caller gives none.
pub const DEFAULT_INPUTS: [InputKind; 3] = [
    InputKind::Logs,
    InputKind::AccessRecords,
    InputKind::PolicyText,
];

/// Requested output format of the analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "markdown",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured report schema the backend is asked to follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSchema {
    #[default]
    RiskAssessment,
    EventSummary,
    PolicyAlignment,
}

impl AnalysisSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSchema::RiskAssessment => "risk_assessment",
            AnalysisSchema::EventSummary => "event_summary",
            AnalysisSchema::PolicyAlignment => "policy_alignment",
        }
    }
}

impl fmt::Display for AnalysisSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of material contained in the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Logs,
    AccessRecords,
    PolicyText,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Logs => "logs",
            InputKind::AccessRecords => "access_records",
            InputKind::PolicyText => "policy_text",
        }
    }
}

/// Analysis request as accepted at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Security logs, access records and/or policy text
    pub input_text: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub schema: AnalysisSchema,
    /// ISO8601 range or descriptive window
    #[serde(default)]
    pub time_window: Option<String>,
    #[serde(default)]
    pub inputs: Option<Vec<InputKind>>,
}

impl AnalyzeRequest {
    pub fn new(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            output_format: OutputFormat::default(),
            schema: AnalysisSchema::default(),
            time_window: None,
            inputs: None,
        }
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn with_schema(mut self, schema: AnalysisSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_time_window(mut self, time_window: impl Into<String>) -> Self {
        self.time_window = Some(time_window.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<InputKind>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    /// Boundary-level shape check.
    pub fn validate(&self) -> Result<(), String> {
        if self.input_text.trim().is_empty() {
            return Err("input_text must not be empty".to_string());
        }
        Ok(())
    }

    /// Time window, or the "Not specified" literal when absent or blank.
    pub fn effective_time_window(&self) -> &str {
        match self.time_window.as_deref().map(str::trim) {
            Some(window) if !window.is_empty() => window,
            _ => DEFAULT_TIME_WINDOW,
        }
    }

    /// Input kinds in caller order with duplicates dropped, or the defaults.
    pub fn effective_inputs(&self) -> Vec<InputKind> {
        match &self.inputs {
            Some(inputs) if !inputs.is_empty() => {
                let mut seen = Vec::with_capacity(inputs.len());
                for kind in inputs {
                    if !seen.contains(kind) {
                        seen.push(*kind);
                    }
                }
                seen
            }
            _ => DEFAULT_INPUTS.to_vec(),
        }
    }

    /// Schema recorded in the audit trail; markdown reports carry none.
    pub fn audit_schema(&self) -> Option<AnalysisSchema> {
        match self.output_format {
            OutputFormat::Json => Some(self.schema),
            OutputFormat::Markdown => None,
        }
    }
}

/// Response body for `output_format = json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeJsonResponse {
    pub data: Map<String, Value>,
}

/// Response body for `output_format = markdown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeMarkdownResponse {
    pub markdown: String,
}
