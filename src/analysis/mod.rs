//! Analysis pipeline
//!
//! - `prompt`: static system instruction and per-request user instruction
//! - `generation`: text-generation backend clients
//! - `audit`: best-effort audit trail of completed analyses
//! - `orchestrator`: the pipeline itself and the JSON parse helper

pub mod audit;
pub mod generation;
pub mod orchestrator;
pub mod prompt;

pub use audit::{AuditRecord, AuditSink, SqliteAuditSink};
pub use generation::{
    client_from_config, ChatMessage, GenerationClient, OpenAiClient, Role, UnavailableClient,
};
pub use orchestrator::{try_parse_json, AnalysisOrchestrator};
pub use prompt::{build_user_instruction, AssembledPrompt, FilePromptStore, PromptStore};
