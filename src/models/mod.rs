//! Domain models shared by the credential and analysis subsystems

pub mod analysis;
pub mod user;

pub use analysis::{
    AnalysisSchema, AnalyzeJsonResponse, AnalyzeMarkdownResponse, AnalyzeRequest, InputKind,
    OutputFormat, DEFAULT_INPUTS, DEFAULT_TIME_WINDOW,
};
pub use user::{AuthenticatedUser, User};
