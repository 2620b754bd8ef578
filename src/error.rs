//! Error taxonomy for task analysis.
//!
//! Only [`AnalysisError::Config`] and [`AnalysisError::BackendUnavailable`] ever reach a
//! caller, and only from analyzer construction. The other variants are
//! produced below the orchestrator boundary and turned into safe defaults or `error`
//! events before anything is returned.

use crate::analysis::events::AnalysisStep;
use crate::config::ConfigError;
use crate::analysis::schema::SchemaError;
use crate::llm::{LlmError, SelectionAttempt};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The configuration handed to the analyzer failed validation.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// No text-generation backend could be initialized.
    #[error("No LLM backend available: {}", describe_attempts(.attempts))]
    BackendUnavailable { attempts: Vec<SelectionAttempt> },

    /// The backend raised or timed out.
    #[error("{0}")]
    Generation(#[from] LlmError),

    /// The backend answered, but not with content matching the schema.
    #[error("{0}")]
    Validation(#[from] SchemaError),

    /// A stream phase failed outside the executor's own recovery.
    #[error("{step} step failed: {message}")]
    Stream { step: AnalysisStep, message: String },
}

impl AnalysisError {
    /// Short label distinguishing an unreachable model from one that returned garbage.
    pub fn failure_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::Generation(_) => "generation",
            Self::Validation(_) => "validation",
            Self::Stream { .. } => "stream",
        }
    }
}

fn describe_attempts(attempts: &[SelectionAttempt]) -> String {
    if attempts.is_empty() {
        return "no providers tried".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
