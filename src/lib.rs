//! # Task Analyst
//!
//! LLM-backed task analysis: classify a task into a category and priority, and break it
//! down into ordered subtasks.
//!
//! ## Architecture
//!
//! ```text
//!   AnalyzerConfig ──► select_backend ──► ModelBackend (Ollama │ Anthropic │ OpenAI)
//!                                               │
//!                                               ▼
//!   TaskAnalyzer ──► Executor ──► prompt ─► generate ─► parse + validate ─► result
//!        │                                                   │ on failure
//!        │                                                   ▼
//!        │                                             safe default
//!        ▼
//!   analyze (TaskAnalysis) │ analyze_stream (AnalysisEvent ─► SSE frames)
//! ```
//!
//! ## Modules
//! - `llm`: text-generation backends and backend selection
//! - `analysis`: schemas, request execution, orchestration, progress events
//! - `task`: tasks and subtasks that analysis results are applied to
//! - `config`: analyzer configuration from a JSON file or the environment

pub mod analysis;
pub mod config;
pub mod error;
pub mod llm;
pub mod task;

pub use analysis::{AnalysisEvent, TaskAnalysis, TaskAnalyzer};
pub use config::AnalyzerConfig;
pub use error::AnalysisError;
pub use task::{Task, TaskStore};
