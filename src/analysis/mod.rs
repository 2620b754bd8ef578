//! Task analysis: output schemas, request execution, orchestration and progress events.

pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod record;
pub mod schema;

pub use events::{sse_frames, AnalysisEvent, AnalysisStep, EventData, EventType};
pub use executor::{build_prompt, AnalysisPayload, Executor};
pub use orchestrator::{TaskAnalysis, TaskAnalyzer};
pub use record::{AnalysisRecord, MemorySink, NullSink, RecordSink, SharedRecordSink, TracingSink};
pub use schema::{
    extract_json, parse_output, AnalysisKind, ClassificationResult, Priority, SchemaError,
    StructuredOutput, SubtaskList, SubtaskSuggestion, TaskCategory,
};
