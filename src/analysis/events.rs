//! Progress events emitted while an analysis streams, and their text-event-stream framing.
//!
//! Each event is framed as
//!
//! ```text
//! event: <type>
//! data: <JSON-encoded event>
//!
//! ```
//!
//! The transport around the frames (no-cache headers, disabled proxy buffering) belongs to
//! whoever serves them.

use std::fmt;

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::orchestrator::TaskAnalysis;
use super::schema::{ClassificationResult, StructuredOutput, SubtaskList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Start,
    Progress,
    Error,
    Complete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Progress => "progress",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStep {
    Initialization,
    Classification,
    Subtasks,
    Done,
}

impl AnalysisStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::Classification => "classification",
            Self::Subtasks => "subtasks",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload attached to progress and completion events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Complete(TaskAnalysis),
    Classification(ClassificationResult),
    Subtasks(SubtaskList),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub message: String,
    pub step: AnalysisStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
}

impl AnalysisEvent {
    fn new(event_type: EventType, step: AnalysisStep, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            step,
            data: None,
        }
    }

    fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn start() -> Self {
        Self::new(
            EventType::Start,
            AnalysisStep::Initialization,
            "Starting AI analysis...",
        )
    }

    /// Announces that a step is beginning.
    pub fn announce(step: AnalysisStep) -> Self {
        let message = match step {
            AnalysisStep::Classification => "Analyzing task category and priority...",
            AnalysisStep::Subtasks => "Breaking down task into subtasks...",
            AnalysisStep::Initialization => "Initializing analysis...",
            AnalysisStep::Done => "Finishing analysis...",
        };
        Self::new(EventType::Progress, step, message)
    }

    pub fn classified(result: &ClassificationResult) -> Self {
        Self::new(
            EventType::Progress,
            AnalysisStep::Classification,
            result.summary(),
        )
        .with_data(EventData::Classification(result.clone()))
    }

    pub fn subtasks_generated(list: &SubtaskList) -> Self {
        Self::new(EventType::Progress, AnalysisStep::Subtasks, list.summary())
            .with_data(EventData::Subtasks(list.clone()))
    }

    pub fn failed(step: AnalysisStep, message: impl fmt::Display) -> Self {
        let label = match step {
            AnalysisStep::Classification => "Classification",
            AnalysisStep::Subtasks => "Subtask generation",
            AnalysisStep::Initialization => "Initialization",
            AnalysisStep::Done => "Analysis",
        };
        Self::new(
            EventType::Error,
            step,
            format!("{} failed: {}", label, message),
        )
    }

    pub fn complete(analysis: &TaskAnalysis) -> Self {
        Self::new(EventType::Complete, AnalysisStep::Done, "Analysis complete!")
            .with_data(EventData::Complete(analysis.clone()))
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type == EventType::Complete
    }

    /// Combined result carried by a `complete` event.
    pub fn analysis(&self) -> Option<&TaskAnalysis> {
        match &self.data {
            Some(EventData::Complete(analysis)) => Some(analysis),
            _ => None,
        }
    }

    /// Render as one text-event-stream frame, terminated by a blank line.
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "type": EventType::Error,
                "message": format!("Failed to encode event: {}", e),
                "step": self.step,
            })
            .to_string()
        });
        format!("event: {}\ndata: {}\n\n", self.event_type, data)
    }
}

/// Adapt an event stream into text-event-stream frames.
pub fn sse_frames<S>(events: S) -> impl Stream<Item = String>
where
    S: Stream<Item = AnalysisEvent>,
{
    events.map(|event| event.to_sse_frame())
}
