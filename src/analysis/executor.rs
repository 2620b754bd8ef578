//! Structured request execution.
//!
//! One request = build the prompt, call the bound backend, parse and validate the reply,
//! log, and emit an [`AnalysisRecord`]. [`Executor::run`] never fails: any error becomes the
//! output type's safe default, and this is the only place that substitution happens.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::llm::{Prompt, TextGenerator};

use super::record::{AnalysisRecord, SharedRecordSink};
use super::schema::{
    parse_output, AnalysisKind, ClassificationResult, StructuredOutput, SubtaskList,
};

const JSON_ONLY_INSTRUCTION: &str = "Respond ONLY with valid JSON matching this structure exactly. \
Do not include any other text, explanation, or markdown.";

/// Result of a request selected at runtime by [`AnalysisKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisPayload {
    Classification(ClassificationResult),
    Subtasks(SubtaskList),
}

/// Build the system and user instructions for a request producing `T`.
pub fn build_prompt<T: StructuredOutput>(title: &str, description: &str) -> Prompt {
    let system = format!(
        "{}\n\n{}\n\n{}",
        T::role(),
        T::contract(),
        JSON_ONLY_INSTRUCTION
    );
    let user = format!(
        "Task Title: {}\n\nTask Description: {}\n\n{}",
        title,
        description,
        T::request()
    );
    Prompt::new(system, user)
}

pub struct Executor<G> {
    backend: G,
    sink: SharedRecordSink,
}

impl<G: TextGenerator> Executor<G> {
    pub fn new(backend: G, sink: SharedRecordSink) -> Self {
        Self { backend, sink }
    }

    pub fn backend(&self) -> &G {
        &self.backend
    }

    /// Run a request, substituting the safe default on any failure.
    pub async fn run<T: StructuredOutput>(&self, title: &str, description: &str) -> T {
        match self.try_run::<T>(title, description).await {
            Ok(output) => output,
            Err(err) => T::fallback(&err.to_string()),
        }
    }

    /// [`Executor::run`] with the output shape chosen at runtime.
    pub async fn run_kind(
        &self,
        kind: AnalysisKind,
        title: &str,
        description: &str,
    ) -> AnalysisPayload {
        match kind {
            AnalysisKind::Classification => AnalysisPayload::Classification(
                self.run::<ClassificationResult>(title, description).await,
            ),
            AnalysisKind::Subtasks => {
                AnalysisPayload::Subtasks(self.run::<SubtaskList>(title, description).await)
            }
        }
    }

    /// Run a request and report the failure instead of substituting a default.
    ///
    /// Exactly one record is emitted per call, successful or not.
    pub async fn try_run<T: StructuredOutput>(
        &self,
        title: &str,
        description: &str,
    ) -> Result<T, AnalysisError> {
        let prompt = build_prompt::<T>(title, description);
        let backend = self.backend.identity();
        let started = Instant::now();

        let (response, token_count, result) = match self.backend.generate(&prompt).await {
            Ok(generation) => {
                let parsed = parse_output::<T>(&generation.text).map_err(AnalysisError::from);
                (
                    generation.text,
                    generation.usage.map(|u| u.total_tokens),
                    parsed,
                )
            }
            Err(err) => (String::new(), None, Err(AnalysisError::from(err))),
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(output) => tracing::info!(
                kind = %T::KIND,
                backend = %backend,
                duration_ms,
                "{}",
                output.summary()
            ),
            Err(err) => tracing::error!(
                kind = %T::KIND,
                backend = %backend,
                duration_ms,
                failure = err.failure_label(),
                "{} failed: {}",
                T::KIND,
                err
            ),
        }

        self.sink
            .record(AnalysisRecord {
                id: Uuid::new_v4(),
                kind: T::KIND,
                backend,
                prompt: prompt.render(),
                response,
                success: result.is_ok(),
                error: result
                    .as_ref()
                    .err()
                    .map(|e| format!("{}: {}", e.failure_label(), e)),
                duration_ms,
                token_count,
                created_at: Utc::now(),
            })
            .await;

        result
    }
}
